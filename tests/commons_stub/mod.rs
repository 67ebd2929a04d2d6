use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

pub const SVG_BODY: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\"><circle r=\"4\"/></svg>";

/// Minimal MediaWiki look-alike: a two-page category listing, imageinfo lookups
/// and a `/files/` tree with a few misbehaving entries.
pub struct CommonsStub {
    pub base_url: String,
    user_agents: Arc<Mutex<Vec<String>>>,
    hits: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CommonsStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start commons stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let file_base = base_url.clone();

        let user_agents = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let seen_agents = Arc::clone(&user_agents);
        let seen_hits = Arc::clone(&hits);
        let flaky_hits = AtomicUsize::new(0);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                seen_hits.lock().unwrap().push(url.clone());
                if let Some(agent) = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("User-Agent"))
                {
                    seen_agents
                        .lock()
                        .unwrap()
                        .push(agent.value.as_str().to_string());
                }

                let (status, body) = if url.starts_with("/w/api.php") {
                    api_response(&url, &file_base)
                } else if url == "/files/Whole_note.svg" || url == "/files/Half_note.svg" {
                    (200, SVG_BODY.to_string())
                } else if url == "/files/limited.svg" {
                    (429, "Too many requests".to_string())
                } else if url == "/files/flaky.svg" {
                    if flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (503, "try again".to_string())
                    } else {
                        (200, SVG_BODY.to_string())
                    }
                } else {
                    (404, "not found".to_string())
                };

                let _ = request
                    .respond(tiny_http::Response::from_string(body).with_status_code(status));
            }
        });

        Self {
            base_url,
            user_agents,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}/w/api.php", self.base_url)
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.base_url)
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hits_matching(&self, needle: &str) -> usize {
        self.hits()
            .iter()
            .filter(|hit| hit.contains(needle))
            .count()
    }
}

impl Drop for CommonsStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn api_response(url: &str, file_base: &str) -> (u16, String) {
    if url.contains("list=categorymembers") {
        if url.contains("cmcontinue=next-page") {
            return (
                200,
                r#"{"batchcomplete":"","query":{"categorymembers":[
                    {"pageid":3,"ns":6,"title":"File:Missing.svg"}
                ]}}"#
                    .to_string(),
            );
        }
        return (
            200,
            r#"{"batchcomplete":"","continue":{"cmcontinue":"next-page","continue":"-||"},
                "query":{"categorymembers":[
                    {"pageid":1,"ns":6,"title":"File:Whole note.svg"},
                    {"pageid":2,"ns":6,"title":"File:Half note.svg"}
                ]}}"#
                .to_string(),
        );
    }

    if url.contains("prop=imageinfo") {
        if url.contains("Missing") {
            return (
                200,
                r#"{"query":{"pages":{"-1":{"ns":6,"title":"File:Missing.svg","missing":""}}}}"#
                    .to_string(),
            );
        }
        if url.contains("Broken") {
            return (
                200,
                r#"{"error":{"code":"internal_api_error","info":"database unavailable"}}"#
                    .to_string(),
            );
        }
        let name = if url.contains("Whole") {
            "Whole_note.svg"
        } else {
            "Half_note.svg"
        };
        return (
            200,
            format!(
                r#"{{"query":{{"pages":{{"17":{{"ns":6,"title":"File:{name}","imageinfo":[{{"url":"{file_base}/files/{name}"}}]}}}}}}}}"#
            ),
        );
    }

    (400, r#"{"error":{"code":"badparams","info":"unknown"}}"#.to_string())
}
