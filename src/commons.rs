use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::FetcherConfig;
use crate::domain::{CollectionId, MemberPage};
use crate::error::HarvestError;
use crate::store::write_chunked;

/// Network capabilities the fetch loop depends on.
pub trait CollectionSource: Send + Sync {
    /// One page of member titles, continuing from `continuation` when given.
    fn list_members_page(
        &self,
        collection: &CollectionId,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<MemberPage, HarvestError>;

    /// First direct-content URL for `title`; `None` when the title has none.
    fn resolve_url(&self, title: &str) -> Result<Option<String>, HarvestError>;

    /// Streams `url` into `destination`, returning the number of bytes written.
    fn fetch_one(&self, url: &str, destination: &Path) -> Result<u64, HarvestError>;
}

/// MediaWiki action API client (Wikimedia Commons by default).
#[derive(Clone)]
pub struct CommonsHttpClient {
    client: Client,
    api_url: String,
    chunk_size: usize,
}

impl CommonsHttpClient {
    pub fn new(config: &FetcherConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|err| HarvestError::InvalidConfig(format!("user_agent: {err}")))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| HarvestError::Http(err.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            chunk_size: config.chunk_size,
        })
    }

    fn handle_status(response: Response) -> Result<Response, HarvestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HarvestError::RateLimited { url });
        }
        let message = response
            .text()
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| format!("request to {url} failed"));
        Err(HarvestError::Transport {
            status: status.as_u16(),
            message,
        })
    }

    // 429 is never retried here; the run loop counts it.
    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, HarvestError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying after server error");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(%err, attempt, "retrying after connection error");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(HarvestError::Http(err.to_string()));
                }
            }
        }
    }

    fn query_api(&self, params: &[(&str, String)]) -> Result<String, HarvestError> {
        let response = self.send_with_retries(|| self.client.get(&self.api_url).query(params))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| HarvestError::Http(err.to_string()))
    }
}

impl CollectionSource for CommonsHttpClient {
    fn list_members_page(
        &self,
        collection: &CollectionId,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<MemberPage, HarvestError> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("list", "categorymembers".to_string()),
            ("cmtitle", collection.as_str().to_string()),
            ("cmtype", "file".to_string()),
            ("cmlimit", page_size.to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(token) = continuation {
            params.push(("cmcontinue", token.to_string()));
        }
        debug!(collection = %collection, page_size, ?continuation, "listing members");
        let body = self.query_api(&params)?;
        parse_member_page(&body)
    }

    fn resolve_url(&self, title: &str) -> Result<Option<String>, HarvestError> {
        let params = [
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "imageinfo".to_string()),
            ("iiprop", "url".to_string()),
            ("format", "json".to_string()),
        ];
        debug!(title, "resolving file url");
        let body = self.query_api(&params)?;
        parse_file_url(&body)
    }

    fn fetch_one(&self, url: &str, destination: &Path) -> Result<u64, HarvestError> {
        debug!(url, destination = %destination.display(), "fetching");
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        write_chunked(&mut response, destination, self.chunk_size)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    query: Option<ListQuery>,
    #[serde(rename = "continue", default)]
    continuation: Option<ListContinue>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    categorymembers: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ListContinue {
    #[serde(default)]
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    query: Option<InfoQuery>,
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    #[serde(default)]
    pages: BTreeMap<String, InfoPage>,
}

#[derive(Debug, Deserialize)]
struct InfoPage {
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    #[serde(default)]
    url: Option<String>,
}

/// MediaWiki reports API-level failures with status 200 and an `error` object.
fn api_error(error: ApiError) -> HarvestError {
    HarvestError::Transport {
        status: 200,
        message: format!("{}: {}", error.code, error.info),
    }
}

pub fn parse_member_page(body: &str) -> Result<MemberPage, HarvestError> {
    let response: ListResponse =
        serde_json::from_str(body).map_err(|err| HarvestError::Http(err.to_string()))?;
    if let Some(error) = response.error {
        return Err(api_error(error));
    }
    let titles = response
        .query
        .map(|query| {
            query
                .categorymembers
                .into_iter()
                .map(|member| member.title)
                .collect()
        })
        .unwrap_or_default();
    Ok(MemberPage {
        titles,
        continuation: response
            .continuation
            .and_then(|continuation| continuation.cmcontinue),
    })
}

pub fn parse_file_url(body: &str) -> Result<Option<String>, HarvestError> {
    let response: InfoResponse =
        serde_json::from_str(body).map_err(|err| HarvestError::Http(err.to_string()))?;
    if let Some(error) = response.error {
        return Err(api_error(error));
    }
    let Some(query) = response.query else {
        return Ok(None);
    };
    Ok(query
        .pages
        .into_values()
        .find_map(|page| page.imageinfo.into_iter().next())
        .and_then(|info| info.url))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
