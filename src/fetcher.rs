use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::commons::CollectionSource;
use crate::config::FetcherConfig;
use crate::domain::{CollectionId, ItemOutcome, ResolvedFile, RunStatus, RunSummary};
use crate::error::HarvestError;
use crate::output::{ProgressEvent, ProgressSink};
use crate::sanitize::sanitize;
use crate::store::DownloadLedger;

/// Longest uninterrupted sleep while pacing; the abort token is polled in between.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Pages through `collection` until the source stops handing out continuation
/// tokens or `limit` titles have been collected.
///
/// `abort` is checked before every page request; once set the listing ends
/// with [`HarvestError::Interrupted`].
pub fn list_members<S: CollectionSource + ?Sized>(
    source: &S,
    collection: &CollectionId,
    limit: usize,
    page_size: u32,
    abort: &AtomicBool,
    sink: &dyn ProgressSink,
) -> Result<Vec<String>, HarvestError> {
    let mut titles: Vec<String> = Vec::new();
    let mut continuation: Option<String> = None;

    while titles.len() < limit {
        if abort.load(Ordering::Relaxed) {
            return Err(HarvestError::Interrupted);
        }
        let remaining = u32::try_from(limit - titles.len()).unwrap_or(u32::MAX);
        let page = source.list_members_page(
            collection,
            remaining.min(page_size),
            continuation.as_deref(),
        )?;
        titles.extend(page.titles);
        sink.event(ProgressEvent::ListingPage {
            found: titles.len(),
        });

        match page.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    titles.truncate(limit);
    Ok(titles)
}

#[derive(Debug, Default)]
struct Tally {
    downloaded: usize,
    skipped: usize,
    errors: usize,
    rate_limit_hits: u32,
}

impl Tally {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Downloaded { .. } => self.downloaded += 1,
            ItemOutcome::NoUrl | ItemOutcome::RateLimited { .. } | ItemOutcome::Failed { .. } => {
                self.errors += 1
            }
        }
    }
}

pub struct Fetcher<S: CollectionSource, L: DownloadLedger> {
    source: S,
    ledger: L,
    config: FetcherConfig,
    abort: Arc<AtomicBool>,
}

impl<S: CollectionSource, L: DownloadLedger> Fetcher<S, L> {
    pub fn new(source: S, ledger: L, config: FetcherConfig) -> Self {
        Self {
            source,
            ledger,
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned abort token, typically set by a Ctrl-C handler.
    pub fn with_abort_token(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Lists the configured collection, then downloads every member not yet in the ledger.
    ///
    /// Only listing failures are returned as errors; per-item failures are
    /// reported through `sink` and counted in the summary.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunSummary, HarvestError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let collection = &self.config.collection;

        sink.event(ProgressEvent::ListingStarted {
            collection: collection.to_string(),
        });
        let titles = match list_members(
            &self.source,
            collection,
            self.config.listing_limit,
            self.config.page_size,
            &self.abort,
            sink,
        ) {
            Ok(titles) => titles,
            Err(HarvestError::Interrupted) => {
                info!("run interrupted by user while listing");
                let tally = Tally::default();
                return Ok(self.summary(RunStatus::Interrupted, 0, &tally, started_at));
            }
            Err(err) => return Err(err),
        };
        let total = titles.len();
        info!(collection = %collection, total, "listing complete");

        sink.event(ProgressEvent::Listed {
            total,
            already_present: self.present_count(),
        });

        let mut tally = Tally::default();
        let mut status = RunStatus::Completed;

        for (position, title) in titles.iter().enumerate() {
            let index = position + 1;
            if self.check_abort().is_err() {
                status = RunStatus::Interrupted;
                break;
            }

            let file_name = sanitize(title);
            let outcome = if self.ledger.contains(&file_name) {
                ItemOutcome::Skipped
            } else {
                sink.event(ProgressEvent::ItemStarted {
                    index,
                    total,
                    title: title.clone(),
                });
                self.fetch_item(title, &file_name, &mut tally, sink)
            };

            tally.record(&outcome);
            let downloaded = matches!(outcome, ItemOutcome::Downloaded { .. });
            sink.event(ProgressEvent::ItemFinished {
                index,
                total,
                file_name,
                outcome,
            });

            if tally.rate_limit_hits >= self.config.max_rate_limit_errors {
                warn!(
                    hits = tally.rate_limit_hits,
                    "rate limit threshold reached, stopping"
                );
                status = RunStatus::RateLimited;
                break;
            }

            // Only a successful download is paced; misses and errors move straight on.
            if downloaded && index < total && self.pause(sink).is_err() {
                status = RunStatus::Interrupted;
                break;
            }
        }

        if status == RunStatus::Interrupted {
            info!("run interrupted by user");
        }

        Ok(self.summary(status, total, &tally, started_at))
    }

    fn summary(
        &self,
        status: RunStatus,
        listed: usize,
        tally: &Tally,
        started_at: String,
    ) -> RunSummary {
        RunSummary {
            collection: self.config.collection.to_string(),
            status,
            listed,
            downloaded: tally.downloaded,
            skipped: tally.skipped,
            errors: tally.errors,
            rate_limit_hits: tally.rate_limit_hits,
            present_in_directory: self.present_count(),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn fetch_item(
        &self,
        title: &str,
        file_name: &str,
        tally: &mut Tally,
        sink: &dyn ProgressSink,
    ) -> ItemOutcome {
        let result = self.resolve(title, file_name).and_then(|resolved| {
            sink.event(ProgressEvent::Resolved {
                url: resolved.url.clone(),
            });
            let destination = self.ledger.destination(&resolved.file_name);
            self.source.fetch_one(&resolved.url, &destination)
        });

        match result {
            Ok(bytes) => {
                info!(file_name, bytes, "downloaded");
                ItemOutcome::Downloaded { bytes }
            }
            Err(err @ HarvestError::ResolutionMiss(_)) => {
                warn!(%err, "skipping");
                ItemOutcome::NoUrl
            }
            Err(err) if err.is_rate_limit() => {
                // Counted across the whole run; successes in between do not reset it.
                tally.rate_limit_hits += 1;
                warn!(title, %err, hits = tally.rate_limit_hits, "rate limited");
                ItemOutcome::RateLimited {
                    hits: tally.rate_limit_hits,
                    limit: self.config.max_rate_limit_errors,
                }
            }
            Err(err) => {
                warn!(title, %err, "download failed");
                ItemOutcome::Failed {
                    message: err.to_string(),
                }
            }
        }
    }

    fn resolve(&self, title: &str, file_name: &str) -> Result<ResolvedFile, HarvestError> {
        match self.source.resolve_url(title)? {
            Some(url) => Ok(ResolvedFile {
                file_name: file_name.to_string(),
                url,
            }),
            None => Err(HarvestError::ResolutionMiss(title.to_string())),
        }
    }

    fn check_abort(&self) -> Result<(), HarvestError> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(HarvestError::Interrupted);
        }
        Ok(())
    }

    /// Sleeps for the configured delay, waking early if the abort token is set.
    fn pause(&self, sink: &dyn ProgressSink) -> Result<(), HarvestError> {
        self.check_abort()?;
        let delay = self.config.delay;
        if delay.is_zero() {
            return Ok(());
        }
        sink.event(ProgressEvent::Waiting { delay });
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
            self.check_abort()?;
        }
    }

    fn present_count(&self) -> usize {
        self.ledger.present_count().unwrap_or_else(|err| {
            warn!(%err, "could not count files in output directory");
            0
        })
    }
}
