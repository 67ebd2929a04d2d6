use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

use crate::domain::{ItemOutcome, RunStatus, RunSummary};
use crate::trim::{TrimOutcome, TrimSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ListingStarted {
        collection: String,
    },
    ListingPage {
        found: usize,
    },
    Listed {
        total: usize,
        already_present: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        title: String,
    },
    Resolved {
        url: String,
    },
    ItemFinished {
        index: usize,
        total: usize,
        file_name: String,
        outcome: ItemOutcome,
    },
    Waiting {
        delay: Duration,
    },
    TrimStarted {
        total: usize,
    },
    Trimmed {
        index: usize,
        total: usize,
        name: String,
        outcome: TrimOutcome,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_trim(summary: &TrimSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const RULE: &str = "======================================================================";

/// Human-readable progress on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_banner(lines: &[(&str, String)]) {
        println!("{RULE}");
        for (label, value) in lines {
            println!("{label}: {value}");
        }
        println!("{RULE}");
        println!();
    }

    pub fn print_run(summary: &RunSummary) {
        println!();
        println!("{RULE}");
        match summary.status {
            RunStatus::Completed => println!("{GREEN}Download complete!{RESET}"),
            RunStatus::Interrupted => println!("{YELLOW}Download interrupted by user.{RESET}"),
            RunStatus::RateLimited => println!(
                "{RED}STOPPING: rate limit threshold reached ({} responses with 429){RESET}",
                summary.rate_limit_hits
            ),
        }
        println!("Downloaded: {} new files", summary.downloaded);
        println!("Skipped: {} existing files", summary.skipped);
        println!("Errors: {}", summary.errors);
        println!(
            "Total files in directory: {}",
            summary.present_in_directory
        );
        println!("{RULE}");
    }

    pub fn print_trim(summary: &TrimSummary) {
        println!();
        println!(
            "{GREEN}Done! Processed {} images ({} failed).{RESET}",
            summary.processed, summary.failed
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ListingStarted { collection } => {
                println!("Fetching file list from {collection}...");
            }
            ProgressEvent::ListingPage { found } => {
                println!("  Found {found} files so far...");
            }
            ProgressEvent::Listed {
                total,
                already_present,
            } => {
                println!("Total files found: {total}");
                println!();
                println!("Found {already_present} files already downloaded.");
                println!();
            }
            ProgressEvent::ItemStarted {
                index,
                total,
                title,
            } => {
                println!("{CYAN}[{index}/{total}]{RESET} Getting URL for: {title}");
            }
            ProgressEvent::Resolved { url } => {
                println!("  Downloading: {url}");
            }
            ProgressEvent::ItemFinished {
                index,
                total,
                file_name,
                outcome,
            } => match outcome {
                ItemOutcome::Skipped => {
                    println!(
                        "{YELLOW}[{index}/{total}] SKIP: {file_name} (already exists){RESET}"
                    );
                }
                ItemOutcome::Downloaded { bytes } => {
                    println!("{GREEN}  SUCCESS: Saved to {file_name} ({bytes} bytes){RESET}");
                }
                ItemOutcome::NoUrl => {
                    println!("{RED}  ERROR: Could not get URL for {file_name}{RESET}");
                    println!();
                }
                ItemOutcome::RateLimited { hits, limit } => {
                    println!("{RED}  ERROR: Rate limited (429) - {hits}/{limit}{RESET}");
                    println!();
                }
                ItemOutcome::Failed { message } => {
                    println!("{RED}  ERROR downloading {file_name}: {message}{RESET}");
                    println!();
                }
            },
            ProgressEvent::Waiting { delay } => {
                println!(
                    "  Waiting {} seconds before next download...",
                    delay.as_secs_f64()
                );
                println!();
            }
            ProgressEvent::TrimStarted { total } => {
                println!("Found {total} PNG files to process...");
            }
            ProgressEvent::Trimmed {
                index,
                total,
                name,
                outcome,
            } => match outcome {
                TrimOutcome::Trimmed { original, trimmed } => println!(
                    "[{index}/{total}] {name}: ({}, {}) -> ({}, {})",
                    original.0, original.1, trimmed.0, trimmed.1
                ),
                TrimOutcome::Failed { message } => {
                    println!("{RED}[{index}/{total}] ERROR processing {name}: {message}{RESET}")
                }
            },
        }
    }
}
