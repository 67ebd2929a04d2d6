use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid collection identifier: {0:?}")]
    InvalidCollection(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("rate limited (429) by {url}")]
    #[diagnostic(help("wait a while before re-running; already downloaded files are skipped"))]
    RateLimited { url: String },

    #[error("could not resolve a download URL for {0}")]
    ResolutionMiss(String),

    #[error("interrupted by user")]
    Interrupted,

    #[error("output directory {path} is unusable: {message}")]
    OutputDir { path: String, message: String },

    #[error("input directory does not exist: {0}")]
    MissingInputDir(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("image processing failed: {0}")]
    Image(String),
}

impl HarvestError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, HarvestError::RateLimited { .. })
    }
}
