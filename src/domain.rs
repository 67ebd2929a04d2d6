use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_COLLECTION;
use crate::error::HarvestError;

/// Name of a remote grouping of files, e.g. `Category:SVG_simplified_musical_symbols`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self(DEFAULT_COLLECTION.to_string())
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() {
            return Err(HarvestError::InvalidCollection(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// One response of the paginated listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberPage {
    pub titles: Vec<String>,
    pub continuation: Option<String>,
}

/// Local filename paired with the remote URL holding its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Skipped,
    Downloaded { bytes: u64 },
    NoUrl,
    RateLimited { hits: u32, limit: u32 },
    Failed { message: String },
}

impl ItemOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ItemOutcome::NoUrl | ItemOutcome::RateLimited { .. } | ItemOutcome::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Interrupted,
    RateLimited,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Interrupted => write!(f, "interrupted"),
            RunStatus::RateLimited => write!(f, "rate-limited"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub collection: String,
    pub status: RunStatus,
    pub listed: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub rate_limit_hits: u32,
    pub present_in_directory: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// Background colour that counts as "border" when trimming opaque images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BorderColor {
    #[default]
    White,
    Corner,
}

impl fmt::Display for BorderColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BorderColor::White => write!(f, "white"),
            BorderColor::Corner => write!(f, "corner"),
        }
    }
}
