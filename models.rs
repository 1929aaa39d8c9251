use serde::{Deserialize, Serialize};
use std::fmt;

/// Location tag used when a photo carries no usable GPS block.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PhotoRecord {
    pub id: Option<i64>,
    pub path: String,
    pub file_name: String,
    pub created_at: String,
    pub location: String,
    pub rotation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagCount {
    pub name: String,
    pub photos: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub photos: i64,
    pub tags: i64,
    pub links: i64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum DateSource {
    Exif(&'static str),
    FileModified,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractedMetadata {
    pub created_at: String,
    pub location: Option<String>,
    pub date_source: DateSource,
    /// Why a date or location could not be read from EXIF.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Scanning,
    Extracting,
    Persisting,
    Completed,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Scanning => "Scanning for images...",
            Phase::Extracting => "Extracting metadata...",
            Phase::Persisting => "Writing tags to database...",
            Phase::Completed => "Completed",
            Phase::Cancelled => "Cancelled",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

impl From<RunStatus> for Phase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => Phase::Completed,
            RunStatus::Cancelled => Phase::Cancelled,
            RunStatus::Failed => Phase::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub discovered: usize,
    pub photos_processed: usize,
    pub tags_created: usize,
    pub tags_used: usize,
    pub skipped: usize,
    pub with_location: usize,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Completed,
            discovered: 0,
            photos_processed: 0,
            tags_created: 0,
            tags_used: 0,
            skipped: 0,
            with_location: 0,
        }
    }
}

/// Events forwarded to the host over a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress {
        phase: Phase,
        current: usize,
        total: usize,
    },
    Phase {
        phase: Phase,
    },
    Log {
        message: String,
    },
    Finished {
        summary: RunSummary,
    },
}
