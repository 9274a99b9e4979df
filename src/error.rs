// src/error.rs
//
// Error taxonomy of the recording engine. Validation errors stay local,
// storage step errors degrade a commit, header errors abort it.

use crate::types::{LocalId, TrajectoryId};
use thiserror::Error;

/// Bad operator input for a hazard observation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("severity {0} outside 0..=4")]
    SeverityOutOfRange(i64),
    #[error("observation {0:?} already recorded")]
    DuplicateLocalId(LocalId),
}

/// Positioning failure. Terminal for the active subscription.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("positioning unavailable: {0}")]
    Unavailable(String),
    #[error("positioning permission denied")]
    PermissionDenied,
    #[error("positioning timed out")]
    TimedOut,
    #[error("position stream closed")]
    StreamClosed,
    #[error("already subscribed")]
    AlreadySubscribed,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage transport error: {0}")]
    Transport(String),
    #[error("storage request timed out")]
    Timeout,
    #[error("storage returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode storage response: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(TrajectoryId),
    #[error("storage rejected request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StorageError::Timeout
        } else if e.is_decode() {
            StorageError::Decode(e.to_string())
        } else {
            StorageError::Transport(e.to_string())
        }
    }
}

/// Fatal commit failure: no trajectory id was obtained.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to create trajectory header: {0}")]
    HeaderCreation(#[source] StorageError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("no active trajectory")]
    NoActiveTrajectory,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Sensor(#[from] SensorError),
}

/// Zone or perimeter source failure. Non-fatal at startup.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no usable polygon in source")]
    Empty,
}
