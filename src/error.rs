use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Errors raised by the snapshot utilities (locator, loaders, search, queries)
/// and by issue validation.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("json query failed: {0}")]
    JsonQuery(String),

    #[error("invalid issue: {0}")]
    InvalidIssue(String),

    #[error("no cluster snapshot found under {}", .0.display())]
    NoSnapshotFound(PathBuf),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }
}

/// Defects in analyzer code. These are raised as panics, never returned.
#[derive(Debug, Error)]
pub enum ProgrammerError {
    #[error("programmer error: {0} is not a registered known issue type")]
    UnknownIssueType(String),
}
