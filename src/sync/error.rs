use thiserror::Error;

/// Failures while publishing a snapshot to the remote store.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Target coordinates are missing or malformed; nothing was sent.
    #[error("invalid sync target: {0}")]
    Validation(String),

    #[error("looking up {path} failed with HTTP {status}: {message}")]
    Lookup {
        path: String,
        status: u16,
        message: String,
    },

    /// The supplied content hash is stale (someone else wrote in between).
    #[error("remote rejected stale content hash for {path} (HTTP {status}): {message}")]
    Conflict {
        path: String,
        status: u16,
        message: String,
    },

    #[error("remote write to {path} failed with HTTP {status}: {message}")]
    Remote {
        path: String,
        status: u16,
        message: String,
    },

    #[error("request to remote store failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SyncError {
    /// Only conflicts are worth retrying, after re-reading the hash.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }

    /// HTTP status reported by the store, when there was one.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            SyncError::Lookup { status, .. }
            | SyncError::Conflict { status, .. }
            | SyncError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}
