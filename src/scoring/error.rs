use std::path::PathBuf;
use std::time::Duration;

/// Model backend failures. Never fatal to `analyze`; the engine degrades.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend not configured: {0}")]
    Unavailable(String),

    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend response unreadable: {0}")]
    Response(String),

    #[error("backend worker exited without replying")]
    Disconnected,
}

/// Malformed backend reply. Recovered locally with the keyword fallback.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in reply")]
    NoJson,

    #[error("invalid reply JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejected feedback submission
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("unknown or expired analysis id: {0}")]
    NotFound(String),
}

/// Durable store failures. Logged; the engine keeps running in memory.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode learning state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode learning state at {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
