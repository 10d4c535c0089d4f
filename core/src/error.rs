/// Error types for room synchronization
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Never returned by a sync cycle; unresolved replies are listed in the
    /// cycle's report. Lets callers surface a report entry as an error.
    #[error(transparent)]
    DanglingReply(#[from] DanglingReplyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refresh already in progress for room {0}")]
    Busy(String),
}

/// A reply whose thread start has not been delivered yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reply {reply_id} references unknown thread {thread_id} (unresolved for {attempts} cycles)")]
pub struct DanglingReplyError {
    pub reply_id: u64,
    pub thread_id: u64,
    pub attempts: u32,
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<sled::Error> for SyncError {
    fn from(e: sled::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}
