/// Wire and storage types shared by the sync core
use serde::{Deserialize, Serialize};

/// One posted message. Never modified after it is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    /// Formatted text as authored
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// `None` for a thread start, otherwise the id of the thread's first message
    #[serde(default)]
    pub reply_to: Option<u64>,
}

impl Message {
    pub fn new(id: u64, content: impl Into<String>, timestamp: i64, reply_to: Option<u64>) -> Self {
        Self {
            id,
            content: content.into(),
            timestamp,
            reply_to,
        }
    }

    pub fn is_thread_start(&self) -> bool {
        self.reply_to.is_none()
    }
}

/// Body of `GET /room/{room}/updates`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub messages: Vec<Message>,
    /// Discard every cached and indexed message before applying `messages`
    #[serde(default)]
    pub clean_stored: bool,
}

/// Body of `POST /room/{room}/post`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRequest {
    pub content: String,
    pub reply_to: Option<u64>,
}
