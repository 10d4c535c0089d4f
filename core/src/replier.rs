/// Outbound submissions: new threads and replies
use crate::error::Result;
use crate::message::PostRequest;
use crate::remote::RoomServer;
use tracing::{info, warn};

/// Submits messages to one room. Nothing is inserted locally; the posted
/// message shows up through the next refresh like any other.
#[derive(Clone)]
pub struct Replier<S> {
    server: S,
    room: String,
}

impl<S: RoomServer> Replier<S> {
    pub fn new(server: S, room: impl Into<String>) -> Self {
        Self {
            server,
            room: room.into(),
        }
    }

    /// Send one message (`thread_id = None` starts a new thread).
    /// `Ok` carries the server's acknowledgment; `Err` means the request never got an answer.
    pub async fn try_submit(&self, thread_id: Option<u64>, content: &str) -> Result<String> {
        let request = PostRequest {
            content: content.to_string(),
            reply_to: thread_id,
        };
        let ack = self.server.post(&self.room, &request).await?;
        info!("Posted to {} (reply_to={:?}): {}", self.room, thread_id, ack.trim());
        Ok(ack)
    }

    /// Like `try_submit`, but a failure is reported as its text. No retry.
    pub async fn submit(&self, thread_id: Option<u64>, content: &str) -> String {
        self.acknowledge(self.try_submit(thread_id, content).await)
    }

    /// Turn a submission outcome into the text shown to the user
    pub fn acknowledge(&self, result: Result<String>) -> String {
        match result {
            Ok(ack) => ack,
            Err(e) => {
                warn!("Post to {} failed: {}", self.room, e);
                e.to_string()
            }
        }
    }
}
