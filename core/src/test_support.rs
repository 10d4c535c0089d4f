/// Scripted room server and message builders for unit tests
use crate::error::{Result, SyncError};
use crate::message::{Delta, Message, PostRequest};
use crate::remote::RoomServer;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn start(id: u64, content: &str, timestamp: i64) -> Message {
    Message::new(id, content, timestamp, None)
}

pub(crate) fn reply(id: u64, to: u64, content: &str, timestamp: i64) -> Message {
    Message::new(id, content, timestamp, Some(to))
}

pub(crate) fn delta(messages: Vec<Message>, clean_stored: bool) -> Delta {
    Delta {
        messages,
        clean_stored,
    }
}

enum Step {
    Answer(Result<Delta>),
    /// Never answers
    Hang,
}

/// Serves queued deltas in order, then empty deltas. Records every post.
#[derive(Clone, Default)]
pub(crate) struct ScriptedServer {
    steps: Arc<Mutex<VecDeque<Step>>>,
    posts: Arc<Mutex<Vec<PostRequest>>>,
    refuse_posts: Arc<AtomicBool>,
}

impl ScriptedServer {
    pub(crate) fn push(&self, delta: Delta) {
        self.steps.lock().unwrap().push_back(Step::Answer(Ok(delta)));
    }

    pub(crate) fn push_err(&self, err: SyncError) {
        self.steps.lock().unwrap().push_back(Step::Answer(Err(err)));
    }

    pub(crate) fn push_hang(&self) {
        self.steps.lock().unwrap().push_back(Step::Hang);
    }

    pub(crate) fn refuse_posts(&self) {
        self.refuse_posts.store(true, Ordering::SeqCst);
    }

    pub(crate) fn posts(&self) -> Vec<PostRequest> {
        self.posts.lock().unwrap().clone()
    }
}

impl RoomServer for ScriptedServer {
    fn fetch(&self, _room: &str) -> impl Future<Output = Result<Delta>> + Send {
        let next = self.steps.lock().unwrap().pop_front();
        async move {
            match next {
                Some(Step::Answer(result)) => result,
                Some(Step::Hang) => std::future::pending().await,
                None => Ok(Delta::default()),
            }
        }
    }

    fn post(&self, room: &str, request: &PostRequest) -> impl Future<Output = Result<String>> + Send {
        let result = if self.refuse_posts.load(Ordering::SeqCst) {
            Err(SyncError::Network("connection refused".to_string()))
        } else {
            self.posts.lock().unwrap().push(request.clone());
            Ok(format!("posted to {}", room))
        };
        async move { result }
    }
}
