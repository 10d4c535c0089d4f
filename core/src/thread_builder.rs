/// Two-pass merge of flat message batches into a ThreadIndex
///
/// Pass one adds every thread start, pass two attaches every reply. Replies
/// whose thread start is still unknown are buffered and retried on the next
/// batch instead of being dropped.
use crate::error::DanglingReplyError;
use crate::message::Message;
use crate::thread_index::{Insert, ThreadIndex};
use tracing::{debug, warn};

pub const DEFAULT_DANGLING_WARN_AFTER: u32 = 3;

#[derive(Debug, Clone)]
struct PendingReply {
    message: Message,
    attempts: u32,
}

/// Result of one `ThreadBuilder::apply` call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub threads_added: usize,
    pub replies_attached: usize,
    /// Messages whose id was already indexed
    pub duplicates: usize,
    /// Replies still waiting for their thread start
    pub pending: usize,
    /// Pending replies that have been unresolved for the warning bound or longer
    pub dangling: Vec<DanglingReplyError>,
}

impl BuildReport {
    pub fn changed(&self) -> bool {
        self.threads_added > 0 || self.replies_attached > 0
    }
}

#[derive(Debug)]
pub struct ThreadBuilder {
    pending: Vec<PendingReply>,
    warn_after: u32,
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DANGLING_WARN_AFTER)
    }
}

impl ThreadBuilder {
    pub fn new(warn_after: u32) -> Self {
        Self {
            pending: Vec::new(),
            warn_after: warn_after.max(1),
        }
    }

    /// Number of buffered dangling replies
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.iter().any(|p| p.message.id == id)
    }

    /// Apply one batch. Buffered replies are retried before the batch's own replies.
    pub fn apply(&mut self, index: &mut ThreadIndex, messages: &[Message]) -> BuildReport {
        let mut report = BuildReport::default();

        for msg in messages.iter().filter(|m| m.is_thread_start()) {
            match index.insert_thread(msg.clone()) {
                Insert::Added => report.threads_added += 1,
                _ => report.duplicates += 1,
            }
        }

        let retries = std::mem::take(&mut self.pending);
        for pending in retries {
            self.attach(index, pending, &mut report);
        }

        for msg in messages.iter().filter(|m| !m.is_thread_start()) {
            if self.is_pending(msg.id) {
                report.duplicates += 1;
                continue;
            }
            let pending = PendingReply {
                message: msg.clone(),
                attempts: 0,
            };
            self.attach(index, pending, &mut report);
        }

        report.pending = self.pending.len();
        report.dangling = self
            .pending
            .iter()
            .filter(|p| p.attempts >= self.warn_after)
            .map(|p| dangling_error(&p.message, p.attempts))
            .collect();

        debug!(
            "Merged batch: {} threads, {} replies, {} duplicates, {} pending",
            report.threads_added, report.replies_attached, report.duplicates, report.pending
        );
        report
    }

    /// Drop buffered replies. Used on invalidation only.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    fn attach(&mut self, index: &mut ThreadIndex, mut pending: PendingReply, report: &mut BuildReport) {
        match index.attach_reply(pending.message.clone()) {
            Insert::Added => report.replies_attached += 1,
            Insert::Duplicate => report.duplicates += 1,
            Insert::MissingThread => {
                pending.attempts += 1;
                if pending.attempts == self.warn_after {
                    warn!("{}", dangling_error(&pending.message, pending.attempts));
                } else {
                    debug!(
                        "Buffering reply {} for thread {:?}",
                        pending.message.id, pending.message.reply_to
                    );
                }
                self.pending.push(pending);
            }
        }
    }
}

fn dangling_error(message: &Message, attempts: u32) -> DanglingReplyError {
    DanglingReplyError {
        reply_id: message.id,
        thread_id: message.reply_to.unwrap_or_default(),
        attempts,
    }
}
