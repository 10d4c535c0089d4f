/// In-memory thread index: thread-start id -> Thread, in insertion order
use crate::message::Message;
use std::collections::{HashMap, HashSet};

/// A thread start plus its replies, in merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    first_message: Message,
    replies: Vec<Message>,
}

impl Thread {
    fn new(first_message: Message) -> Self {
        Self {
            first_message,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.first_message.id
    }

    pub fn first_message(&self) -> &Message {
        &self.first_message
    }

    /// Replies in the order they were merged
    pub fn replies(&self) -> &[Message] {
        &self.replies
    }

    /// Replies in ascending timestamp order, ties kept in merge order
    pub fn replies_by_time(&self) -> Vec<&Message> {
        let mut replies: Vec<&Message> = self.replies.iter().collect();
        replies.sort_by_key(|m| m.timestamp);
        replies
    }
}

/// Outcome of an insert into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// Message id already indexed; nothing changed
    Duplicate,
    /// Reply whose thread start is not indexed
    MissingThread,
}

/// Only `ThreadBuilder` mutates the index; everything else sees `&ThreadIndex`.
#[derive(Debug, Default, Clone)]
pub struct ThreadIndex {
    threads: Vec<Thread>,
    positions: HashMap<u64, usize>,
    message_ids: HashSet<u64>,
}

impl ThreadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Thread> {
        self.positions.get(&id).map(|&pos| &self.threads[pos])
    }

    /// Threads in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    pub fn thread_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.threads.iter().map(Thread::id)
    }

    /// True if any thread start or reply with this id is indexed
    pub fn contains_message(&self, id: u64) -> bool {
        self.message_ids.contains(&id)
    }

    /// Total number of indexed messages, starts and replies
    pub fn message_count(&self) -> usize {
        self.message_ids.len()
    }

    pub(crate) fn insert_thread(&mut self, first_message: Message) -> Insert {
        if self.message_ids.contains(&first_message.id) {
            return Insert::Duplicate;
        }
        self.message_ids.insert(first_message.id);
        self.positions.insert(first_message.id, self.threads.len());
        self.threads.push(Thread::new(first_message));
        Insert::Added
    }

    pub(crate) fn attach_reply(&mut self, reply: Message) -> Insert {
        if self.message_ids.contains(&reply.id) {
            return Insert::Duplicate;
        }
        let Some(&pos) = reply.reply_to.and_then(|id| self.positions.get(&id)) else {
            return Insert::MissingThread;
        };
        self.message_ids.insert(reply.id);
        self.threads[pos].replies.push(reply);
        Insert::Added
    }

    pub(crate) fn clear(&mut self) {
        self.threads.clear();
        self.positions.clear();
        self.message_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_attach() {
        let mut index = ThreadIndex::new();
        assert_eq!(index.insert_thread(Message::new(1, "hi", 100, None)), Insert::Added);
        assert_eq!(index.attach_reply(Message::new(2, "yo", 200, Some(1))), Insert::Added);

        let thread = index.get(1).unwrap();
        assert_eq!(thread.replies().len(), 1);
        assert_eq!(index.message_count(), 2);
    }

    #[test]
    fn test_duplicates_are_noops() {
        let mut index = ThreadIndex::new();
        index.insert_thread(Message::new(1, "hi", 100, None));
        index.attach_reply(Message::new(2, "yo", 200, Some(1)));

        assert_eq!(index.insert_thread(Message::new(1, "hi", 100, None)), Insert::Duplicate);
        assert_eq!(index.attach_reply(Message::new(2, "yo", 200, Some(1))), Insert::Duplicate);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1).unwrap().replies().len(), 1);
    }

    #[test]
    fn test_reply_to_unknown_thread() {
        let mut index = ThreadIndex::new();
        assert_eq!(
            index.attach_reply(Message::new(2, "yo", 200, Some(1))),
            Insert::MissingThread
        );
        assert!(!index.contains_message(2));
    }

    #[test]
    fn test_replies_by_time() {
        let mut index = ThreadIndex::new();
        index.insert_thread(Message::new(1, "start", 100, None));
        index.attach_reply(Message::new(4, "late", 400, Some(1)));
        index.attach_reply(Message::new(2, "early", 200, Some(1)));
        index.attach_reply(Message::new(3, "tie", 200, Some(1)));

        let ids: Vec<u64> = index.get(1).unwrap().replies_by_time().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_clear() {
        let mut index = ThreadIndex::new();
        index.insert_thread(Message::new(1, "hi", 100, None));
        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains_message(1));
    }
}
