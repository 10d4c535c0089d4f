/// Thread ordering for display
///
/// A pure function of the index and the view state: threads with more search
/// hits come first, then by thread start time in the chosen direction, then
/// in index insertion order.
use crate::message::Message;
use crate::thread_index::{Thread, ThreadIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderMode {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMode::NewestFirst => write!(f, "newest-first"),
            OrderMode::OldestFirst => write!(f, "oldest-first"),
        }
    }
}

impl FromStr for OrderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" | "newest-first" => Ok(OrderMode::NewestFirst),
            "oldest" | "oldest-first" => Ok(OrderMode::OldestFirst),
            other => Err(format!("unknown order mode: {}", other)),
        }
    }
}

/// Per-room view settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub search_text: String,
    pub order_mode: OrderMode,
}

impl ViewState {
    pub fn new(search_text: impl Into<String>, order_mode: OrderMode) -> Self {
        Self {
            search_text: search_text.into(),
            order_mode,
        }
    }
}

/// A thread as presented: replies in timestamp order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    pub id: u64,
    pub first_message: Message,
    pub replies: Vec<Message>,
    pub match_count: usize,
    /// Filled in from session state by the caller; `false` here
    pub expanded: bool,
}

impl ThreadView {
    fn from_thread(thread: &Thread, needle: &str) -> Self {
        let match_count = if needle.is_empty() {
            0
        } else {
            count_matches(&thread.first_message().content, needle)
                + thread
                    .replies()
                    .iter()
                    .map(|r| count_matches(&r.content, needle))
                    .sum::<usize>()
        };

        Self {
            id: thread.id(),
            first_message: thread.first_message().clone(),
            replies: thread.replies_by_time().into_iter().cloned().collect(),
            match_count,
            expanded: false,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.first_message.timestamp
    }
}

/// Ordered, scored views of every thread in `index`
pub fn order_threads(index: &ThreadIndex, view: &ViewState) -> Vec<ThreadView> {
    let needle = view.search_text.trim().to_lowercase();
    let mut views: Vec<ThreadView> = index
        .iter()
        .map(|thread| ThreadView::from_thread(thread, &needle))
        .collect();

    // sort_by is stable: equal keys keep insertion order
    views.sort_by(|a, b| {
        b.match_count
            .cmp(&a.match_count)
            .then_with(|| by_time(a, b, view.order_mode))
    });
    views
}

fn by_time(a: &ThreadView, b: &ThreadView, mode: OrderMode) -> Ordering {
    match mode {
        OrderMode::NewestFirst => b.timestamp().cmp(&a.timestamp()),
        OrderMode::OldestFirst => a.timestamp().cmp(&b.timestamp()),
    }
}

/// Case-insensitive, non-overlapping occurrences of `needle` (already lowercase)
pub fn count_matches(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.to_lowercase().matches(needle).count()
}
