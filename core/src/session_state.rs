/// Volatile per-session view state: search, order, scroll, expanded threads
///
/// Lives only as long as the process; nothing here is written to disk.
use crate::ordering::{OrderMode, ViewState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct SessionInner {
    views: HashMap<String, ViewState>,
    scroll: HashMap<String, u64>,
    expanded: HashMap<(String, u64), bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    inner: Arc<RwLock<SessionInner>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn view_state(&self, room: &str) -> ViewState {
        self.inner
            .read()
            .await
            .views
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_view_state(&self, room: &str, view: ViewState) {
        self.inner.write().await.views.insert(room.to_string(), view);
    }

    pub async fn set_search(&self, room: &str, search_text: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.views.entry(room.to_string()).or_default().search_text = search_text.into();
    }

    pub async fn set_order_mode(&self, room: &str, order_mode: OrderMode) {
        let mut inner = self.inner.write().await;
        inner.views.entry(room.to_string()).or_default().order_mode = order_mode;
    }

    pub async fn scroll_offset(&self, room: &str) -> u64 {
        self.inner.read().await.scroll.get(room).copied().unwrap_or(0)
    }

    pub async fn set_scroll_offset(&self, room: &str, offset: u64) {
        self.inner.write().await.scroll.insert(room.to_string(), offset);
    }

    pub async fn is_expanded(&self, room: &str, thread_id: u64) -> bool {
        self.inner
            .read()
            .await
            .expanded
            .get(&(room.to_string(), thread_id))
            .copied()
            .unwrap_or(false)
    }

    pub async fn set_expanded(&self, room: &str, thread_id: u64, expanded: bool) {
        self.inner
            .write()
            .await
            .expanded
            .insert((room.to_string(), thread_id), expanded);
    }

    /// Flip the flag once; returns the new value
    pub async fn toggle_expanded(&self, room: &str, thread_id: u64) -> bool {
        let mut inner = self.inner.write().await;
        let flag = inner.expanded.entry((room.to_string(), thread_id)).or_insert(false);
        *flag = !*flag;
        *flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults() {
        let session = SessionState::new();
        assert_eq!(session.view_state("lobby").await, ViewState::default());
        assert_eq!(session.scroll_offset("lobby").await, 0);
        assert!(!session.is_expanded("lobby", 1).await);
    }

    #[tokio::test]
    async fn test_view_state_is_per_room() {
        let session = SessionState::new();
        session.set_search("lobby", "deploy").await;
        session.set_order_mode("lobby", OrderMode::OldestFirst).await;

        let view = session.view_state("lobby").await;
        assert_eq!(view.search_text, "deploy");
        assert_eq!(view.order_mode, OrderMode::OldestFirst);
        assert_eq!(session.view_state("dev").await, ViewState::default());
    }

    #[tokio::test]
    async fn test_toggle_flips_each_time() {
        let session = SessionState::new();
        assert!(session.toggle_expanded("lobby", 4).await);
        assert!(!session.toggle_expanded("lobby", 4).await);
        assert!(session.toggle_expanded("lobby", 4).await);
        assert!(!session.is_expanded("dev", 4).await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let session = SessionState::new();
        let other = session.clone();
        other.set_scroll_offset("lobby", 420).await;
        assert_eq!(session.scroll_offset("lobby").await, 420);
    }
}
