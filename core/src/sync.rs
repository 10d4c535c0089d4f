/// One room's synchronization cycle: fetch, persist, merge
///
/// The cache is always written (and flushed) before the index is touched,
/// so a restart that replays the cache never sees less than the index did.
use crate::error::Result;
use crate::local_cache::LocalCache;
use crate::message::{Delta, Message};
use crate::remote::RoomServer;
use crate::thread_builder::{BuildReport, ThreadBuilder};
use crate::thread_index::ThreadIndex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Summary of one completed cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Messages in the delta as delivered
    pub received: usize,
    /// Messages written to the cache
    pub stored: usize,
    /// The delta carried `clean_stored`
    pub invalidated: bool,
    pub build: BuildReport,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.invalidated || self.build.changed()
    }
}

pub struct DeltaSync<S> {
    room: String,
    server: S,
    cache: LocalCache,
    index: ThreadIndex,
    builder: ThreadBuilder,
}

impl<S: RoomServer> DeltaSync<S> {
    pub fn new(room: impl Into<String>, server: S, cache: LocalCache, dangling_warn_after: u32) -> Self {
        Self {
            room: room.into(),
            server,
            cache,
            index: ThreadIndex::new(),
            builder: ThreadBuilder::new(dangling_warn_after),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Read-only view of the live index
    pub fn index(&self) -> &ThreadIndex {
        &self.index
    }

    pub fn pending_replies(&self) -> usize {
        self.builder.pending_len()
    }

    /// Rebuild the index from the cached log alone
    pub fn restore(&mut self) -> Result<BuildReport> {
        let messages = self.cache.load(&self.room)?;
        self.index.clear();
        self.builder.reset();

        let report = self.builder.apply(&mut self.index, &messages);
        info!(
            "Restored {} threads for {} from {} cached messages",
            self.index.len(),
            self.room,
            messages.len()
        );
        Ok(report)
    }

    /// Run one cycle. On error nothing in the cache or index has changed.
    pub async fn refresh(&mut self) -> Result<SyncReport> {
        let delta = self.server.fetch(&self.room).await.map_err(|e| {
            warn!("Refresh of {} aborted: {}", self.room, e);
            e
        })?;
        self.apply(delta).await
    }

    /// Persist and merge a delta that has already been fetched
    pub async fn apply(&mut self, delta: Delta) -> Result<SyncReport> {
        let received = delta.messages.len();
        let invalidated = delta.clean_stored;

        let fresh = if invalidated {
            let fresh = dedup(delta.messages, |_| false);
            self.cache.replace(&self.room, &fresh).await?;
            info!("Server invalidated {}; discarding local state", self.room);
            self.index.clear();
            self.builder.reset();
            fresh
        } else {
            let index = &self.index;
            let builder = &self.builder;
            let fresh = dedup(delta.messages, |id| {
                index.contains_message(id) || builder.is_pending(id)
            });
            self.cache.append(&self.room, &fresh).await?;
            fresh
        };

        let build = self.builder.apply(&mut self.index, &fresh);
        for dangling in &build.dangling {
            debug!("Unresolved in {}: {}", self.room, dangling);
        }

        Ok(SyncReport {
            received,
            stored: fresh.len(),
            invalidated,
            build,
        })
    }
}

/// Drop messages already known, and repeats within the batch
fn dedup(messages: Vec<Message>, known: impl Fn(u64) -> bool) -> Vec<Message> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| !known(m.id) && seen.insert(m.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::test_support::{delta, reply, start, ScriptedServer};
    use tempfile::TempDir;

    fn setup(server: &ScriptedServer) -> (TempDir, DeltaSync<ScriptedServer>) {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalCache::new(temp_dir.path()).unwrap();
        let sync = DeltaSync::new("lobby", server.clone(), cache, 3);
        (temp_dir, sync)
    }

    #[tokio::test]
    async fn test_reply_in_later_delta() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "hi", 100)], false));
        server.push(delta(vec![reply(2, 1, "yo", 200)], false));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        sync.refresh().await.unwrap();

        let ids: Vec<u64> = sync.index().thread_ids().collect();
        assert_eq!(ids, vec![1]);
        let replies = sync.index().get(1).unwrap().replies();
        assert_eq!(replies, &[reply(2, 1, "yo", 200)]);
    }

    #[tokio::test]
    async fn test_network_error_leaves_state_untouched() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "hi", 100)], false));
        server.push_err(SyncError::Network("connection reset".to_string()));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        let err = sync.refresh().await.unwrap_err();

        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(sync.index().len(), 1);
        assert_eq!(sync.cache.count("lobby").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidation_keeps_only_new_delta() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "a", 100), reply(2, 1, "b", 150)], false));
        server.push(delta(vec![start(5, "fresh", 500)], true));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        let report = sync.refresh().await.unwrap();

        assert!(report.invalidated);
        let ids: Vec<u64> = sync.index().thread_ids().collect();
        assert_eq!(ids, vec![5]);
        assert_eq!(sync.index().message_count(), 1);
        assert_eq!(sync.cache.load("lobby").unwrap(), vec![start(5, "fresh", 500)]);
    }

    #[tokio::test]
    async fn test_empty_invalidation_empties_index() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "a", 100)], false));
        server.push(delta(vec![], true));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        sync.refresh().await.unwrap();

        assert!(sync.index().is_empty());
        assert_eq!(sync.cache.count("lobby").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_drops_dangling_buffer() {
        let server = ScriptedServer::default();
        server.push(delta(vec![reply(2, 1, "orphan", 200)], false));
        server.push(delta(vec![start(1, "start", 100)], true));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        assert_eq!(sync.pending_replies(), 1);
        sync.refresh().await.unwrap();

        assert_eq!(sync.pending_replies(), 0);
        assert!(sync.index().get(1).unwrap().replies().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_delta_is_not_stored_twice() {
        let server = ScriptedServer::default();
        let batch = vec![start(1, "hi", 100), reply(2, 1, "yo", 200), reply(9, 8, "orphan", 300)];
        server.push(delta(batch.clone(), false));
        server.push(delta(batch, false));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        let report = sync.refresh().await.unwrap();

        assert_eq!(report.received, 3);
        assert_eq!(report.stored, 0);
        assert_eq!(sync.cache.count("lobby").unwrap(), 3);
        assert_eq!(sync.index().get(1).unwrap().replies().len(), 1);
        assert_eq!(sync.pending_replies(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_append_cycle() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "hi", 100), reply(9, 8, "orphan", 150)], false));
        let batch = vec![reply(2, 1, "yo", 200), start(3, "next", 300)];
        server.push(delta(batch.clone(), false));
        server.push(delta(batch, false));
        let (_dir, mut sync) = setup(&server);
        sync.refresh().await.unwrap();

        sync.cache.fail_flushes(true);
        let err = sync.refresh().await.unwrap_err();

        assert!(matches!(err, SyncError::Storage(_)));
        let ids: Vec<u64> = sync.index().thread_ids().collect();
        assert_eq!(ids, vec![1]);
        assert!(sync.index().get(1).unwrap().replies().is_empty());
        assert_eq!(sync.pending_replies(), 1);
        assert_eq!(sync.cache.count("lobby").unwrap(), 2);

        // Redelivery after the failure is stored exactly once
        sync.cache.fail_flushes(false);
        let report = sync.refresh().await.unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(sync.cache.count("lobby").unwrap(), 4);
        assert_eq!(sync.index().len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_invalidation() {
        let server = ScriptedServer::default();
        server.push(delta(vec![start(1, "a", 100), reply(7, 6, "orphan", 120)], false));
        server.push(delta(vec![start(5, "fresh", 500)], true));
        let (_dir, mut sync) = setup(&server);
        sync.refresh().await.unwrap();
        let cached = sync.cache.load("lobby").unwrap();

        sync.cache.fail_flushes(true);
        let err = sync.refresh().await.unwrap_err();

        assert!(matches!(err, SyncError::Storage(_)));
        let ids: Vec<u64> = sync.index().thread_ids().collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(sync.pending_replies(), 1);
        assert_eq!(sync.cache.load("lobby").unwrap(), cached);
    }

    #[tokio::test]
    async fn test_restore_matches_live_index() {
        let server = ScriptedServer::default();
        server.push(delta(vec![reply(3, 1, "early", 50), start(1, "a", 100)], false));
        server.push(delta(vec![start(4, "b", 400), reply(5, 4, "c", 450)], false));
        let (_dir, mut sync) = setup(&server);

        sync.refresh().await.unwrap();
        sync.refresh().await.unwrap();
        let live: Vec<_> = sync.index().iter().cloned().collect();

        sync.restore().unwrap();
        let restored: Vec<_> = sync.index().iter().cloned().collect();
        assert_eq!(live, restored);
    }
}
