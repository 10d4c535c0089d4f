/// A synchronized room: DeltaSync, Replier and session state behind one handle
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::local_cache::LocalCache;
use crate::ordering::{order_threads, ThreadView, ViewState};
use crate::remote::RoomServer;
use crate::replier::Replier;
use crate::session_state::SessionState;
use crate::sync::{DeltaSync, SyncReport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct Room<S> {
    name: String,
    server: S,
    /// Held for the whole cycle; `try_lock` failing means a cycle is in flight
    cycle: Mutex<()>,
    /// Held only while a fetched delta is applied, never across the fetch
    sync: Arc<Mutex<DeltaSync<S>>>,
    replier: Replier<S>,
    session: SessionState,
    poll_interval: Duration,
}

impl<S: RoomServer + Clone> Room<S> {
    /// Record the visit and rebuild the index from the local cache
    pub async fn open(
        name: impl Into<String>,
        server: S,
        cache: LocalCache,
        session: SessionState,
        config: &Config,
    ) -> Result<Self> {
        let name = name.into();
        cache.record_room(&name).await?;

        let mut sync = DeltaSync::new(name.clone(), server.clone(), cache, config.dangling_warn_after);
        sync.restore()?;

        info!("Opened room {}", name);
        Ok(Self {
            replier: Replier::new(server.clone(), name.clone()),
            name,
            server,
            cycle: Mutex::new(()),
            sync: Arc::new(Mutex::new(sync)),
            session,
            poll_interval: config.poll_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// One sync cycle. Fails with `Busy` instead of overlapping a running one.
    /// Readers keep seeing the previous index while the fetch is outstanding.
    pub async fn refresh(&self) -> Result<SyncReport> {
        let _cycle = self
            .cycle
            .try_lock()
            .map_err(|_| SyncError::Busy(self.name.clone()))?;

        let delta = self.server.fetch(&self.name).await.map_err(|e| {
            warn!("Refresh of {} aborted: {}", self.name, e);
            e
        })?;
        self.sync.lock().await.apply(delta).await
    }

    /// Submit a message and, if the server answered, pull it back in with a refresh.
    /// Returns the acknowledgment or the failure text.
    pub async fn post(&self, thread_id: Option<u64>, content: &str) -> String {
        let result = self.replier.try_submit(thread_id, content).await;
        let answered = result.is_ok();
        let ack = self.replier.acknowledge(result);

        if answered {
            match self.refresh().await {
                Ok(report) => debug!("Post-submit refresh of {}: {:?}", self.name, report),
                Err(e) => warn!("Post-submit refresh of {} failed: {}", self.name, e),
            }
        }
        ack
    }

    /// Ordered threads for the room's current view state
    pub async fn threads(&self) -> Vec<ThreadView> {
        let view = self.session.view_state(&self.name).await;
        self.threads_with(&view).await
    }

    /// Ordered threads for an explicit view state, expanded flags filled in
    pub async fn threads_with(&self, view: &ViewState) -> Vec<ThreadView> {
        let mut views = {
            let sync = self.sync.lock().await;
            order_threads(sync.index(), view)
        };
        for v in &mut views {
            v.expanded = self.session.is_expanded(&self.name, v.id).await;
        }
        views
    }

    pub async fn toggle_thread(&self, thread_id: u64) -> bool {
        self.session.toggle_expanded(&self.name, thread_id).await
    }

    /// Buffered replies still waiting for their thread start
    pub async fn pending_replies(&self) -> usize {
        self.sync.lock().await.pending_replies()
    }

    /// Refresh every poll interval until `shutdown` resolves. Failed cycles are
    /// logged and retried on the next tick.
    pub async fn watch<F, R>(&self, shutdown: F, mut on_report: R)
    where
        F: Future<Output = ()>,
        R: FnMut(&SyncReport),
    {
        let mut ticker = interval(self.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopped watching {}", self.name);
                    break;
                }
                _ = ticker.tick() => match self.refresh().await {
                    Ok(report) => {
                        if report.changed() {
                            info!(
                                "{}: +{} threads, +{} replies",
                                self.name, report.build.threads_added, report.build.replies_attached
                            );
                        }
                        on_report(&report);
                    }
                    Err(e) => warn!("Refresh of {} failed: {}", self.name, e),
                },
            }
        }
    }
}
