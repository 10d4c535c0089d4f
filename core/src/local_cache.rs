/// Durable per-room message log stored in sled
///
/// Layout in `rooms.db`:
///   tree `log/<room>`   u64 big-endian sequence -> JSON message record
///   tree `rooms`        room name -> RFC3339 time of last visit
use crate::error::{Result, SyncError};
use crate::message::Message;
use serde::Serialize;
use std::path::Path;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;
use tracing::{debug, info, warn};

const ROOMS_TREE: &str = "rooms";

/// A room seen on this machine, for cross-room navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitedRoom {
    pub name: String,
    pub last_visit: String,
}

#[derive(Clone)]
pub struct LocalCache {
    db: sled::Db,
    /// Makes every flush fail, to exercise the abort paths
    #[cfg(test)]
    fail_flush: Arc<AtomicBool>,
}

impl LocalCache {
    /// Open (or create) the cache in `data_dir`
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("rooms.db");
        debug!("Opening local cache at {:?}", db_path);

        let db = sled::open(&db_path)
            .map_err(|e| SyncError::Storage(format!("Failed to open rooms DB: {}", e)))?;

        info!("Local cache initialized at {:?}", db_path);
        Ok(Self {
            db,
            #[cfg(test)]
            fail_flush: Arc::new(AtomicBool::new(false)),
        })
    }

    #[cfg(test)]
    pub(crate) fn fail_flushes(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    fn log(&self, room: &str) -> Result<sled::Tree> {
        self.db
            .open_tree(format!("log/{}", room))
            .map_err(|e| SyncError::Storage(format!("Failed to open log for {}: {}", room, e)))
    }

    /// Append messages to the room's log. Returns once the write is flushed;
    /// if the flush fails the appended records are taken back out.
    pub async fn append(&self, room: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let log = self.log(room)?;
        let next = match log.last()? {
            Some((key, _)) => decode_seq(&key)? + 1,
            None => 0,
        };

        let mut batch = sled::Batch::default();
        let mut undo = sled::Batch::default();
        for (offset, msg) in messages.iter().enumerate() {
            let key = (next + offset as u64).to_be_bytes().to_vec();
            let value = serde_json::to_vec(msg).map_err(SyncError::Serialization)?;
            undo.remove(key.clone());
            batch.insert(key, value);
        }

        log.apply_batch(batch)
            .map_err(|e| SyncError::Storage(format!("Failed to append to {}: {}", room, e)))?;
        if let Err(e) = self.flush(&log).await {
            roll_back(&log, undo, room);
            return Err(e);
        }

        debug!("Appended {} messages to {}", messages.len(), room);
        Ok(())
    }

    /// Atomically replace the whole log with `messages`.
    /// The previous log is put back if the flush fails.
    pub async fn replace(&self, room: &str, messages: &[Message]) -> Result<()> {
        let log = self.log(room)?;

        let mut batch = sled::Batch::default();
        let mut undo = sled::Batch::default();
        let mut previous = Vec::with_capacity(log.len());
        for entry in log.iter() {
            let (key, value) = entry?;
            batch.remove(key.clone());
            previous.push((key, value));
        }
        for (seq, msg) in messages.iter().enumerate() {
            let key = (seq as u64).to_be_bytes().to_vec();
            let value = serde_json::to_vec(msg).map_err(SyncError::Serialization)?;
            undo.remove(key.clone());
            batch.insert(key, value);
        }
        // Later operations on the same key win inside a batch
        for (key, value) in previous {
            undo.insert(key, value);
        }

        log.apply_batch(batch)
            .map_err(|e| SyncError::Storage(format!("Failed to reset {}: {}", room, e)))?;
        if let Err(e) = self.flush(&log).await {
            roll_back(&log, undo, room);
            return Err(e);
        }

        info!("Reset log for {} with {} messages", room, messages.len());
        Ok(())
    }

    /// Full log in append order
    pub fn load(&self, room: &str) -> Result<Vec<Message>> {
        let log = self.log(room)?;
        let mut messages = Vec::with_capacity(log.len());

        for entry in log.iter() {
            let (key, value) = entry?;
            let msg = serde_json::from_slice::<Message>(&value).map_err(|e| {
                SyncError::Storage(format!(
                    "Corrupt record {:?} in {}: {}",
                    decode_seq(&key).ok(),
                    room,
                    e
                ))
            })?;
            messages.push(msg);
        }

        Ok(messages)
    }

    /// Number of records in the room's log
    pub fn count(&self, room: &str) -> Result<usize> {
        Ok(self.log(room)?.len())
    }

    /// Remember that `room` was visited
    pub async fn record_room(&self, room: &str) -> Result<()> {
        let rooms = self.db.open_tree(ROOMS_TREE)?;
        rooms
            .insert(room.as_bytes(), chrono::Utc::now().to_rfc3339().as_bytes())
            .map_err(|e| SyncError::Storage(format!("record_room: {}", e)))?;
        self.flush(&rooms).await
    }

    /// Every room ever visited, by name
    pub fn rooms(&self) -> Result<Vec<VisitedRoom>> {
        let rooms = self.db.open_tree(ROOMS_TREE)?;
        let mut out = Vec::new();
        for entry in rooms.iter() {
            let (key, value) = entry?;
            out.push(VisitedRoom {
                name: String::from_utf8_lossy(&key).into_owned(),
                last_visit: String::from_utf8_lossy(&value).into_owned(),
            });
        }
        Ok(out)
    }

    async fn flush(&self, tree: &sled::Tree) -> Result<()> {
        #[cfg(test)]
        {
            if self.fail_flush.load(Ordering::SeqCst) {
                return Err(SyncError::Storage("Failed to flush: injected failure".to_string()));
            }
        }
        tree.flush_async()
            .await
            .map_err(|e| SyncError::Storage(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

/// Undo an applied but unflushed batch so a later retry starts from the old log
fn roll_back(log: &sled::Tree, undo: sled::Batch, room: &str) {
    if let Err(e) = log.apply_batch(undo) {
        warn!("Failed to roll back unflushed write to {}: {}", room, e);
    }
}

fn decode_seq(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| SyncError::Storage(format!("Invalid log key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}
