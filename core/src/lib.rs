/// RoomSync - client-side synchronization core for threaded message rooms
///
/// Keeps a durable per-room message log in step with a room server, merges
/// server deltas into an in-memory thread index and orders threads for display.

pub mod error;
pub mod config;
pub mod message;
pub mod thread_index;
pub mod thread_builder;
pub mod local_cache;
pub mod remote;
pub mod sync;
pub mod ordering;
pub mod replier;
pub mod session_state;
pub mod room;
pub mod cli_app;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{DanglingReplyError, Result, SyncError};
pub use config::Config;
pub use message::{Delta, Message};
pub use ordering::{order_threads, OrderMode, ThreadView, ViewState};
pub use room::Room;
