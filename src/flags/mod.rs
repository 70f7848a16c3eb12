//! Flag configuration storage and the three updater implementations
//! (poller, SSE streamer, and the fallback/retry wrapper composing them).

mod api;
mod fallback;
mod poller;
mod reconcile;
mod storage;
mod streamer;
mod updater;

pub use api::FlagConfigApi;
pub use fallback::FallbackRetryWrapper;
pub use poller::FlagConfigPoller;
pub use storage::FlagConfigStorage;
pub use streamer::FlagConfigStreamer;
pub use updater::{ErrorCallback, FlagConfigUpdater};
