//! Shared contract for the three flag-config updater implementations: the
//! poller, the SSE streamer, and the fallback/retry wrapper composing them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, Result};

/// Invoked when a background updater fails after its initial successful
/// load. [`crate::flags::FallbackRetryWrapper`] is the only built-in
/// consumer of a raw updater's `on_error`; callers of
/// [`crate::client::LocalEvaluationClient`] never see this directly.
pub type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// Keeps [`crate::flags::FlagConfigStorage`] fresh.
///
/// `start` must not return until the storage has been populated at least
/// once (the "initial load" property, spec.md §4.10): a first-fetch
/// failure bubbles out of `start` as an `Err`. Once started, later
/// failures are never propagated to the caller — they are reported
/// through `on_error` and the updater stops itself before calling it, so
/// callers (chiefly the fallback wrapper) can react by switching updaters
/// rather than unwinding a call stack.
///
/// Mirrors `FlagConfigUpdater`/`FlagConfigUpdaterBase` in
/// `original_source/.../flag/flag_config_updater.py`, generalized to
/// `async_trait` so a [`FallbackRetryWrapper`] can hold `main`/`fallback`
/// as `Box<dyn FlagConfigUpdater>` the way
/// `libdd-common/src/worker.rs`'s `Worker` trait is held as `Box<dyn
/// Worker>`.
///
/// [`FallbackRetryWrapper`]: crate::flags::FallbackRetryWrapper
#[async_trait]
pub trait FlagConfigUpdater: Send + Sync {
    /// Start the updater. `on_error` is `None` the first time a caller
    /// starts an updater directly (there is nothing to fall back to);
    /// the fallback wrapper always supplies one.
    async fn start(&self, on_error: Option<ErrorCallback>) -> Result<()>;

    /// Stop the updater and release its resources. Idempotent.
    async fn stop(&self);
}
