//! Fallback/retry composition of a main updater (normally the SSE
//! streamer) and an optional fallback (normally the poller).
//!
//! Mirrors `FlagConfigUpdaterFallbackRetryWrapper` in
//! `original_source/.../flag/flag_config_updater.py`: a three-state
//! machine (main healthy / running on the fallback / both down) that
//! retries the main updater on a jittered constant delay until it
//! recovers, generalized from that class's `threading.Event`/`RLock`
//! coordination to a `Mutex<State>` plus `tokio::task::spawn` retry
//! loops.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::Result;
use crate::error::Error;

use super::updater::{ErrorCallback, FlagConfigUpdater};

const RETRY_INTERVAL_MILLIS: u64 = 15_000;
const RETRY_JITTER_MILLIS: u64 = 5_000;

fn jittered_retry_delay() -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MILLIS);
    Duration::from_millis(RETRY_INTERVAL_MILLIS + jitter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MainRunning,
    FallbackRunning,
    BothDown,
}

struct Inner {
    main: Box<dyn FlagConfigUpdater>,
    fallback: Option<Box<dyn FlagConfigUpdater>>,
    state: Mutex<State>,
    main_retry: Mutex<Option<JoinHandle<()>>>,
}

/// Keeps a flag updater running no matter what: while the main updater is
/// healthy it is the only thing running; if it fails, the fallback (when
/// configured) takes over while the main updater is retried in the
/// background on a jittered delay; if both are down, retries continue
/// until the main updater recovers.
pub struct FallbackRetryWrapper {
    inner: Arc<Inner>,
}

impl FallbackRetryWrapper {
    pub fn new(main: Box<dyn FlagConfigUpdater>, fallback: Option<Box<dyn FlagConfigUpdater>>) -> Self {
        FallbackRetryWrapper {
            inner: Arc::new(Inner {
                main,
                fallback,
                state: Mutex::new(State::MainRunning),
                main_retry: Mutex::new(None),
            }),
        }
    }

    /// The wrapper's current view of which updater is serving traffic.
    /// Exposed for tests and diagnostics.
    fn state(&self) -> State {
        *self.inner.state.lock().unwrap()
    }
}

/// The main updater failed. Promote the fallback (if any) and make sure a
/// retry loop for the main updater is running.
fn handle_main_failure(inner: Arc<Inner>, err: Error, outer_on_error: Option<ErrorCallback>) {
    tokio::spawn(async move {
        log::warn!(target: "flagcore"; "main flag updater failed: {err}");

        if let Some(fallback) = &inner.fallback {
            let inner_for_fallback = inner.clone();
            let outer_for_fallback = outer_on_error.clone();
            let fallback_on_error: ErrorCallback = Arc::new(move |err| {
                handle_fallback_failure(inner_for_fallback.clone(), err, outer_for_fallback.clone());
            });

            match fallback.start(Some(fallback_on_error)).await {
                Ok(()) => {
                    *inner.state.lock().unwrap() = State::FallbackRunning;
                }
                Err(fallback_err) => {
                    log::warn!(target: "flagcore"; "fallback flag updater also failed to start: {fallback_err}");
                    *inner.state.lock().unwrap() = State::BothDown;
                    if let Some(cb) = &outer_on_error {
                        cb(fallback_err);
                    }
                }
            }
        } else {
            *inner.state.lock().unwrap() = State::BothDown;
            if let Some(cb) = &outer_on_error {
                cb(err);
            }
        }

        ensure_main_retry_running(&inner, outer_on_error);
    });
}

/// The fallback updater failed while standing in for the main one. There
/// is nothing left to run; the main-updater retry loop (already started
/// when we switched to the fallback) is the only path back.
fn handle_fallback_failure(inner: Arc<Inner>, err: Error, outer_on_error: Option<ErrorCallback>) {
    log::warn!(target: "flagcore"; "fallback flag updater failed: {err}");
    *inner.state.lock().unwrap() = State::BothDown;
    if let Some(cb) = &outer_on_error {
        cb(err);
    }
}

fn ensure_main_retry_running(inner: &Arc<Inner>, outer_on_error: Option<ErrorCallback>) {
    let mut guard = inner.main_retry.lock().unwrap();
    if guard.is_some() {
        return;
    }

    let inner = inner.clone();
    *guard = Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered_retry_delay()).await;

            let inner_for_cb = inner.clone();
            let outer_for_cb = outer_on_error.clone();
            let main_on_error: ErrorCallback = Arc::new(move |err| {
                handle_main_failure(inner_for_cb.clone(), err, outer_for_cb.clone());
            });

            match inner.main.start(Some(main_on_error)).await {
                Ok(()) => {
                    if let Some(fallback) = &inner.fallback {
                        fallback.stop().await;
                    }
                    *inner.state.lock().unwrap() = State::MainRunning;
                    *inner.main_retry.lock().unwrap() = None;
                    log::info!(target: "flagcore"; "main flag updater recovered");
                    return;
                }
                Err(err) => {
                    log::warn!(target: "flagcore"; "main flag updater retry attempt failed: {err}");
                }
            }
        }
    }));
}

#[async_trait]
impl FlagConfigUpdater for FallbackRetryWrapper {
    async fn start(&self, on_error: Option<ErrorCallback>) -> Result<()> {
        let inner = self.inner.clone();

        let inner_for_cb = inner.clone();
        let outer_for_cb = on_error.clone();
        let main_on_error: ErrorCallback = Arc::new(move |err| {
            handle_main_failure(inner_for_cb.clone(), err, outer_for_cb.clone());
        });

        match inner.main.start(Some(main_on_error)).await {
            Ok(()) => {
                *inner.state.lock().unwrap() = State::MainRunning;
                Ok(())
            }
            Err(main_err) => {
                let Some(fallback) = &inner.fallback else {
                    return Err(main_err);
                };

                let inner_for_fallback = inner.clone();
                let outer_for_fallback = on_error.clone();
                let fallback_on_error: ErrorCallback = Arc::new(move |err| {
                    handle_fallback_failure(inner_for_fallback.clone(), err, outer_for_fallback.clone());
                });

                fallback.start(Some(fallback_on_error)).await?;
                *inner.state.lock().unwrap() = State::FallbackRunning;
                ensure_main_retry_running(&inner, on_error);
                Ok(())
            }
        }
    }

    async fn stop(&self) {
        if let Some(handle) = self.inner.main_retry.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.main.stop().await;
        if let Some(fallback) = &self.inner.fallback {
            fallback.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeUpdater {
        /// Number of leading `start` calls that should fail.
        fail_first: usize,
        attempts: AtomicUsize,
    }

    impl FakeUpdater {
        fn new(fail_first: usize) -> Self {
            FakeUpdater {
                fail_first,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FlagConfigUpdater for FakeUpdater {
        async fn start(&self, _on_error: Option<ErrorCallback>) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                Err(Error::FetchError(500))
            } else {
                Ok(())
            }
        }

        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn start_propagates_failure_when_no_fallback() {
        let wrapper = FallbackRetryWrapper::new(Box::new(FakeUpdater::new(usize::MAX)), None);
        assert!(wrapper.start(None).await.is_err());
    }

    #[tokio::test]
    async fn start_falls_back_when_main_fails_but_fallback_succeeds() {
        let main = Box::new(FakeUpdater::new(usize::MAX));
        let fallback = Box::new(FakeUpdater::new(0));
        let wrapper = FallbackRetryWrapper::new(main, fallback);
        assert!(wrapper.start(None).await.is_ok());
        assert_eq!(wrapper.state(), State::FallbackRunning);
    }

    #[tokio::test]
    async fn start_succeeds_directly_when_main_is_healthy() {
        let wrapper = FallbackRetryWrapper::new(Box::new(FakeUpdater::new(0)), None);
        assert!(wrapper.start(None).await.is_ok());
        assert_eq!(wrapper.state(), State::MainRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_recovers_main_after_transient_failure() {
        // Main fails its first attempt (the direct `start()` call) but
        // succeeds on the retry loop's first attempt.
        let main = Box::new(FakeUpdater::new(1));
        let fallback = Box::new(FakeUpdater::new(0));
        let wrapper = FallbackRetryWrapper::new(main, fallback);
        wrapper.start(None).await.unwrap();
        assert_eq!(wrapper.state(), State::FallbackRunning);

        tokio::time::advance(Duration::from_millis(
            RETRY_INTERVAL_MILLIS + RETRY_JITTER_MILLIS + 1_000,
        ))
        .await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(wrapper.state(), State::MainRunning);
    }
}
