//! Periodic flag configuration fetcher: the default updater when SSE
//! streaming is disabled, and the fallback updater when it is not.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::cohort::{CohortLoader, CohortStorage};
use crate::Result;

use super::api::FlagConfigApi;
use super::reconcile::reconcile;
use super::storage::FlagConfigStorage;
use super::updater::{ErrorCallback, FlagConfigUpdater};

/// Fetches the full flag configuration set on a fixed interval.
///
/// Mirrors `FlagConfigPoller`/`Poller` in
/// `original_source/.../flag/flag_config_updater.py`: `start` performs one
/// synchronous fetch (propagating failure to the caller, the "initial
/// load" property) before handing periodic refresh off to a background
/// task, generalized from the teacher's OS-thread-based
/// `poller_thread.rs` to a `tokio::task::spawn` loop per spec.md §5.
pub struct FlagConfigPoller {
    api: Arc<FlagConfigApi>,
    storage: Arc<FlagConfigStorage>,
    cohorts: Option<(Arc<CohortLoader>, Arc<CohortStorage>)>,
    polling_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FlagConfigPoller {
    pub fn new(
        api: Arc<FlagConfigApi>,
        storage: Arc<FlagConfigStorage>,
        cohorts: Option<(Arc<CohortLoader>, Arc<CohortStorage>)>,
        polling_interval: Duration,
    ) -> Self {
        FlagConfigPoller {
            api,
            storage,
            cohorts,
            polling_interval,
            task: Mutex::new(None),
        }
    }

    async fn fetch_and_reconcile(&self) -> Result<()> {
        let flags = self.api.fetch_flag_configs().await?;
        let cohorts = self.cohorts.as_ref().map(|(l, s)| (l.as_ref(), s.as_ref()));
        reconcile(&self.storage, cohorts, flags).await;
        Ok(())
    }
}

#[async_trait]
impl FlagConfigUpdater for FlagConfigPoller {
    async fn start(&self, on_error: Option<ErrorCallback>) -> Result<()> {
        self.fetch_and_reconcile().await?;

        let api = self.api.clone();
        let storage = self.storage.clone();
        let cohorts = self.cohorts.clone();
        let polling_interval = self.polling_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(polling_interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                ticker.tick().await;
                let flags = match api.fetch_flag_configs().await {
                    Ok(flags) => flags,
                    Err(err) => {
                        log::warn!(target: "flagcore"; "periodic flag poll failed: {err}");
                        if let Some(on_error) = on_error {
                            on_error(err);
                        }
                        return;
                    }
                };
                let cohorts_ref = cohorts.as_ref().map(|(l, s)| (l.as_ref(), s.as_ref()));
                reconcile(&storage, cohorts_ref, flags).await;
            }
        });

        *self.task.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
