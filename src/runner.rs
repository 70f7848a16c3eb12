//! Lifecycle orchestrator: starts/stops the flag updater and a
//! background cohort-sync poller.
//!
//! Mirrors `DeploymentRunner` in
//! `original_source/.../deployment/deployment_runner.py`: `start` takes a
//! lock, brings the flag updater up (propagating a first-load failure),
//! then -- if cohort sync is configured -- starts a periodic task that
//! re-downloads whatever cohorts the currently stored flags reference,
//! generalized from that file's own `Poller` to `tokio::task::spawn`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::sync::Mutex as AsyncMutex;

use crate::cohort::CohortLoader;
use crate::flags::{FlagConfigStorage, FlagConfigUpdater};
use crate::Result;

pub struct DeploymentRunner {
    flag_updater: Box<dyn FlagConfigUpdater>,
    flag_storage: Arc<FlagConfigStorage>,
    cohort_loader: Option<Arc<CohortLoader>>,
    cohort_polling_interval: Duration,
    cohort_sync_task: Mutex<Option<JoinHandle<()>>>,
    lifecycle: AsyncMutex<()>,
}

impl DeploymentRunner {
    pub fn new(
        flag_updater: Box<dyn FlagConfigUpdater>,
        flag_storage: Arc<FlagConfigStorage>,
        cohort_loader: Option<Arc<CohortLoader>>,
        cohort_polling_interval: Duration,
    ) -> Self {
        DeploymentRunner {
            flag_updater,
            flag_storage,
            cohort_loader,
            cohort_polling_interval,
            cohort_sync_task: Mutex::new(None),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Start the flag updater (propagating a first-load failure) and, if
    /// cohort sync is configured, the cohort-sync poller. Does not return
    /// until the flag updater has applied its first batch.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.flag_updater.start(None).await?;

        let Some(cohort_loader) = self.cohort_loader.clone() else {
            return Ok(());
        };

        let flag_storage = self.flag_storage.clone();
        let interval = self.cohort_polling_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let ids: HashSet<String> = flag_storage
                    .get_all()
                    .values()
                    .flat_map(|f| f.cohort_ids())
                    .collect();
                if ids.is_empty() {
                    continue;
                }
                if let Err(err) = cohort_loader.download_cohorts(ids).await {
                    log::warn!(target: "flagcore"; "cohort sync poll failed: {err}");
                }
            }
        });
        *self.cohort_sync_task.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Stop the cohort-sync poller and the flag updater. Idempotent.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        if let Some(handle) = self.cohort_sync_task.lock().unwrap().take() {
            handle.abort();
        }
        self.flag_updater.stop().await;
    }
}
