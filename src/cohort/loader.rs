//! De-duplicate concurrent downloads of the same cohort; bulk download.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Semaphore;

use crate::cohort::downloader::CohortDownloader;
use crate::cohort::storage::CohortStorage;
use crate::{Error, Result};

const MAX_CONCURRENT_DOWNLOADS: usize = 32;

type SharedDownload = Shared<BoxFuture<'static, Result<()>>>;

/// Guards against concurrent duplicate downloads of the same cohort id and
/// bounds overall concurrency to a fixed worker pool, mirroring
/// `original_source/.../cohort/cohort_loader.py`'s
/// `ThreadPoolExecutor`-backed single-flight map.
pub struct CohortLoader {
    downloader: Arc<CohortDownloader>,
    storage: Arc<CohortStorage>,
    jobs: Arc<Mutex<HashMap<String, SharedDownload>>>,
    semaphore: Arc<Semaphore>,
}

impl CohortLoader {
    pub fn new(downloader: CohortDownloader, storage: Arc<CohortStorage>) -> Self {
        CohortLoader {
            downloader: Arc::new(downloader),
            storage,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS)),
        }
    }

    /// Returns a future for `id`'s download. If one is already in flight,
    /// returns a clone of it instead of starting a new request.
    pub fn load_cohort(&self, id: impl Into<String>) -> SharedDownload {
        let id = id.into();
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs.get(&id) {
            return existing.clone();
        }

        let downloader = self.downloader.clone();
        let storage = self.storage.clone();
        let semaphore = self.semaphore.clone();
        let jobs_handle = self.jobs.clone();
        let id_for_task = id.clone();

        let task = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let existing = storage.get_cohort(&id_for_task);
            let result = downloader.get_cohort(&id_for_task, existing.as_ref()).await;
            jobs_handle.lock().unwrap().remove(&id_for_task);
            match result {
                Ok(Some(cohort)) => {
                    storage.put_cohort(cohort);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            }
        });

        let future: BoxFuture<'static, Result<()>> = async move {
            task.await.unwrap_or(Err(Error::TaskPanicked))
        }
        .boxed();
        let shared = future.shared();
        jobs.insert(id, shared.clone());
        shared
    }

    /// Start all of `ids` via [`CohortLoader::load_cohort`] and await them,
    /// aggregating per-id errors into a single [`Error::CohortsDownload`].
    pub async fn download_cohorts(
        &self,
        ids: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let downloads: Vec<(String, SharedDownload)> = ids
            .into_iter()
            .map(|id| {
                let fut = self.load_cohort(id.clone());
                (id, fut)
            })
            .collect();

        let mut errors = Vec::new();
        for (id, fut) in downloads {
            if let Err(err) = fut.await {
                errors.push((id, err));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::CohortsDownload(errors))
        }
    }
}
