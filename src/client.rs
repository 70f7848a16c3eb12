//! Public façade wiring storages, updaters, the evaluation engine, and the
//! event emitters together.
//!
//! Mirrors the shape of `rust-sdk/src/client.rs`'s `Client`: a thin struct
//! around shared storages plus extensively documented public methods, with
//! a private test-only constructor that skips the network-touching updater
//! wiring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cohort::{CohortDownloader, CohortLoader, CohortStorage};
use crate::config::LocalEvaluationConfig;
use crate::context::EvaluationContext;
use crate::dedup::DedupFilter;
use crate::error::Result;
use crate::eval::{self, topological_sort, Assignment};
use crate::events::{AnalyticsSink, AssignmentEvent, AssignmentService, Exposure, ExposureService};
use crate::flags::{
    FallbackRetryWrapper, FlagConfigApi, FlagConfigPoller, FlagConfigStorage, FlagConfigStreamer,
    FlagConfigUpdater,
};
use crate::runner::DeploymentRunner;

/// Per-call knobs for [`LocalEvaluationClient::evaluate`].
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    /// Restrict evaluation to these flags (and their transitive
    /// dependencies). `None` evaluates every stored flag.
    pub flag_keys: Option<Vec<String>>,
    /// Emit an exposure event for the variants this call assigns.
    pub track_exposure: bool,
    /// Emit the deprecated per-flag assignment event as well.
    pub track_assignment: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        EvaluateOptions {
            flag_keys: None,
            track_exposure: true,
            track_assignment: false,
        }
    }
}

/// Wires together [`FlagConfigStorage`], [`CohortStorage`], the
/// synchronization updaters, the pure evaluator, and the event emitters
/// behind a single `Evaluate(user, flagKeys?, options?)` call.
pub struct LocalEvaluationClient {
    flag_storage: Arc<FlagConfigStorage>,
    cohort_storage: Option<Arc<CohortStorage>>,
    runner: DeploymentRunner,
    exposure_service: Option<ExposureService>,
    assignment_service: Option<AssignmentService>,
}

impl LocalEvaluationClient {
    /// Build a client for the given deployment key, wiring the poller (and
    /// the SSE streamer + fallback wrapper, when `config.stream_updates`)
    /// and, if `config.cohort_sync_config` is set, the cohort loader and
    /// its storage.
    pub fn new(
        deployment_key: impl Into<String>,
        config: LocalEvaluationConfig,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let flag_storage = Arc::new(FlagConfigStorage::new());
        let flag_api = Arc::new(FlagConfigApi::new(
            config.server_url.clone(),
            config.stream_server_url.clone(),
            deployment_key.into(),
            config.flag_config_poller_request_timeout(),
        ));

        let cohorts = config.cohort_sync_config.as_ref().map(|cohort_config| {
            let cohort_storage = Arc::new(CohortStorage::new());
            let downloader = CohortDownloader::new(
                cohort_config.cohort_server_url.clone(),
                cohort_config.api_key.clone(),
                cohort_config.secret_key.clone(),
                cohort_config.max_cohort_size,
                Duration::from_millis(cohort_config.cohort_request_timeout_millis),
            );
            let loader = Arc::new(CohortLoader::new(downloader, cohort_storage.clone()));
            (loader, cohort_storage)
        });

        let poller: Box<dyn FlagConfigUpdater> = Box::new(FlagConfigPoller::new(
            flag_api.clone(),
            flag_storage.clone(),
            cohorts.clone(),
            config.flag_config_polling_interval(),
        ));

        let flag_updater: Box<dyn FlagConfigUpdater> = if config.stream_updates {
            let streamer: Box<dyn FlagConfigUpdater> = Box::new(FlagConfigStreamer::new(
                flag_api,
                flag_storage.clone(),
                cohorts.clone(),
                config.stream_flag_conn_timeout(),
                config.stream_max_conn_duration(),
                config.stream_keep_alive_timeout(),
            ));
            Box::new(FallbackRetryWrapper::new(streamer, Some(poller)))
        } else {
            poller
        };

        let runner = DeploymentRunner::new(
            flag_updater,
            flag_storage.clone(),
            cohorts.as_ref().map(|(loader, _)| loader.clone()),
            config.cohort_polling_interval(),
        );

        LocalEvaluationClient {
            flag_storage,
            cohort_storage: cohorts.map(|(_, storage)| storage),
            runner,
            exposure_service: Some(ExposureService::new(
                sink.clone(),
                DedupFilter::new(config.exposure_dedup),
            )),
            assignment_service: Some(AssignmentService::new(sink, DedupFilter::new(config.assignment_dedup))),
        }
    }

    /// Start the background synchronization subsystem. Does not return
    /// until the first flag batch has been applied.
    pub async fn start(&self) -> Result<()> {
        self.runner.start().await
    }

    /// Stop the background synchronization subsystem.
    pub async fn stop(&self) {
        self.runner.stop().await
    }

    /// Evaluate every stored flag (or `options.flag_keys`, if set) against
    /// `context`, returning the assigned variant per matched flag.
    ///
    /// Never fails: a dependency cycle is logged and degrades to an empty
    /// result, matching the "Evaluate never raises" rule.
    pub fn evaluate(&self, context: &EvaluationContext, options: EvaluateOptions) -> BTreeMap<String, Assignment> {
        let flags = self.flag_storage.get_all();
        if flags.is_empty() {
            return BTreeMap::new();
        }

        let sorted = match topological_sort(&flags, options.flag_keys.as_deref()) {
            Ok(sorted) => sorted,
            Err(err) => {
                log::warn!(target: "flagcore"; "flag dependency cycle detected, degrading to empty result: {err}");
                return BTreeMap::new();
            }
        };

        let enriched = self.enrich(context);
        let target = enriched.to_value();
        let variants = eval::evaluate(&target, &sorted);

        let timestamp_millis = chrono::Utc::now().timestamp_millis();
        let groups = group_names(&enriched);

        if options.track_exposure {
            if let Some(service) = &self.exposure_service {
                service.track(Exposure {
                    user_id: enriched.user_id.clone(),
                    device_id: enriched.device_id.clone(),
                    groups: groups.clone(),
                    results: variants.clone(),
                    timestamp_millis,
                });
            }
        }
        if options.track_assignment {
            if let Some(service) = &self.assignment_service {
                service.track(AssignmentEvent {
                    user_id: enriched.user_id.clone(),
                    device_id: enriched.device_id.clone(),
                    groups,
                    results: variants.clone(),
                    timestamp_millis,
                });
            }
        }

        variants
    }

    /// Populate `cohort_ids`/`group_cohort_ids` on a copy of `context` by
    /// intersecting its user id and each group's name with the cohorts
    /// currently in storage.
    fn enrich(&self, context: &EvaluationContext) -> EvaluationContext {
        let mut enriched = context.clone();
        let Some(cohort_storage) = &self.cohort_storage else {
            return enriched;
        };

        let candidate_ids = cohort_storage.get_all_ids();
        if let Some(user_id) = &context.user_id {
            enriched.cohort_ids = cohort_storage
                .cohorts_for_member("User", user_id, &candidate_ids)
                .into_iter()
                .collect();
        }

        for (group_type, names) in context.group_names() {
            let Some(name) = names.first() else { continue };
            let ids = cohort_storage.cohorts_for_member(&group_type, name, &candidate_ids);
            if !ids.is_empty() {
                enriched.group_cohort_ids.insert(group_type, ids.into_iter().collect());
            }
        }

        enriched
    }

    #[cfg(test)]
    fn new_for_test(
        flag_storage: Arc<FlagConfigStorage>,
        cohort_storage: Option<Arc<CohortStorage>>,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        use crate::config::DedupConfig;

        struct NoopUpdater;
        #[async_trait::async_trait]
        impl FlagConfigUpdater for NoopUpdater {
            async fn start(&self, _on_error: Option<crate::flags::ErrorCallback>) -> Result<()> {
                Ok(())
            }
            async fn stop(&self) {}
        }

        let runner = DeploymentRunner::new(
            Box::new(NoopUpdater),
            flag_storage.clone(),
            None,
            Duration::from_secs(60),
        );

        LocalEvaluationClient {
            flag_storage,
            cohort_storage,
            runner,
            exposure_service: Some(ExposureService::new(sink.clone(), DedupFilter::new(DedupConfig::default()))),
            assignment_service: Some(AssignmentService::new(sink, DedupFilter::new(DedupConfig::default()))),
        }
    }
}

fn group_names(context: &EvaluationContext) -> BTreeMap<String, String> {
    context
        .group_names()
        .into_iter()
        .filter_map(|(ty, mut names)| names.pop().map(|name| (ty, name)))
        .collect()
}
