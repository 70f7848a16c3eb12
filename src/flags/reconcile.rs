//! Shared post-fetch reconciliation, invoked by both the poller and the
//! streamer whenever a new batch of flags arrives.

use std::collections::HashSet;

use crate::cohort::{CohortLoader, CohortStorage};
use crate::model::Flag;

use super::storage::FlagConfigStorage;

/// Apply a freshly fetched flag batch to storage.
///
/// Mirrors `FlagConfigUpdaterBase.update()` in
/// `original_source/.../flag/flag_config_updater.py`: flags absent from
/// the new batch are dropped, any newly referenced cohorts are downloaded
/// before the flags that need them are stored (a missing cohort is
/// logged but never blocks storing the flag -- it simply never matches
/// that cohort condition), and cohorts no longer referenced by any stored
/// flag are deleted.
pub async fn reconcile(
    storage: &FlagConfigStorage,
    cohorts: Option<(&CohortLoader, &CohortStorage)>,
    flags: Vec<Flag>,
) {
    let new_keys: HashSet<&str> = flags.iter().map(|f| f.key.as_str()).collect();
    storage.remove_if(|f| !new_keys.contains(f.key.as_str()));

    let Some((cohort_loader, cohort_storage)) = cohorts else {
        for flag in flags {
            storage.put_flag_config(flag);
        }
        return;
    };

    let mut referenced_ids = HashSet::new();
    for flag in &flags {
        referenced_ids.extend(flag.cohort_ids());
    }

    let existing_ids = cohort_storage.get_all_ids();
    let new_ids: Vec<String> = referenced_ids
        .difference(&existing_ids)
        .cloned()
        .collect();

    if !new_ids.is_empty() {
        if let Err(err) = cohort_loader.download_cohorts(new_ids).await {
            log::warn!(target: "flagcore"; "failed to download one or more cohorts: {err}");
        }
    }

    for flag in flags {
        let missing: Vec<String> = flag
            .cohort_ids()
            .into_iter()
            .filter(|id| cohort_storage.get_cohort(id).is_none())
            .collect();
        if !missing.is_empty() {
            let flag_key = flag.key.as_str();
            log::warn!(target: "flagcore", flag_key; "flag references cohort(s) not present in storage: {missing:?}");
        }
        storage.put_flag_config(flag);
    }

    let still_referenced: HashSet<String> = storage
        .get_all()
        .values()
        .flat_map(|f| f.cohort_ids())
        .collect();
    for id in existing_ids.union(&referenced_ids) {
        if !still_referenced.contains(id) {
            if let Some(cohort) = cohort_storage.get_cohort(id) {
                cohort_storage.delete_cohort(&cohort.group_type, id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cohort::CohortDownloader;
    use crate::model::{Cohort, Condition, Operator, Segment};

    fn flag_with_cohort(key: &str, cohort_id: &str) -> Flag {
        Flag {
            key: key.to_owned(),
            variants: BTreeMap::new(),
            segments: vec![Segment {
                bucket: None,
                conditions: Some(vec![vec![Condition {
                    selector: vec!["context".to_owned(), "user".to_owned(), "cohort_ids".to_owned()],
                    op: Operator::SetContainsAny,
                    values: vec![cohort_id.to_owned()],
                }]]),
                variant: None,
                metadata: BTreeMap::new(),
                name: None,
            }],
            dependencies: None,
            metadata: BTreeMap::new(),
            flag_version: None,
            flag_type: None,
        }
    }

    fn loader() -> CohortLoader {
        let downloader = CohortDownloader::new(
            "http://127.0.0.1:1",
            "key",
            "secret",
            1000,
            Duration::from_millis(10),
        );
        CohortLoader::new(downloader, Arc::new(CohortStorage::new()))
    }

    #[tokio::test]
    async fn reconcile_without_cohort_sync_just_stores_flags() {
        let storage = FlagConfigStorage::new();
        reconcile(&storage, None, vec![flag_with_cohort("f1", "c1")]).await;
        assert!(storage.get_flag_config("f1").is_some());
    }

    #[tokio::test]
    async fn reconcile_drops_flags_absent_from_latest_batch() {
        let storage = FlagConfigStorage::new();
        storage.put_flag_config(flag_with_cohort("stale", "c1"));
        reconcile(&storage, None, vec![flag_with_cohort("fresh", "c1")]).await;
        let all = storage.get_all();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("fresh"));
    }

    #[tokio::test]
    async fn reconcile_deletes_cohorts_no_longer_referenced() {
        let storage = FlagConfigStorage::new();
        let cohort_storage = CohortStorage::new();
        cohort_storage.put_cohort(Cohort {
            id: "stale-cohort".to_owned(),
            last_modified: 1,
            size: 0,
            member_ids: Default::default(),
            group_type: "User".to_owned(),
        });
        let loader = loader();

        reconcile(
            &storage,
            Some((&loader, &cohort_storage)),
            vec![flag_with_cohort("f1", "fresh-cohort-unreachable")],
        )
        .await;

        assert!(cohort_storage.get_cohort("stale-cohort").is_none());
    }
}
