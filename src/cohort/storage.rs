//! In-memory store: cohort-id -> member-set, indexed by group type.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::model::Cohort;

#[derive(Default)]
struct Inner {
    cohorts: HashMap<String, Cohort>,
    /// group_type -> set of cohort ids, kept consistent with `cohorts`.
    by_group_type: HashMap<String, HashSet<String>>,
}

/// Thread-safe storage for cohort membership sets. A single reader-writer
/// lock is sufficient: writes are infrequent (driven by the cohort loader)
/// and reads are short (set intersection during `Evaluate`).
#[derive(Default)]
pub struct CohortStorage {
    inner: RwLock<Inner>,
}

impl CohortStorage {
    pub fn new() -> Self {
        CohortStorage::default()
    }

    pub fn get_cohort(&self, id: &str) -> Option<Cohort> {
        self.inner.read().unwrap().cohorts.get(id).cloned()
    }

    pub fn get_all_ids(&self) -> HashSet<String> {
        self.inner.read().unwrap().cohorts.keys().cloned().collect()
    }

    pub fn get_all(&self) -> HashMap<String, Cohort> {
        self.inner.read().unwrap().cohorts.clone()
    }

    pub fn put_cohort(&self, cohort: Cohort) {
        let mut inner = self.inner.write().unwrap();
        inner
            .by_group_type
            .entry(cohort.group_type.clone())
            .or_default()
            .insert(cohort.id.clone());
        inner.cohorts.insert(cohort.id.clone(), cohort);
    }

    pub fn delete_cohort(&self, group_type: &str, id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.cohorts.remove(id);
        if let Some(ids) = inner.by_group_type.get_mut(group_type) {
            ids.remove(id);
        }
    }

    /// Intersect `candidate_ids` with the cohorts of `group_type` whose
    /// membership set contains `member_id`.
    pub fn cohorts_for_member(
        &self,
        group_type: &str,
        member_id: &str,
        candidate_ids: &HashSet<String>,
    ) -> HashSet<String> {
        let inner = self.inner.read().unwrap();
        let Some(ids) = inner.by_group_type.get(group_type) else {
            return HashSet::new();
        };
        ids.iter()
            .filter(|id| candidate_ids.contains(*id))
            .filter(|id| {
                inner
                    .cohorts
                    .get(*id)
                    .is_some_and(|c| c.member_ids.contains(member_id))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(id: &str, members: &[&str]) -> Cohort {
        Cohort {
            id: id.to_owned(),
            last_modified: 1,
            size: members.len() as i64,
            member_ids: members.iter().map(|s| s.to_string()).collect(),
            group_type: "User".to_owned(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let storage = CohortStorage::new();
        storage.put_cohort(cohort("c1", &["u1"]));
        assert!(storage.get_cohort("c1").is_some());
        assert_eq!(storage.get_all_ids().len(), 1);
    }

    #[test]
    fn cohorts_for_member_intersects_candidates() {
        let storage = CohortStorage::new();
        storage.put_cohort(cohort("c1", &["u1"]));
        storage.put_cohort(cohort("c2", &["u2"]));

        let candidates: HashSet<String> = ["c1".to_owned(), "c2".to_owned(), "c3".to_owned()]
            .into_iter()
            .collect();
        let result = storage.cohorts_for_member("User", "u1", &candidates);
        assert_eq!(result, ["c1".to_owned()].into_iter().collect());
    }

    #[test]
    fn delete_cohort_removes_from_index() {
        let storage = CohortStorage::new();
        storage.put_cohort(cohort("c1", &["u1"]));
        storage.delete_cohort("User", "c1");
        assert!(storage.get_cohort("c1").is_none());
        assert!(storage.get_all_ids().is_empty());
    }
}
