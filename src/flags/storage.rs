//! In-memory store: key -> flag config.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::model::Flag;

/// Thread-safe storage for the currently active flag configuration set.
/// A single mutex over the key->flag map is sufficient: the hot `Evaluate`
/// path only needs a short-lived read lock to clone a snapshot.
#[derive(Default)]
pub struct FlagConfigStorage {
    flags: RwLock<BTreeMap<String, Flag>>,
}

impl FlagConfigStorage {
    pub fn new() -> Self {
        FlagConfigStorage::default()
    }

    pub fn put_flag_config(&self, flag: Flag) {
        self.flags.write().unwrap().insert(flag.key.clone(), flag);
    }

    pub fn get_flag_config(&self, key: &str) -> Option<Flag> {
        self.flags.read().unwrap().get(key).cloned()
    }

    pub fn get_all(&self) -> BTreeMap<String, Flag> {
        self.flags.read().unwrap().clone()
    }

    /// Remove every flag for which `predicate` returns `true`.
    pub fn remove_if(&self, predicate: impl Fn(&Flag) -> bool) {
        self.flags.write().unwrap().retain(|_, flag| !predicate(flag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn flag(key: &str) -> Flag {
        Flag {
            key: key.to_owned(),
            variants: Map::new(),
            segments: Vec::new(),
            dependencies: None,
            metadata: Map::new(),
            flag_version: None,
            flag_type: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let storage = FlagConfigStorage::new();
        storage.put_flag_config(flag("f1"));
        assert!(storage.get_flag_config("f1").is_some());
    }

    #[test]
    fn remove_if_drops_flags_absent_from_latest_batch() {
        let storage = FlagConfigStorage::new();
        storage.put_flag_config(flag("f1"));
        storage.put_flag_config(flag("f2"));
        storage.remove_if(|f| f.key != "f1");
        let all = storage.get_all();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("f1"));
    }
}
