//! Order flags by dependency edges; detect cycles.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::Flag;
use crate::{Error, Result};

/// Order `flags` so that every flag appears after all of its (transitive)
/// `dependencies`. `roots` restricts the output to the given keys (and
/// their dependencies); `None` means "all keys in `flags`".
///
/// Unknown dependency keys (referencing a flag not present in `flags`) are
/// silently skipped. A cycle fails with [`Error::CycleDetected`] carrying
/// the offending path.
pub fn topological_sort<'a>(
    flags: &'a BTreeMap<String, Flag>,
    roots: Option<&[String]>,
) -> Result<Vec<&'a Flag>> {
    let root_keys: Vec<&str> = match roots {
        Some(keys) => keys.iter().map(|s| s.as_str()).collect(),
        None => flags.keys().map(|s| s.as_str()).collect(),
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashMap<&str, ()> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    let mut ordered: Vec<&Flag> = Vec::new();

    for key in root_keys {
        visit(flags, key, &mut visited, &mut in_progress, &mut path, &mut ordered)?;
    }

    Ok(ordered)
}

fn visit<'a>(
    flags: &'a BTreeMap<String, Flag>,
    key: &'a str,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashMap<&'a str, ()>,
    path: &mut Vec<&'a str>,
    ordered: &mut Vec<&'a Flag>,
) -> Result<()> {
    let Some((stored_key, flag)) = flags.get_key_value(key) else {
        // Unknown dependency key: contributes nothing.
        return Ok(());
    };

    if visited.contains(stored_key.as_str()) {
        return Ok(());
    }

    if in_progress.contains_key(stored_key.as_str()) {
        let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        cycle.push(stored_key.clone());
        return Err(Error::CycleDetected(cycle));
    }

    in_progress.insert(stored_key.as_str(), ());
    path.push(stored_key.as_str());

    if let Some(deps) = &flag.dependencies {
        for dep in deps {
            visit(flags, dep.as_str(), visited, in_progress, path, ordered)?;
        }
    }

    path.pop();
    in_progress.remove(stored_key.as_str());
    visited.insert(stored_key.as_str());
    ordered.push(flag);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Flag;
    use std::collections::BTreeMap;

    fn flag(key: &str, deps: Option<Vec<&str>>) -> Flag {
        Flag {
            key: key.to_owned(),
            variants: BTreeMap::new(),
            segments: Vec::new(),
            dependencies: deps.map(|d| d.into_iter().map(String::from).collect()),
            metadata: BTreeMap::new(),
            flag_version: None,
            flag_type: None,
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let mut flags = BTreeMap::new();
        flags.insert("a".to_owned(), flag("a", None));
        flags.insert("b".to_owned(), flag("b", Some(vec!["a"])));

        let sorted = topological_sort(&flags, None).unwrap();
        let positions: Vec<&str> = sorted.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(positions, vec!["a", "b"]);
    }

    #[test]
    fn unknown_dependency_is_skipped() {
        let mut flags = BTreeMap::new();
        flags.insert("a".to_owned(), flag("a", Some(vec!["ghost"])));

        let sorted = topological_sort(&flags, None).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn cycle_is_detected() {
        let mut flags = BTreeMap::new();
        flags.insert("a".to_owned(), flag("a", Some(vec!["b"])));
        flags.insert("b".to_owned(), flag("b", Some(vec!["a"])));

        let err = topological_sort(&flags, None).unwrap_err();
        match err {
            Error::CycleDetected(path) => assert!(path.len() >= 2),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn roots_restrict_output() {
        let mut flags = BTreeMap::new();
        flags.insert("a".to_owned(), flag("a", None));
        flags.insert("b".to_owned(), flag("b", None));

        let sorted = topological_sort(&flags, Some(&["a".to_owned()])).unwrap();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].key, "a");
    }
}
