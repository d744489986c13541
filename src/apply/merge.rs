//! Managed-key merging of labels and annotations.
//!
//! The engine is authoritative only over the keys it wrote at the last
//! apply. Keys added by anybody else survive every update; managed keys
//! that the desired object no longer carries are removed. A desired key
//! ending in `-` deletes the key without the suffix and is never stored.

use std::collections::{BTreeMap, BTreeSet};

use crate::naming::removal_target;

type StringMap = BTreeMap<String, String>;

/// Merges a desired label or annotation map into a live one.
///
/// `previously_managed` is the set of keys the engine owned before this
/// update. The result holds every live key outside that set, plus every
/// desired key with its desired value, minus the targets of removal keys.
#[must_use]
pub fn merge_managed(
    existing: Option<&StringMap>,
    required: Option<&StringMap>,
    previously_managed: &BTreeSet<String>,
) -> Option<StringMap> {
    let mut merged = existing.cloned().unwrap_or_default();

    merged.retain(|key, _| {
        !previously_managed.contains(key) || required.is_some_and(|r| r.contains_key(key))
    });
    for (key, value) in required.into_iter().flatten() {
        match removal_target(key) {
            Some(target) => {
                merged.remove(target);
                merged.remove(key);
            }
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    if merged.is_empty() { None } else { Some(merged) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> StringMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn keys(entries: &[&str]) -> BTreeSet<String> {
        entries.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn test_foreign_keys_survive() {
        let existing = map(&[("custom", "value"), ("app", "old")]);
        let required = map(&[("app", "new")]);

        let merged = merge_managed(Some(&existing), Some(&required), &keys(&["app"])).unwrap();
        assert_eq!(merged, map(&[("custom", "value"), ("app", "new")]));
    }

    #[test]
    fn test_dropped_managed_key_is_removed() {
        let existing = map(&[("custom", "value"), ("tier", "db"), ("app", "x")]);
        let required = map(&[("app", "x")]);

        let merged =
            merge_managed(Some(&existing), Some(&required), &keys(&["app", "tier"])).unwrap();
        assert_eq!(merged, map(&[("custom", "value"), ("app", "x")]));
    }

    #[test]
    fn test_unknown_history_never_deletes() {
        let existing = map(&[("custom", "value"), ("tier", "db")]);
        let required = map(&[("app", "x")]);

        // Without a recorded history the desired keys stand in for it.
        let merged = merge_managed(Some(&existing), Some(&required), &keys(&["app"])).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_removal_key_deletes_its_target() {
        let existing = map(&[
            ("l-1", "l-alpha-changed"),
            ("l-2", "l-beta"),
            ("l-3", "l-resurrected"),
            ("l-custom", "l-custom-value"),
        ]);
        let required = map(&[("l-1", "l-alpha-x"), ("l-2", "l-beta-x"), ("l-3-", "")]);

        let merged =
            merge_managed(Some(&existing), Some(&required), &keys(&["l-1", "l-2"])).unwrap();
        assert_eq!(
            merged,
            map(&[
                ("l-1", "l-alpha-x"),
                ("l-2", "l-beta-x"),
                ("l-custom", "l-custom-value"),
            ])
        );
    }

    #[test]
    fn test_removal_key_on_create_is_not_stored() {
        let required = map(&[("app", "x"), ("stale-", "")]);

        let merged = merge_managed(None, Some(&required), &BTreeSet::new()).unwrap();
        assert_eq!(merged, map(&[("app", "x")]));
        assert!(merge_managed(None, Some(&map(&[("stale-", "")])), &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_everything_removed_yields_none() {
        let existing = map(&[("app", "x")]);
        assert!(merge_managed(Some(&existing), None, &keys(&["app"])).is_none());
        assert!(merge_managed(None, None, &BTreeSet::new()).is_none());
    }
}
