//! Controller-reference ownership checks.
//!
//! The apply engine never mutates an object that another controller owns.
//! Ownership is decided by the UID of the controller owner reference; the
//! kind, apiVersion and name of a reference with a matching UID are metadata
//! that the next update rewrites.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Ownership relation between an existing object and a desired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Same controller, reference identical in kind, apiVersion, name and UID.
    Controlled,
    /// Same controller UID but a stale kind, apiVersion or name.
    StaleReference,
    /// The existing object has no controller; the desired one has.
    Orphan,
    /// Neither object has a controller reference.
    Unowned,
    /// Controlled by someone else.
    Foreign,
}

impl Ownership {
    /// Returns true if the engine may mutate the existing object.
    ///
    /// A foreign controller is never overridden, not even with `force`.
    #[must_use]
    pub const fn permits_mutation(self, force: bool) -> bool {
        match self {
            Self::Controlled | Self::StaleReference | Self::Unowned => true,
            Self::Orphan => force,
            Self::Foreign => false,
        }
    }
}

/// Returns the controller owner reference of an object, if any.
#[must_use]
pub fn controller_ref(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

/// Classifies the ownership of `existing` relative to `required`.
#[must_use]
pub fn check_ownership(existing: &ObjectMeta, required: &ObjectMeta) -> Ownership {
    match (controller_ref(existing), controller_ref(required)) {
        (None, None) => Ownership::Unowned,
        (None, Some(_)) => Ownership::Orphan,
        (Some(_), None) => Ownership::Foreign,
        (Some(theirs), Some(ours)) if theirs.uid != ours.uid => Ownership::Foreign,
        (Some(theirs), Some(ours)) => {
            if theirs.kind == ours.kind
                && theirs.api_version == ours.api_version
                && theirs.name == ours.name
            {
                Ownership::Controlled
            } else {
                Ownership::StaleReference
            }
        }
    }
}

/// Returns true if `existing` is controlled by the controller of `required`
/// with an up-to-date reference.
#[must_use]
pub fn is_controlled_by(existing: &ObjectMeta, required: &ObjectMeta) -> bool {
    check_ownership(existing, required) == Ownership::Controlled
}

/// Returns true if `meta` is controlled by the owner with the given UID.
#[must_use]
pub fn is_controlled_by_uid(meta: &ObjectMeta, uid: &str) -> bool {
    controller_ref(meta).is_some_and(|r| r.uid == uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: &str, uid: &str, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: String::from("scylla.scylladb.com/v1"),
            kind: kind.to_string(),
            name: String::from("basic"),
            uid: uid.to_string(),
            controller: Some(controller),
            block_owner_deletion: Some(true),
        }
    }

    fn meta_with(refs: Vec<OwnerReference>) -> ObjectMeta {
        ObjectMeta {
            name: Some(String::from("test")),
            namespace: Some(String::from("default")),
            owner_references: if refs.is_empty() { None } else { Some(refs) },
            ..ObjectMeta::default()
        }
    }

    #[test]
    fn test_controller_ref_ignores_non_controllers() {
        let meta = meta_with(vec![
            owner("ConfigMap", "x", false),
            owner("ScyllaCluster", "abc", true),
        ]);
        assert_eq!(controller_ref(&meta).map(|r| r.uid.as_str()), Some("abc"));
        assert!(controller_ref(&meta_with(vec![owner("ConfigMap", "x", false)])).is_none());
    }

    #[test]
    fn test_same_reference_is_controlled() {
        let existing = meta_with(vec![owner("ScyllaCluster", "abc", true)]);
        let required = meta_with(vec![owner("ScyllaCluster", "abc", true)]);

        assert_eq!(check_ownership(&existing, &required), Ownership::Controlled);
        assert!(is_controlled_by(&existing, &required));
    }

    #[test]
    fn test_wrong_kind_same_uid_is_correctable() {
        let existing = meta_with(vec![owner("WrongKind", "abc", true)]);
        let required = meta_with(vec![owner("ScyllaCluster", "abc", true)]);

        let ownership = check_ownership(&existing, &required);
        assert_eq!(ownership, Ownership::StaleReference);
        assert!(!is_controlled_by(&existing, &required));
        assert!(ownership.permits_mutation(false));
    }

    #[test]
    fn test_foreign_uid_is_never_stealable() {
        let existing = meta_with(vec![owner("ScyllaCluster", "other", true)]);
        let required = meta_with(vec![owner("ScyllaCluster", "abc", true)]);

        let ownership = check_ownership(&existing, &required);
        assert_eq!(ownership, Ownership::Foreign);
        assert!(!ownership.permits_mutation(false));
        assert!(!ownership.permits_mutation(true));
    }

    #[test]
    fn test_orphan_requires_force() {
        let existing = meta_with(vec![]);
        let required = meta_with(vec![owner("ScyllaCluster", "abc", true)]);

        let ownership = check_ownership(&existing, &required);
        assert_eq!(ownership, Ownership::Orphan);
        assert!(!ownership.permits_mutation(false));
        assert!(ownership.permits_mutation(true));
    }

    #[test]
    fn test_unowned_and_reverse_foreign() {
        assert_eq!(
            check_ownership(&meta_with(vec![]), &meta_with(vec![])),
            Ownership::Unowned
        );
        assert_eq!(
            check_ownership(
                &meta_with(vec![owner("ScyllaCluster", "abc", true)]),
                &meta_with(vec![])
            ),
            Ownership::Foreign
        );
    }

    #[test]
    fn test_controlled_by_uid() {
        let meta = meta_with(vec![owner("ScyllaCluster", "abc", true)]);
        assert!(is_controlled_by_uid(&meta, "abc"));
        assert!(!is_controlled_by_uid(&meta, "abd"));
    }
}
