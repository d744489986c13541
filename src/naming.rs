//! Well-known annotation and label keys.
//!
//! These names are part of the on-cluster contract: objects written by
//! older releases must stay readable, so the keys are never renamed.

/// Prefix shared by every bookkeeping annotation the engine writes.
pub const INTERNAL_PREFIX: &str = "internal.kubeconverge.io";

/// Annotation holding the content hash of the last applied desired object.
pub const MANAGED_HASH_ANNOTATION: &str = "internal.kubeconverge.io/managed-hash";

/// Annotation listing the label keys the engine owned at the last apply.
pub const MANAGED_LABELS_ANNOTATION: &str = "internal.kubeconverge.io/managed-labels";

/// Annotation listing the annotation keys the engine owned at the last apply.
pub const MANAGED_ANNOTATIONS_ANNOTATION: &str = "internal.kubeconverge.io/managed-annotations";

/// Label carrying the name of the parent that owns a child.
pub const PARENT_NAME_LABEL: &str = "kubeconverge.io/parent-name";

/// Label carrying the kind of the parent that owns a child.
pub const PARENT_KIND_LABEL: &str = "kubeconverge.io/parent-kind";

/// Label marking the component that manages a child.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on every child this crate creates.
pub const MANAGED_BY_VALUE: &str = "kubeconverge";

/// Separator used in the managed key list annotations.
pub const MANAGED_KEYS_SEPARATOR: char = ',';

/// Annotations that only the engine writes and that never take part in
/// hashing or in managed-key merging.
pub const BOOKKEEPING_ANNOTATIONS: &[&str] = &[
    MANAGED_HASH_ANNOTATION,
    MANAGED_LABELS_ANNOTATION,
    MANAGED_ANNOTATIONS_ANNOTATION,
];

/// Returns true for annotation keys owned by the engine itself.
#[must_use]
pub fn is_bookkeeping_annotation(key: &str) -> bool {
    BOOKKEEPING_ANNOTATIONS.contains(&key)
}

/// Suffix marking a desired label or annotation key as a removal request.
///
/// A desired key `foo-` deletes `foo` from the live object and is never
/// stored itself.
pub const REMOVAL_KEY_SUFFIX: char = '-';

/// Returns the key a removal request deletes, or `None` for ordinary keys.
#[must_use]
pub fn removal_target(key: &str) -> Option<&str> {
    key.strip_suffix(REMOVAL_KEY_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_target() {
        assert_eq!(removal_target("l-3-"), Some("l-3"));
        assert_eq!(removal_target("l-3"), None);
        assert!(is_bookkeeping_annotation(MANAGED_HASH_ANNOTATION));
        assert!(!is_bookkeeping_annotation("l-3"));
    }
}
