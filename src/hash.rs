//! Content hashing for change detection.
//!
//! This module computes a deterministic fingerprint of a desired object and
//! records it on the object, together with the label and annotation keys the
//! engine owns. The apply engine compares the recorded fingerprint instead of
//! diffing live objects, which makes repeated applies free and leaves
//! out-of-band mutations (admission webhooks, other controllers) alone.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::naming::{
    MANAGED_ANNOTATIONS_ANNOTATION, MANAGED_HASH_ANNOTATION, MANAGED_KEYS_SEPARATOR,
    MANAGED_LABELS_ANNOTATION, is_bookkeeping_annotation, removal_target,
};

/// Metadata fields assigned by the server; they never take part in the hash.
const SERVER_METADATA_FIELDS: &[&str] = &[
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
    "deletionTimestamp",
    "deletionGracePeriodSeconds",
    "managedFields",
    "selfLink",
];

/// Hasher for computing object fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectHasher;

/// Label and annotation keys the engine is authoritative over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedKeys {
    /// Managed label keys.
    pub labels: BTreeSet<String>,
    /// Managed annotation keys (bookkeeping annotations excluded).
    pub annotations: BTreeSet<String>,
}

impl ObjectHasher {
    /// Creates a new object hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of an object.
    ///
    /// Server-assigned metadata, the status subtree and the engine's
    /// bookkeeping annotations are stripped first, and object keys are
    /// sorted, so the result depends only on the object's logical content.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be serialized.
    pub fn hash_object<K: Serialize>(&self, obj: &K) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(obj)?;
        strip_unhashed_fields(&mut value);
        Ok(self.hash_value(&value))
    }

    /// Computes the fingerprint of an already projected JSON value.
    #[must_use]
    pub fn hash_value(&self, value: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Computes the content hash of `obj` without modifying it.
///
/// # Errors
///
/// Returns an error if the object cannot be serialized.
pub fn compute_hash<K: Serialize>(obj: &K) -> Result<String, serde_json::Error> {
    ObjectHasher::new().hash_object(obj)
}

/// Stores the content hash of `obj` in its managed-hash annotation,
/// overwriting any prior value, and records the managed key set next to it.
///
/// Returns the hash that was written.
///
/// # Errors
///
/// Returns an error if the object cannot be serialized.
pub fn set_hash_annotation<K>(obj: &mut K) -> Result<String, serde_json::Error>
where
    K: Resource + Serialize,
{
    let hash = compute_hash(obj)?;
    let managed = ManagedKeys::of(obj.meta());

    let annotations = obj.meta_mut().annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(MANAGED_HASH_ANNOTATION.to_string(), hash.clone());
    managed.record(annotations);

    Ok(hash)
}

/// Reads the content hash recorded on `obj`.
///
/// `None` means the object was never converged by the engine.
#[must_use]
pub fn read_hash_annotation<K: Resource>(obj: &K) -> Option<&str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(MANAGED_HASH_ANNOTATION))
        .map(String::as_str)
}

impl ManagedKeys {
    /// Collects the keys currently present on `meta`, skipping removal
    /// requests.
    #[must_use]
    pub fn of(meta: &ObjectMeta) -> Self {
        let labels = meta
            .labels
            .iter()
            .flat_map(BTreeMap::keys)
            .filter(|k| removal_target(k).is_none())
            .cloned()
            .collect();
        let annotations = meta
            .annotations
            .iter()
            .flat_map(BTreeMap::keys)
            .filter(|k| !is_bookkeeping_annotation(k) && removal_target(k).is_none())
            .cloned()
            .collect();

        Self {
            labels,
            annotations,
        }
    }

    /// Reads the key set recorded at the last apply.
    ///
    /// Returns `None` for objects written before the set was recorded.
    #[must_use]
    pub fn recorded(meta: &ObjectMeta) -> Option<Self> {
        let annotations = meta.annotations.as_ref()?;
        let labels = annotations.get(MANAGED_LABELS_ANNOTATION)?;
        let managed_annotations = annotations.get(MANAGED_ANNOTATIONS_ANNOTATION)?;

        Some(Self {
            labels: parse_key_list(labels),
            annotations: parse_key_list(managed_annotations),
        })
    }

    /// Writes the key set into an annotation map.
    pub fn record(&self, annotations: &mut BTreeMap<String, String>) {
        annotations.insert(
            MANAGED_LABELS_ANNOTATION.to_string(),
            join_key_list(&self.labels),
        );
        annotations.insert(
            MANAGED_ANNOTATIONS_ANNOTATION.to_string(),
            join_key_list(&self.annotations),
        );
    }
}

fn parse_key_list(raw: &str) -> BTreeSet<String> {
    raw.split(MANAGED_KEYS_SEPARATOR)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

fn join_key_list(keys: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(MANAGED_KEYS_SEPARATOR);
        }
        out.push_str(key);
    }
    out
}

/// Removes everything that must not influence the fingerprint.
fn strip_unhashed_fields(value: &mut Value) {
    let Some(root) = value.as_object_mut() else {
        return;
    };
    root.remove("status");

    let Some(metadata) = root.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    for field in SERVER_METADATA_FIELDS {
        metadata.remove(*field);
    }

    if let Some(annotations) = metadata.get_mut("annotations").and_then(Value::as_object_mut) {
        annotations.retain(|k, _| !is_bookkeeping_annotation(k));
    }

    // An empty map and a missing map are the same object to the server.
    for key in ["labels", "annotations"] {
        let empty = metadata
            .get(key)
            .is_some_and(|v| v.is_null() || v.as_object().is_some_and(serde_json::Map::is_empty));
        if empty {
            metadata.remove(key);
        }
    }
}

/// Serializes `value` as JSON with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};

    fn create_test_secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some(String::from("default")),
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            string_data: Some(BTreeMap::from([(String::from("k"), String::from("v"))])),
            ..Secret::default()
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let secret = create_test_secret("test");

        let hash1 = compute_hash(&secret).unwrap();
        let hash2 = compute_hash(&secret).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_objects_different_hash() {
        let hash1 = compute_hash(&create_test_secret("a")).unwrap();
        let hash2 = compute_hash(&create_test_secret("b")).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_ignores_label_insertion_order() {
        let mut first = create_test_secret("test");
        let mut labels = BTreeMap::new();
        labels.insert(String::from("zeta"), String::from("1"));
        labels.insert(String::from("alpha"), String::from("2"));
        first.metadata.labels = Some(labels);

        let mut second = create_test_secret("test");
        let mut labels = BTreeMap::new();
        labels.insert(String::from("alpha"), String::from("2"));
        labels.insert(String::from("zeta"), String::from("1"));
        second.metadata.labels = Some(labels);

        assert_eq!(compute_hash(&first).unwrap(), compute_hash(&second).unwrap());
    }

    #[test]
    fn test_canonical_form_sorts_keys() {
        let a: Value =
            serde_json::from_str(r#"{"b":1,"a":{"y":[1,{"d":2,"c":3}],"x":"s"}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"a":{"x":"s","y":[1,{"c":3,"d":2}]},"b":1}"#).unwrap();

        let mut out = String::new();
        write_canonical(&a, &mut out);
        assert_eq!(out, r#"{"a":{"x":"s","y":[1,{"c":3,"d":2}]},"b":1}"#);

        let hasher = ObjectHasher::new();
        assert_eq!(hasher.hash_value(&a), hasher.hash_value(&b));
    }

    #[test]
    fn test_hash_excludes_server_fields_and_itself() {
        let plain = create_test_secret("test");
        let expected = compute_hash(&plain).unwrap();

        let mut annotated = plain.clone();
        let written = set_hash_annotation(&mut annotated).unwrap();
        assert_eq!(written, expected);
        assert_eq!(compute_hash(&annotated).unwrap(), expected);

        annotated.metadata.resource_version = Some(String::from("42"));
        annotated.metadata.uid = Some(String::from("some-uid"));
        annotated.metadata.generation = Some(7);
        assert_eq!(compute_hash(&annotated).unwrap(), expected);
    }

    #[test]
    fn test_set_hash_overwrites_and_is_readable() {
        let mut cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(String::from("cm")),
                annotations: Some(BTreeMap::from([(
                    MANAGED_HASH_ANNOTATION.to_string(),
                    String::from("stale"),
                )])),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };

        assert_eq!(read_hash_annotation(&cm), Some("stale"));
        let hash = set_hash_annotation(&mut cm).unwrap();
        assert_eq!(read_hash_annotation(&cm), Some(hash.as_str()));
        assert!(read_hash_annotation(&create_test_secret("x")).is_none());
    }

    #[test]
    fn test_managed_keys_round_trip_through_annotations() {
        let mut secret = create_test_secret("test");
        secret.metadata.labels = Some(BTreeMap::from([
            (String::from("l-1"), String::from("a")),
            (String::from("l-2"), String::from("b")),
        ]));
        secret.metadata.annotations = Some(BTreeMap::from([(
            String::from("a-1"),
            String::from("x"),
        )]));

        assert!(ManagedKeys::recorded(&secret.metadata).is_none());
        set_hash_annotation(&mut secret).unwrap();

        let recorded = ManagedKeys::recorded(&secret.metadata).unwrap();
        assert_eq!(recorded, ManagedKeys::of(&secret.metadata));
        assert_eq!(
            recorded.labels.iter().collect::<Vec<_>>(),
            vec!["l-1", "l-2"]
        );
        assert_eq!(recorded.annotations.iter().collect::<Vec<_>>(), vec!["a-1"]);
    }

    #[test]
    fn test_removal_keys_are_hashed_but_not_managed() {
        let mut secret = create_test_secret("test");
        secret.metadata.labels = Some(BTreeMap::from([
            (String::from("l-1"), String::from("a")),
            (String::from("l-3-"), String::new()),
        ]));
        let mut without_removal = secret.clone();
        without_removal.metadata.labels.as_mut().unwrap().remove("l-3-");
        assert_ne!(
            compute_hash(&secret).unwrap(),
            compute_hash(&without_removal).unwrap()
        );

        set_hash_annotation(&mut secret).unwrap();
        let recorded = ManagedKeys::recorded(&secret.metadata).unwrap();
        assert_eq!(recorded.labels.iter().collect::<Vec<_>>(), vec!["l-1"]);
    }

    #[test]
    fn test_short_hash() {
        let hasher = ObjectHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(ObjectHasher::hashes_match("abc123", "abc123"));
        assert!(!ObjectHasher::hashes_match("abc123", "abc124"));
        assert!(!ObjectHasher::hashes_match("abc123", "abc12"));
    }
}
