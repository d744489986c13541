//! Store interfaces.
//!
//! The apply engine reads from a [`Lister`] (a watch-fed cache) and writes
//! through an [`ObjectClient`] (the live store). Both are typed per kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// Equality-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Creates a selector that matches everything.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Creates a selector from a label map.
    #[must_use]
    pub const fn from_labels(match_labels: BTreeMap<String, String>) -> Self {
        Self { match_labels }
    }

    /// Adds a required label.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Returns true if `labels` carries every required label.
    #[must_use]
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }

    /// Returns true if the selector matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    /// Returns the required labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.match_labels
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.match_labels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Cascade policy for deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationPolicy {
    /// Delete the object now and its dependents in the background.
    Background,
    /// Delete dependents first.
    Foreground,
    /// Leave dependents behind.
    Orphan,
}

/// Options of a delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Only delete if the live object still has this UID.
    pub uid_precondition: Option<String>,
    /// Cascade policy.
    pub propagation: Option<PropagationPolicy>,
}

impl DeleteOptions {
    /// Delete guarded by a UID precondition with background propagation.
    ///
    /// The precondition keeps a prune from removing an object recreated
    /// under the same name since the cache read.
    #[must_use]
    pub fn guarded(uid: impl Into<String>) -> Self {
        Self {
            uid_precondition: Some(uid.into()),
            propagation: Some(PropagationPolicy::Background),
        }
    }
}

/// Typed client for the live store.
///
/// Implementations return API-server style errors: `NotFound` for missing
/// objects, `Conflict` for stale resource versions and failed
/// preconditions, `AlreadyExists` for duplicate creates.
#[async_trait]
pub trait ObjectClient<K>: Send + Sync {
    /// Reads one object.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError>;

    /// Lists objects matching a selector. `None` lists all namespaces.
    async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<K>, StoreError>;

    /// Creates an object and returns it as stored.
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces an object and returns it as stored.
    ///
    /// A set `resourceVersion` must match the live one.
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Deletes an object.
    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<K, C> ObjectClient<K> for Arc<C>
where
    K: Send + Sync + 'static,
    C: ObjectClient<K> + ?Sized,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        (**self).get(namespace, name).await
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<K>, StoreError> {
        (**self).list(namespace, selector).await
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        (**self).create(obj).await
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        (**self).update(obj).await
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        (**self).delete(namespace, name, options).await
    }
}

/// Read-only view of a watch-fed cache.
///
/// The cache is eventually consistent: a just-written object may not be
/// visible yet, and a just-deleted one may still be returned.
pub trait Lister<K>: Send + Sync {
    /// Returns one cached object.
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>>;

    /// Returns cached objects matching a selector. `None` lists all namespaces.
    fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Arc<K>>;
}

impl<K, L> Lister<K> for Arc<L>
where
    L: Lister<K> + ?Sized,
{
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        (**self).get(namespace, name)
    }

    fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Arc<K>> {
        (**self).list(namespace, selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matching() {
        let selector = LabelSelector::everything()
            .with("app", "scylla")
            .with("cluster", "basic");

        let mut labels = BTreeMap::new();
        labels.insert(String::from("app"), String::from("scylla"));
        assert!(!selector.matches(Some(&labels)));

        labels.insert(String::from("cluster"), String::from("basic"));
        labels.insert(String::from("extra"), String::from("x"));
        assert!(selector.matches(Some(&labels)));
        assert!(!selector.matches(None));

        assert!(LabelSelector::everything().matches(None));
        assert_eq!(selector.to_string(), "app=scylla,cluster=basic");
    }

    #[test]
    fn test_guarded_delete_options() {
        let opts = DeleteOptions::guarded("uid-1");
        assert_eq!(opts.uid_precondition.as_deref(), Some("uid-1"));
        assert_eq!(opts.propagation, Some(PropagationPolicy::Background));
    }
}
