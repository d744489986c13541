//! Registry of child kinds.
//!
//! The registry is an explicit value built once at startup and passed by
//! reference to the components that need to know about kinds (plural
//! resource names, scope). There is no process-wide scheme.

use std::collections::HashMap;
use std::fmt;

use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;

use crate::error::StoreError;

/// Static description of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindInfo {
    /// API version, e.g. `v1` or `apps/v1`.
    pub api_version: String,
    /// Kind, e.g. `Secret`.
    pub kind: String,
    /// Plural resource name, e.g. `secrets`.
    pub plural: String,
    /// Whether objects of this kind live in a namespace.
    pub namespaced: bool,
}

impl KindInfo {
    /// Describes a namespaced kind.
    #[must_use]
    pub fn namespaced<K>() -> Self
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Self::of::<K>(true)
    }

    /// Describes a cluster-scoped kind.
    #[must_use]
    pub fn cluster<K>() -> Self
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
    {
        Self::of::<K>(false)
    }

    fn of<K: Resource<DynamicType = ()>>(namespaced: bool) -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
            namespaced,
        }
    }
}

impl fmt::Display for KindInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version, self.kind)
    }
}

/// Explicit registry of the kinds an operator manages.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<(String, String), KindInfo>,
}

impl KindRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every kind the crate ships an apply entry
    /// point for.
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        use k8s_openapi::api::core::v1::{
            ConfigMap, Endpoints, Namespace, PersistentVolumeClaim, Pod, Secret, Service,
            ServiceAccount,
        };

        Self::new()
            .with_namespaced::<Service>()
            .with_namespaced::<Secret>()
            .with_namespaced::<ServiceAccount>()
            .with_namespaced::<ConfigMap>()
            .with_namespaced::<Pod>()
            .with_namespaced::<PersistentVolumeClaim>()
            .with_namespaced::<Endpoints>()
            .with_cluster::<Namespace>()
    }

    /// Registers a namespaced kind.
    #[must_use]
    pub fn with_namespaced<K>(mut self) -> Self
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        self.register(KindInfo::namespaced::<K>());
        self
    }

    /// Registers a cluster-scoped kind.
    #[must_use]
    pub fn with_cluster<K>(mut self) -> Self
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
    {
        self.register(KindInfo::cluster::<K>());
        self
    }

    /// Registers a kind description, replacing an earlier one.
    pub fn register(&mut self, info: KindInfo) {
        self.kinds
            .insert((info.api_version.clone(), info.kind.clone()), info);
    }

    /// Looks up a kind.
    #[must_use]
    pub fn get(&self, api_version: &str, kind: &str) -> Option<&KindInfo> {
        self.kinds
            .get(&(api_version.to_string(), kind.to_string()))
    }

    /// Looks up the kind of a typed resource.
    ///
    /// # Errors
    ///
    /// Returns `UnregisteredKind` if the kind was never registered.
    pub fn resolve<K: Resource<DynamicType = ()>>(&self) -> Result<&KindInfo, StoreError> {
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        self.get(&api_version, &kind)
            .ok_or_else(|| StoreError::UnregisteredKind {
                api_version: api_version.into_owned(),
                kind: kind.into_owned(),
            })
    }

    /// Returns true if a kind of that name is registered, in any group.
    #[must_use]
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.kinds.values().any(|info| info.kind == kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
