//! In-memory cluster backend.
//!
//! [`MemoryCluster`] behaves like a small API server: it assigns UIDs and
//! resource versions, enforces optimistic concurrency and delete
//! preconditions, and answers with API-server style errors. It keeps a log
//! of every mutating call so callers can assert on ordering, and it can be
//! told to fail the next call for a given object.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::registry::{KindInfo, KindRegistry};

use super::client::{DeleteOptions, LabelSelector, Lister, ObjectClient};

/// Mutating verb recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Object creation.
    Create,
    /// Object replacement.
    Update,
    /// Object deletion.
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One mutating call received by the cluster, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Verb.
    pub verb: Verb,
    /// Kind of the object.
    pub kind: String,
    /// Namespace, for namespaced kinds.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
    /// Options of a delete call.
    pub delete_options: Option<DeleteOptions>,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {} {}/{}", self.verb, self.kind, ns, self.name),
            None => write!(f, "{} {} {}", self.verb, self.kind, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

#[derive(Debug)]
struct Fault {
    verb: Verb,
    kind: String,
    name: String,
    error: StoreError,
}

#[derive(Debug, Default)]
struct ClusterState {
    objects: BTreeMap<ObjectKey, Value>,
    last_resource_version: u64,
    actions: Vec<Action>,
    faults: Vec<Fault>,
}

impl ClusterState {
    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }

    fn take_fault(&mut self, verb: Verb, kind: &str, name: &str) -> Option<StoreError> {
        let pos = self
            .faults
            .iter()
            .position(|f| f.verb == verb && f.kind == kind && f.name == name)?;
        Some(self.faults.remove(pos).error)
    }
}

/// In-memory cluster holding objects of every registered kind.
#[derive(Debug)]
pub struct MemoryCluster {
    registry: KindRegistry,
    state: Mutex<ClusterState>,
}

impl MemoryCluster {
    /// Creates an empty cluster that accepts the kinds in `registry`.
    #[must_use]
    pub fn new(registry: KindRegistry) -> Self {
        Self {
            registry,
            state: Mutex::new(ClusterState::default()),
        }
    }

    /// Returns the kind registry.
    #[must_use]
    pub const fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Returns a typed client for one kind.
    #[must_use]
    pub fn client<K>(self: &Arc<Self>) -> MemoryClient<K> {
        MemoryClient {
            cluster: Arc::clone(self),
            _kind: PhantomData,
        }
    }

    /// Returns a lister that always sees the current cluster state.
    #[must_use]
    pub fn lister<K>(self: &Arc<Self>) -> MemoryLister<K> {
        MemoryLister {
            source: ListerSource::Live(Arc::clone(self)),
        }
    }

    /// Stores an object without going through the action log.
    ///
    /// UID and resource version are assigned when missing.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` or a validation error like `create` does.
    pub fn seed<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        self.insert(obj, false)
    }

    /// Reads an object.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered kinds or undecodable objects.
    pub fn get_object<K>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let info = self.registry.resolve::<K>()?;
        let key = object_key(info, namespace, name);
        self.lock()
            .objects
            .get(&key)
            .map(|v| decode(v.clone()))
            .transpose()
    }

    /// Returns the raw stored form of an object.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered kinds.
    pub fn raw_object<K>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError>
    where
        K: Resource<DynamicType = ()>,
    {
        let info = self.registry.resolve::<K>()?;
        let key = object_key(info, namespace, name);
        Ok(self.lock().objects.get(&key).cloned())
    }

    /// Changes a stored object out-of-band (another writer, a webhook).
    ///
    /// The resource version is bumped; the action log is untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object does not exist.
    pub fn mutate<K, F>(&self, namespace: Option<&str>, name: &str, f: F) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
        F: FnOnce(&mut K),
    {
        let info = self.registry.resolve::<K>()?;
        let key = object_key(info, namespace, name);
        let mut state = self.lock();

        let stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&info.plural, name))?;
        let mut obj: K = decode(stored)?;
        f(&mut obj);
        obj.meta_mut().resource_version = Some(state.next_resource_version());

        let value = encode(&obj)?;
        state.objects.insert(key, value);
        Ok(obj)
    }

    /// Removes an object out-of-band, bypassing the action log.
    ///
    /// Returns true if the object existed.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered kinds.
    pub fn remove<K>(&self, namespace: Option<&str>, name: &str) -> Result<bool, StoreError>
    where
        K: Resource<DynamicType = ()>,
    {
        let info = self.registry.resolve::<K>()?;
        let key = object_key(info, namespace, name);
        Ok(self.lock().objects.remove(&key).is_some())
    }

    /// Makes the next `verb` call on `kind`/`name` fail with `error`.
    ///
    /// Faults are consumed by the call they fail.
    pub fn fail_next(&self, verb: Verb, kind: &str, name: &str, error: StoreError) {
        self.lock().faults.push(Fault {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
            error,
        });
    }

    /// Number of stored objects of all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// Returns true if the cluster holds no object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Returns every mutating call received so far.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    /// Clears the action log.
    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        // A poisoned lock still holds consistent objects: every mutation
        // is a single map operation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        state: &mut ClusterState,
        info: &KindInfo,
        verb: Verb,
        namespace: Option<&str>,
        name: &str,
    ) {
        state.actions.push(Action {
            verb,
            kind: info.kind.clone(),
            namespace: namespace.map(String::from),
            name: name.to_string(),
            delete_options: None,
        });
    }

    fn insert<K>(&self, obj: &K, logged: bool) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let info = self.registry.resolve::<K>()?;
        let (namespace, name) = identity(info, obj.meta())?;
        let key = object_key(info, namespace.as_deref(), &name);
        let mut state = self.lock();

        if logged {
            Self::record(&mut state, info, Verb::Create, namespace.as_deref(), &name);
            if let Some(err) = state.take_fault(Verb::Create, &info.kind, &name) {
                return Err(err);
            }
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::already_exists(&info.plural, &name));
        }

        let mut created: K = decode(encode(obj)?)?;
        let meta = created.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(Uuid::new_v4().to_string());
        }
        meta.generation = Some(1);
        meta.resource_version = Some(state.next_resource_version());

        state.objects.insert(key, encode(&created)?);
        debug!("Created {} {}", info.kind, name);
        Ok(created)
    }

    fn replace<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let info = self.registry.resolve::<K>()?;
        let (namespace, name) = identity(info, obj.meta())?;
        let key = object_key(info, namespace.as_deref(), &name);
        let mut state = self.lock();

        Self::record(&mut state, info, Verb::Update, namespace.as_deref(), &name);
        if let Some(err) = state.take_fault(Verb::Update, &info.kind, &name) {
            return Err(err);
        }

        let stored: K = match state.objects.get(&key) {
            Some(v) => decode(v.clone())?,
            None => return Err(StoreError::not_found(&info.plural, &name)),
        };
        let live = stored.meta();

        if let Some(rv) = &obj.meta().resource_version
            && live.resource_version.as_ref() != Some(rv)
        {
            return Err(StoreError::conflict(
                &info.plural,
                &name,
                "the object has been modified; \
                 please apply your changes to the latest version and try again",
            ));
        }
        if let (Some(theirs), Some(ours)) = (&live.uid, &obj.meta().uid)
            && theirs != ours
        {
            return Err(StoreError::conflict(
                &info.plural,
                &name,
                format!(
                    "Precondition failed: UID in precondition: {ours}, UID in object meta: {theirs}"
                ),
            ));
        }

        let mut updated: K = decode(encode(obj)?)?;
        let meta = updated.meta_mut();
        meta.uid.clone_from(&live.uid);
        meta.generation = live.generation;
        meta.resource_version = Some(state.next_resource_version());

        state.objects.insert(key, encode(&updated)?);
        debug!("Updated {} {}", info.kind, name);
        Ok(updated)
    }

    fn delete_object<K>(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), StoreError>
    where
        K: Resource<DynamicType = ()>,
    {
        let info = self.registry.resolve::<K>()?;
        let key = object_key(info, namespace, name);
        let mut state = self.lock();

        state.actions.push(Action {
            verb: Verb::Delete,
            kind: info.kind.clone(),
            namespace: namespace.map(String::from),
            name: name.to_string(),
            delete_options: Some(options.clone()),
        });
        if let Some(err) = state.take_fault(Verb::Delete, &info.kind, name) {
            return Err(err);
        }

        let live_uid = match state.objects.get(&key) {
            Some(v) => v
                .pointer("/metadata/uid")
                .and_then(Value::as_str)
                .map(String::from),
            None => return Err(StoreError::not_found(&info.plural, name)),
        };
        if let Some(expected) = &options.uid_precondition
            && live_uid.as_ref() != Some(expected)
        {
            return Err(StoreError::conflict(
                &info.plural,
                name,
                format!(
                    "Precondition failed: UID in precondition: {expected}, UID in object meta: {}",
                    live_uid.unwrap_or_default()
                ),
            ));
        }

        state.objects.remove(&key);
        debug!("Deleted {} {}", info.kind, name);
        Ok(())
    }

    fn select<K>(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<K>, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let info = self.registry.resolve::<K>()?;
        let state = self.lock();

        let decoded = state
            .objects
            .iter()
            .filter(|(key, _)| key.api_version == info.api_version && key.kind == info.kind)
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, v)| decode::<K>(v.clone()))
            .collect::<Result<Vec<K>, _>>()?;

        Ok(decoded
            .into_iter()
            .filter(|o| selector.matches(o.meta().labels.as_ref()))
            .collect())
    }
}

fn encode<K: Serialize>(obj: &K) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|e| StoreError::serialization(e.to_string()))
}

fn decode<K: DeserializeOwned>(value: Value) -> Result<K, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::serialization(e.to_string()))
}

fn object_key(info: &KindInfo, namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey {
        api_version: info.api_version.clone(),
        kind: info.kind.clone(),
        namespace: if info.namespaced {
            namespace.unwrap_or_default().to_string()
        } else {
            String::new()
        },
        name: name.to_string(),
    }
}

fn identity(
    info: &KindInfo,
    meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> Result<(Option<String>, String), StoreError> {
    let invalid = |message: &str| StoreError::Api {
        code: 422,
        reason: String::from("Invalid"),
        message: format!("{} is invalid: {message}", info.kind),
    };

    let name = meta
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("metadata.name: Required value"))?;
    let namespace = if info.namespaced {
        Some(
            meta.namespace
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| invalid("metadata.namespace: Required value"))?,
        )
    } else {
        None
    };
    Ok((namespace, name))
}

/// Typed client over a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemoryClient<K> {
    cluster: Arc<MemoryCluster>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for MemoryClient<K> {
    fn clone(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ObjectClient<K> for MemoryClient<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        let info = self.cluster.registry.resolve::<K>()?;
        self.cluster
            .get_object(namespace, name)?
            .ok_or_else(|| StoreError::not_found(&info.plural, name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<K>, StoreError> {
        self.cluster.select(namespace, selector)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        self.cluster.insert(obj, true)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        self.cluster.replace(obj)
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        self.cluster.delete_object::<K>(namespace, name, options)
    }
}

enum ListerSource<K> {
    Live(Arc<MemoryCluster>),
    Snapshot(RwLock<Vec<Arc<K>>>),
}

/// Cache view over a [`MemoryCluster`].
///
/// A live lister reads the cluster directly. A snapshot lister keeps the
/// objects it was given and never refreshes, which models a cache that
/// lags behind the store.
pub struct MemoryLister<K> {
    source: ListerSource<K>,
}

impl<K> MemoryLister<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    /// Creates a snapshot lister holding `objects`.
    #[must_use]
    pub fn snapshot(objects: Vec<K>) -> Self {
        let objects = objects.into_iter().map(Arc::new).collect();
        Self {
            source: ListerSource::Snapshot(RwLock::new(objects)),
        }
    }

    /// Creates a snapshot lister from the cluster's current state.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered kinds.
    pub fn frozen(cluster: &MemoryCluster) -> Result<Self, StoreError> {
        Ok(Self::snapshot(
            cluster.select(None, &LabelSelector::everything())?,
        ))
    }

    /// Replaces the objects of a snapshot lister; no-op for a live one.
    pub fn set(&self, objects: Vec<K>) {
        if let ListerSource::Snapshot(cache) = &self.source {
            *cache.write().unwrap_or_else(PoisonError::into_inner) =
                objects.into_iter().map(Arc::new).collect();
        }
    }

    fn all(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Arc<K>> {
        match &self.source {
            ListerSource::Live(cluster) => cluster
                .select::<K>(namespace, selector)
                .unwrap_or_default()
                .into_iter()
                .map(Arc::new)
                .collect(),
            ListerSource::Snapshot(cache) => cache
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|o| namespace.is_none_or(|ns| o.meta().namespace.as_deref() == Some(ns)))
                .filter(|o| selector.matches(o.meta().labels.as_ref()))
                .cloned()
                .collect(),
        }
    }
}

impl<K> fmt::Debug for MemoryLister<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.source {
            ListerSource::Live(_) => "live",
            ListerSource::Snapshot(_) => "snapshot",
        };
        f.debug_struct("MemoryLister").field("mode", &mode).finish()
    }
}

impl<K> Lister<K> for MemoryLister<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        self.all(namespace, &LabelSelector::everything())
            .into_iter()
            .find(|o| o.meta().name.as_deref() == Some(name))
    }

    fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Arc<K>> {
        self.all(namespace, selector)
    }
}
