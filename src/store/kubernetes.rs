//! Kubernetes API backend.
//!
//! [`KubeObjectClient`] writes through `kube::Api`; [`ReflectorLister`]
//! reads from a `kube::runtime::reflector` store fed by a watch.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{
    Api, DeleteParams, ListParams, PostParams, Preconditions,
    PropagationPolicy as KubePropagationPolicy,
};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

use super::client::{DeleteOptions, LabelSelector, Lister, ObjectClient, PropagationPolicy};

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => Self::Api {
                code: status.code,
                reason: status.reason,
                message: status.message,
            },
            kube::Error::SerdeError(e) => Self::serialization(e.to_string()),
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Maps a kube error onto the store taxonomy for one named object.
fn store_error<K: Resource<DynamicType = ()>>(err: kube::Error, name: &str) -> StoreError {
    let plural = K::plural(&());
    match StoreError::from(err) {
        StoreError::Api { code: 404, .. } => StoreError::not_found(plural, name),
        StoreError::Api {
            code: 409, reason, ..
        } if reason == "AlreadyExists" => StoreError::already_exists(plural, name),
        StoreError::Api {
            code: 409, message, ..
        } => StoreError::conflict(plural, name, message),
        other => other,
    }
}

type ApiFactory<K> = fn(Client, Option<&str>) -> Api<K>;

fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn cluster_api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
{
    Api::all(client)
}

/// Typed client over the Kubernetes API.
pub struct KubeObjectClient<K> {
    client: Client,
    api: ApiFactory<K>,
}

impl<K> KubeObjectClient<K>
where
    K: Resource<DynamicType = ()>,
{
    /// Creates a client for a namespaced kind.
    #[must_use]
    pub fn namespaced(client: Client) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            client,
            api: namespaced_api::<K>,
        }
    }

    /// Creates a client for a cluster-scoped kind.
    #[must_use]
    pub fn cluster(client: Client) -> Self
    where
        K: Resource<Scope = ClusterResourceScope>,
    {
        Self {
            client,
            api: cluster_api::<K>,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        (self.api)(self.client.clone(), namespace)
    }
}

impl<K> Clone for KubeObjectClient<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api: self.api,
        }
    }
}

impl<K> fmt::Debug for KubeObjectClient<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectClient").finish_non_exhaustive()
    }
}

fn name_of<K: Resource>(obj: &K) -> String {
    obj.meta().name.clone().unwrap_or_default()
}

#[async_trait]
impl<K> ObjectClient<K> for KubeObjectClient<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StoreError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| store_error::<K>(e, name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        let list = self.api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let name = name_of(obj);
        self.api(obj.meta().namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| store_error::<K>(e, &name))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let name = name_of(obj);
        self.api(obj.meta().namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| store_error::<K>(e, &name))
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        let params = DeleteParams {
            preconditions: options.uid_precondition.as_ref().map(|uid| Preconditions {
                uid: Some(uid.clone()),
                resource_version: None,
            }),
            propagation_policy: options.propagation.map(|p| match p {
                PropagationPolicy::Background => KubePropagationPolicy::Background,
                PropagationPolicy::Foreground => KubePropagationPolicy::Foreground,
                PropagationPolicy::Orphan => KubePropagationPolicy::Orphan,
            }),
            ..DeleteParams::default()
        };

        self.api(namespace)
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| store_error::<K>(e, name))
    }
}

/// Lister over a reflector store.
pub struct ReflectorLister<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    store: Store<K>,
}

impl<K> ReflectorLister<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    /// Wraps a reflector store.
    #[must_use]
    pub const fn new(store: Store<K>) -> Self {
        Self { store }
    }
}

impl<K> fmt::Debug for ReflectorLister<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectorLister").finish_non_exhaustive()
    }
}

impl<K> Lister<K> for ReflectorLister<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        let mut key = ObjectRef::<K>::new(name);
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        self.store.get(&key)
    }

    fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Arc<K>> {
        self.store
            .state()
            .into_iter()
            .filter(|o| namespace.is_none_or(|ns| o.meta().namespace.as_deref() == Some(ns)))
            .filter(|o| selector.matches(o.meta().labels.as_ref()))
            .collect()
    }
}
