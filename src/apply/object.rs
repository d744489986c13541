//! Per-kind capabilities of the apply engine.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A kind the apply engine can converge.
///
/// The decision logic is shared; a kind only describes its scope and which
/// parts of a live object belong to the server and must survive an update.
pub trait ApplyObject:
    Resource<DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Whether objects of this kind live in a namespace.
    const NAMESPACED: bool;

    /// Copies server-owned content of `existing` into `self`, the update
    /// body built from the desired object.
    ///
    /// Metadata is handled by the engine; implementations only deal with
    /// the kind's own fields (status, server-assigned spec fields).
    fn carry_server_state(&mut self, existing: &Self) {
        let _ = existing;
    }
}

/// Returns `<namespace>/<name>` for namespaced objects, `<name>` otherwise.
#[must_use]
pub fn object_key<K: ApplyObject>(obj: &K) -> String {
    let meta = obj.meta();
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(ns) if K::NAMESPACED => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Returns a descriptor such as `v1, Kind=Secret "default/test"`, used in
/// error messages.
#[must_use]
pub fn describe<K: ApplyObject>(obj: &K) -> String {
    format!(
        "{}, Kind={} \"{}\"",
        K::api_version(&()),
        K::kind(&()),
        object_key(obj)
    )
}

impl ApplyObject for Secret {
    const NAMESPACED: bool = true;
}

impl ApplyObject for ConfigMap {
    const NAMESPACED: bool = true;
}

impl ApplyObject for Endpoints {
    const NAMESPACED: bool = true;
}

impl ApplyObject for ServiceAccount {
    const NAMESPACED: bool = true;

    fn carry_server_state(&mut self, existing: &Self) {
        if self.secrets.is_none() {
            self.secrets.clone_from(&existing.secrets);
        }
    }
}

impl ApplyObject for Service {
    const NAMESPACED: bool = true;

    fn carry_server_state(&mut self, existing: &Self) {
        self.status.clone_from(&existing.status);

        // Cluster IPs are allocated on create and immutable afterwards.
        if let (Some(spec), Some(live)) = (self.spec.as_mut(), existing.spec.as_ref()) {
            if spec.cluster_ip.is_none() {
                spec.cluster_ip.clone_from(&live.cluster_ip);
            }
            if spec.cluster_ips.is_none() {
                spec.cluster_ips.clone_from(&live.cluster_ips);
            }
        }
    }
}

impl ApplyObject for Pod {
    const NAMESPACED: bool = true;

    fn carry_server_state(&mut self, existing: &Self) {
        self.status.clone_from(&existing.status);

        if let (Some(spec), Some(live)) = (self.spec.as_mut(), existing.spec.as_ref())
            && spec.node_name.is_none()
        {
            spec.node_name.clone_from(&live.node_name);
        }
    }
}

impl ApplyObject for PersistentVolumeClaim {
    const NAMESPACED: bool = true;

    fn carry_server_state(&mut self, existing: &Self) {
        self.status.clone_from(&existing.status);

        if let (Some(spec), Some(live)) = (self.spec.as_mut(), existing.spec.as_ref())
            && spec.volume_name.is_none()
        {
            spec.volume_name.clone_from(&live.volume_name);
        }
    }
}

impl ApplyObject for Namespace {
    const NAMESPACED: bool = false;

    fn carry_server_state(&mut self, existing: &Self) {
        self.status.clone_from(&existing.status);
        if self.spec.is_none() {
            self.spec.clone_from(&existing.spec);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodSpec, PodStatus, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(String::from),
            ..ObjectMeta::default()
        }
    }

    #[test]
    fn test_describe() {
        let secret = Secret {
            metadata: meta(Some("default"), "test"),
            ..Secret::default()
        };
        assert_eq!(describe(&secret), "v1, Kind=Secret \"default/test\"");

        let ns = Namespace {
            metadata: meta(None, "scylla"),
            ..Namespace::default()
        };
        assert_eq!(object_key(&ns), "scylla");
    }

    #[test]
    fn test_service_keeps_allocated_cluster_ip() {
        let existing = Service {
            metadata: meta(Some("default"), "svc"),
            spec: Some(ServiceSpec {
                cluster_ip: Some(String::from("10.0.0.7")),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };
        let mut update = Service {
            metadata: meta(Some("default"), "svc"),
            spec: Some(ServiceSpec::default()),
            ..Service::default()
        };

        update.carry_server_state(&existing);
        assert_eq!(
            update.spec.and_then(|s| s.cluster_ip).as_deref(),
            Some("10.0.0.7")
        );
    }

    #[test]
    fn test_pod_keeps_status_and_node() {
        let existing = Pod {
            metadata: meta(Some("default"), "pod"),
            spec: Some(PodSpec {
                node_name: Some(String::from("node-1")),
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: Some(String::from("Running")),
                ..PodStatus::default()
            }),
        };
        let mut update = Pod {
            metadata: meta(Some("default"), "pod"),
            spec: Some(PodSpec::default()),
            status: None,
        };

        update.carry_server_state(&existing);
        assert_eq!(update.status, existing.status);
        assert_eq!(
            update.spec.and_then(|s| s.node_name).as_deref(),
            Some("node-1")
        );
    }
}
