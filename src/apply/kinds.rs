//! Typed entry points of the apply engine.
//!
//! Each function is [`apply`](super::apply) fixed to one kind.

use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};

use crate::context::ApplyContext;
use crate::error::ApplyError;
use crate::events::EventSink;
use crate::store::{Lister, ObjectClient};

use super::engine::{Applied, ApplyOptions, apply};

macro_rules! apply_kind {
    ($(#[$doc:meta])* $name:ident, $kind:ty) => {
        $(#[$doc])*
        ///
        /// # Errors
        ///
        /// See [`apply`](super::apply).
        pub async fn $name<C, L, E>(
            ctx: &ApplyContext,
            client: &C,
            lister: &L,
            events: &E,
            required: &$kind,
            options: ApplyOptions,
        ) -> Result<Applied<$kind>, ApplyError>
        where
            C: ObjectClient<$kind> + ?Sized,
            L: Lister<$kind> + ?Sized,
            E: EventSink + ?Sized,
        {
            apply(ctx, client, lister, events, required, options).await
        }
    };
}

apply_kind!(
    /// Converges a `Service`. Allocated cluster IPs and status are kept.
    apply_service,
    Service
);
apply_kind!(
    /// Converges a `Secret`.
    apply_secret,
    Secret
);
apply_kind!(
    /// Converges a `ServiceAccount`. Token secrets listed by the server are kept.
    apply_service_account,
    ServiceAccount
);
apply_kind!(
    /// Converges a `ConfigMap`.
    apply_config_map,
    ConfigMap
);
apply_kind!(
    /// Converges a `Pod`. Status and node binding are kept.
    apply_pod,
    Pod
);
apply_kind!(
    /// Converges a `PersistentVolumeClaim`. Status and volume binding are kept.
    apply_persistent_volume_claim,
    PersistentVolumeClaim
);
apply_kind!(
    /// Converges an `Endpoints` object, as used by selector-less services.
    apply_endpoints,
    Endpoints
);
apply_kind!(
    /// Converges a `Namespace`.
    apply_namespace,
    Namespace
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, ServicePort, ServiceSpec, ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    use crate::events::RecordingEventSink;
    use crate::registry::KindRegistry;
    use crate::store::MemoryCluster;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(String::from("default")),
            owner_references: Some(vec![OwnerReference {
                api_version: String::from("scylla.scylladb.com/v1"),
                kind: String::from("ScyllaCluster"),
                name: String::from("basic"),
                uid: String::from("abcdefgh"),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..ObjectMeta::default()
        }
    }

    fn service(port: i32) -> Service {
        Service {
            metadata: meta("test"),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(String::from("cql")),
                    port,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    #[tokio::test]
    async fn test_service_update_keeps_server_state() {
        let cluster = Arc::new(MemoryCluster::new(KindRegistry::with_builtin_kinds()));
        let events = RecordingEventSink::new();
        let ctx = ApplyContext::new();
        let client = cluster.client::<Service>();
        let lister = cluster.lister::<Service>();

        apply_service(&ctx, &client, &lister, &events, &service(9042), ApplyOptions::new())
            .await
            .unwrap();
        cluster
            .mutate::<Service, _>(Some("default"), "test", |s| {
                if let Some(spec) = s.spec.as_mut() {
                    spec.cluster_ip = Some(String::from("10.0.0.7"));
                }
                s.status = Some(ServiceStatus::default());
            })
            .unwrap();

        let updated =
            apply_service(&ctx, &client, &lister, &events, &service(19042), ApplyOptions::new())
                .await
                .unwrap();

        assert!(updated.changed);
        let spec = updated.object.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(spec.ports.unwrap()[0].port, 19042);
        assert!(updated.object.status.is_some());
        assert_eq!(
            events.lines(),
            vec![
                "Normal ServiceCreated Service default/test created",
                "Normal ServiceUpdated Service default/test updated",
            ]
        );
    }

    #[tokio::test]
    async fn test_config_map_entry_point() {
        let cluster = Arc::new(MemoryCluster::new(KindRegistry::with_builtin_kinds()));
        let events = RecordingEventSink::new();
        let required = ConfigMap {
            metadata: meta("config"),
            data: Some(BTreeMap::from([(
                String::from("scylla.yaml"),
                String::from("cluster_name: basic"),
            )])),
            ..ConfigMap::default()
        };

        let applied = apply_config_map(
            &ApplyContext::new(),
            &cluster.client::<ConfigMap>(),
            &cluster.lister::<ConfigMap>(),
            &events,
            &required,
            ApplyOptions::new(),
        )
        .await
        .unwrap();

        assert!(applied.changed);
        assert_eq!(
            events.lines(),
            vec!["Normal ConfigMapCreated ConfigMap default/config created"]
        );
    }

    fn endpoints(ip: &str) -> Endpoints {
        Endpoints {
            metadata: meta("test"),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(vec![EndpointAddress {
                    ip: ip.to_string(),
                    ..EndpointAddress::default()
                }]),
                ports: Some(vec![EndpointPort {
                    name: Some(String::from("cql")),
                    port: 9042,
                    ..EndpointPort::default()
                }]),
                ..EndpointSubset::default()
            }]),
        }
    }

    #[tokio::test]
    async fn test_endpoints_create_noop_and_update() {
        let cluster = Arc::new(MemoryCluster::new(KindRegistry::with_builtin_kinds()));
        let events = RecordingEventSink::new();
        let ctx = ApplyContext::new();
        let client = cluster.client::<Endpoints>();
        let lister = cluster.lister::<Endpoints>();
        let options = ApplyOptions::new();
        let (v1, v2) = (endpoints("10.0.0.1"), endpoints("10.0.0.2"));

        let created = apply_endpoints(&ctx, &client, &lister, &events, &v1, options)
            .await
            .unwrap();
        assert!(created.changed);

        let unchanged = apply_endpoints(&ctx, &client, &lister, &events, &v1, options)
            .await
            .unwrap();
        assert!(!unchanged.changed);

        let updated = apply_endpoints(&ctx, &client, &lister, &events, &v2, options)
            .await
            .unwrap();
        assert!(updated.changed);
        let subsets = updated.object.subsets.unwrap();
        assert_eq!(subsets[0].addresses.as_ref().unwrap()[0].ip, "10.0.0.2");
        assert_eq!(
            events.lines(),
            vec![
                "Normal EndpointsCreated Endpoints default/test created",
                "Normal EndpointsUpdated Endpoints default/test updated",
            ]
        );
    }
}
