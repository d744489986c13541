//! Sync of the member service account of a parent.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::apply::ApplyOptions;
use crate::context::ApplyContext;
use crate::events::EventSink;
use crate::store::{Lister, ObjectClient};

use super::kind::{KindPolicy, SyncOutcome, sync_kind};
use super::parent::ParentRef;

/// Name of the member service account of `parent`.
#[must_use]
pub fn member_service_account_name(parent: &ParentRef) -> String {
    format!("{}-member", parent.name)
}

/// Builds the service account every member of `parent` runs as.
#[must_use]
pub fn make_service_account(parent: &ParentRef) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(member_service_account_name(parent)),
            namespace: parent.namespace.clone(),
            labels: Some(parent.selector_labels()),
            owner_references: Some(vec![parent.controller_ref()]),
            ..ObjectMeta::default()
        },
        ..ServiceAccount::default()
    }
}

/// Policy of the service account sync.
///
/// Ownership is forced: a member service account left behind without a
/// controller is adopted.
#[must_use]
pub fn service_account_policy() -> KindPolicy {
    KindPolicy::for_kind::<ServiceAccount>()
        .with_options(ApplyOptions::new().with_force_ownership(true))
}

/// Deletes stale service accounts of `parent`, then applies the member one.
pub async fn sync_service_accounts<C, L, E>(
    ctx: &ApplyContext,
    client: &C,
    lister: &L,
    events: &E,
    parent: &ParentRef,
) -> SyncOutcome
where
    C: ObjectClient<ServiceAccount> + ?Sized,
    L: Lister<ServiceAccount> + ?Sized,
    E: EventSink + ?Sized,
{
    let desired = [make_service_account(parent)];
    sync_kind(
        ctx,
        client,
        lister,
        events,
        parent,
        &desired,
        &service_account_policy(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::ObjectReference;

    use crate::error::SyncError;
    use crate::events::RecordingEventSink;
    use crate::registry::KindRegistry;
    use crate::store::MemoryCluster;
    use crate::sync::conditions::find_condition;

    fn create_test_parent() -> ParentRef {
        ParentRef {
            api_version: String::from("scylla.scylladb.com/v1alpha1"),
            kind: String::from("ScyllaDBDatacenter"),
            name: String::from("basic"),
            namespace: Some(String::from("scylla")),
            uid: String::from("abcdefgh"),
            generation: 2,
        }
    }

    fn create_test_cluster() -> Arc<MemoryCluster> {
        Arc::new(MemoryCluster::new(KindRegistry::with_builtin_kinds()))
    }

    #[tokio::test]
    async fn test_member_service_account_created() {
        let cluster = create_test_cluster();
        let events = RecordingEventSink::new();
        let parent = create_test_parent();

        let outcome = sync_service_accounts(
            &ApplyContext::new(),
            &cluster.client::<ServiceAccount>(),
            &cluster.lister::<ServiceAccount>(),
            &events,
            &parent,
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.report.changed, 1);
        assert_eq!(
            outcome.report.progressing[0].to_string(),
            "ServiceAccountControllerProgressing=True (Progressing): \
             Waiting for ServiceAccount scylla/basic-member to apply"
        );
        let created: ServiceAccount = cluster
            .get_object(Some("scylla"), "basic-member")
            .unwrap()
            .unwrap();
        assert!(crate::ownership::is_controlled_by_uid(&created.metadata, "abcdefgh"));
        assert_eq!(
            events.lines(),
            vec!["Normal ServiceAccountCreated ServiceAccount scylla/basic-member created"]
        );
    }

    #[tokio::test]
    async fn test_orphaned_member_service_account_adopted() {
        let cluster = create_test_cluster();
        let events = RecordingEventSink::new();
        let parent = create_test_parent();

        let mut orphan = make_service_account(&parent);
        orphan.metadata.owner_references = None;
        orphan.secrets = Some(vec![ObjectReference {
            name: Some(String::from("basic-member-token")),
            ..ObjectReference::default()
        }]);
        cluster.seed(&orphan).unwrap();

        let outcome = sync_service_accounts(
            &ApplyContext::new(),
            &cluster.client::<ServiceAccount>(),
            &cluster.lister::<ServiceAccount>(),
            &events,
            &parent,
        )
        .await;

        assert!(outcome.is_ok());
        let adopted: ServiceAccount = cluster
            .get_object(Some("scylla"), "basic-member")
            .unwrap()
            .unwrap();
        assert!(crate::ownership::is_controlled_by_uid(&adopted.metadata, "abcdefgh"));
        assert_eq!(adopted.secrets.map(|s| s.len()), Some(1));
    }

    #[tokio::test]
    async fn test_stale_service_account_deleted_before_apply() {
        let cluster = create_test_cluster();
        let events = RecordingEventSink::new();
        let parent = create_test_parent();

        let mut stale = make_service_account(&parent);
        stale.metadata.name = Some(String::from("basic-old"));
        cluster.seed(&stale).unwrap();

        let outcome = sync_service_accounts(
            &ApplyContext::new(),
            &cluster.client::<ServiceAccount>(),
            &cluster.lister::<ServiceAccount>(),
            &events,
            &parent,
        )
        .await;

        assert!(outcome.is_ok());
        let order: Vec<String> = cluster.actions().iter().map(ToString::to_string).collect();
        assert_eq!(
            order,
            vec![
                "delete ServiceAccount scylla/basic-old",
                "create ServiceAccount scylla/basic-member",
            ]
        );
        assert_eq!(outcome.report.pruned, 1);
    }

    #[tokio::test]
    async fn test_foreign_member_service_account_fails() {
        let cluster = create_test_cluster();
        let events = RecordingEventSink::new();
        let parent = create_test_parent();

        let mut foreign = make_service_account(&parent);
        if let Some(refs) = foreign.metadata.owner_references.as_mut() {
            refs[0].uid = String::from("other-uid");
        }
        cluster.seed(&foreign).unwrap();

        let outcome = sync_service_accounts(
            &ApplyContext::new(),
            &cluster.client::<ServiceAccount>(),
            &cluster.lister::<ServiceAccount>(),
            &events,
            &parent,
        )
        .await;

        let err = outcome.result.unwrap_err();
        assert!(matches!(err, SyncError::Apply { .. }));
        assert!(err.to_string().starts_with("can't apply ServiceAccount: "));
        let progressing = &outcome.report.progressing;
        assert!(find_condition(progressing, "ServiceAccountControllerProgressing").is_none());
        assert!(cluster.actions().is_empty());
    }
}
