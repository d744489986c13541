//! Per-kind sync pass: prune excess children, then apply desired ones.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::apply::{ApplyObject, ApplyOptions, apply, object_key};
use crate::context::ApplyContext;
use crate::error::{AggregateError, SyncError};
use crate::events::EventSink;
use crate::ownership::is_controlled_by_uid;
use crate::store::{DeleteOptions, Lister, ObjectClient, PropagationPolicy};

use super::conditions::{Condition, ProgressAction, add_progressing_condition};
use super::parent::ParentRef;

/// How one kind of children is synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindPolicy {
    /// Type of the progressing conditions recorded for this kind.
    pub condition_type: String,
    /// Apply options for every desired child.
    pub options: ApplyOptions,
}

impl KindPolicy {
    /// Default policy for `K`: `<Kind>ControllerProgressing` conditions,
    /// default apply options.
    #[must_use]
    pub fn for_kind<K: ApplyObject>() -> Self {
        Self {
            condition_type: format!("{}ControllerProgressing", K::kind(&())),
            options: ApplyOptions::new(),
        }
    }

    /// Sets the apply options.
    #[must_use]
    pub const fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }
}

/// What a sync pass did, kept even when the pass fails.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Progressing conditions, one per mutating step, in order.
    pub progressing: Vec<Condition>,
    /// Children deleted.
    pub pruned: usize,
    /// Children created or updated.
    pub changed: usize,
    /// Children already converged.
    pub unchanged: usize,
}

impl SyncReport {
    /// Returns true if no mutating step happened.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.progressing.is_empty()
    }

    /// Adds the counters and conditions of `other`.
    pub fn merge(&mut self, other: Self) {
        self.progressing.extend(other.progressing);
        self.pruned += other.pruned;
        self.changed += other.changed;
        self.unchanged += other.unchanged;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pruned, {} changed, {} unchanged",
            self.pruned, self.changed, self.unchanged
        )
    }
}

/// Result of a single-kind sync pass.
///
/// The report is returned alongside the error so partial progress stays
/// observable.
#[derive(Debug)]
pub struct SyncOutcome {
    /// What happened.
    pub report: SyncReport,
    /// How the pass ended.
    pub result: Result<(), SyncError>,
}

impl SyncOutcome {
    /// Returns true if the pass succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn scope_namespace<K: ApplyObject>(parent: &ParentRef) -> Option<&str> {
    if K::NAMESPACED {
        parent.namespace.as_deref()
    } else {
        None
    }
}

/// Deletes every child of `parent` that is not desired.
///
/// Children come from the cache, selected by the parent's labels and
/// controlled by the parent's UID; terminating ones are skipped. Every
/// deletion is attempted; failures are aggregated.
///
/// # Errors
///
/// Returns `SyncError::Prune` with every deletion failure.
pub async fn prune_children<K, C, L>(
    ctx: &ApplyContext,
    client: &C,
    lister: &L,
    parent: &ParentRef,
    desired: &[K],
    policy: &KindPolicy,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    K: ApplyObject,
    C: ObjectClient<K> + ?Sized,
    L: Lister<K> + ?Sized,
{
    let kind = K::kind(&());
    let keep: HashSet<&str> = desired
        .iter()
        .filter_map(|d| d.meta().name.as_deref())
        .collect();

    let mut excess: Vec<Arc<K>> = lister
        .list(scope_namespace::<K>(parent), &parent.selector())
        .into_iter()
        .filter(|child| is_controlled_by_uid(child.meta(), &parent.uid))
        .filter(|child| child.meta().deletion_timestamp.is_none())
        .filter(|child| {
            child
                .meta()
                .name
                .as_deref()
                .is_some_and(|name| !keep.contains(name))
        })
        .collect();
    excess.sort_by_key(|child| object_key(child.as_ref()));

    let mut results = Vec::with_capacity(excess.len());
    for child in excess {
        let meta = child.meta();
        let key = object_key(child.as_ref());
        let options = meta.uid.clone().map_or_else(
            || DeleteOptions {
                uid_precondition: None,
                propagation: Some(PropagationPolicy::Background),
            },
            DeleteOptions::guarded,
        );

        add_progressing_condition(
            &mut report.progressing,
            &policy.condition_type,
            &kind,
            &key,
            ProgressAction::Delete,
            parent.generation,
        );
        debug!("Deleting excess {} {}", kind, key);

        let name = meta.name.as_deref().unwrap_or_default();
        let result = ctx
            .run(client.delete(meta.namespace.as_deref(), name, &options))
            .await;
        if result.is_ok() {
            info!("Deleted {} {}", kind, key);
            report.pruned += 1;
        }
        results.push(result);
    }

    match AggregateError::from_results(results) {
        Some(errors) => Err(SyncError::Prune {
            kind: kind.into_owned(),
            errors,
        }),
        None => Ok(()),
    }
}

/// Applies every desired child, stopping at the first failure.
///
/// # Errors
///
/// Returns `SyncError::Apply` wrapping the first apply failure.
#[allow(clippy::too_many_arguments)]
pub async fn apply_children<K, C, L, E>(
    ctx: &ApplyContext,
    client: &C,
    lister: &L,
    events: &E,
    parent: &ParentRef,
    desired: &[K],
    policy: &KindPolicy,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    K: ApplyObject,
    C: ObjectClient<K> + ?Sized,
    L: Lister<K> + ?Sized,
    E: EventSink + ?Sized,
{
    for required in desired {
        let applied = apply(ctx, client, lister, events, required, policy.options)
            .await
            .map_err(|source| SyncError::Apply {
                kind: K::kind(&()).into_owned(),
                source,
            })?;

        if applied.changed {
            add_progressing_condition(
                &mut report.progressing,
                &policy.condition_type,
                &K::kind(&()),
                &object_key(required),
                ProgressAction::Apply,
                parent.generation,
            );
            report.changed += 1;
        } else {
            report.unchanged += 1;
        }
    }
    Ok(())
}

/// Runs one full pass for one kind: prune, then apply.
///
/// A prune failure aborts the pass before anything is applied.
pub async fn sync_kind<K, C, L, E>(
    ctx: &ApplyContext,
    client: &C,
    lister: &L,
    events: &E,
    parent: &ParentRef,
    desired: &[K],
    policy: &KindPolicy,
) -> SyncOutcome
where
    K: ApplyObject,
    C: ObjectClient<K> + ?Sized,
    L: Lister<K> + ?Sized,
    E: EventSink + ?Sized,
{
    let mut report = SyncReport::default();

    let mut result =
        prune_children(ctx, client, lister, parent, desired, policy, &mut report).await;
    if result.is_ok() {
        result =
            apply_children(ctx, client, lister, events, parent, desired, policy, &mut report)
                .await;
    }

    SyncOutcome { report, result }
}

/// Desired children of one kind, computed without I/O from the parent
/// object and the reference derived from it.
pub type DesiredFn<P, K> = dyn Fn(&P, &ParentRef) -> Vec<K> + Send + Sync;

/// One kind of children of a `P` parent, as seen by the multi-kind
/// reconciler.
///
/// `parent_ref` is always derived from `parent`.
#[async_trait]
pub trait ChildSyncer<P>: Send + Sync {
    /// Kind name, used in logs and errors.
    fn kind(&self) -> String;

    /// Type of the progressing conditions this syncer records.
    fn condition_type(&self) -> String;

    /// Deletes the excess children of `parent`.
    async fn prune(
        &self,
        ctx: &ApplyContext,
        parent: &P,
        parent_ref: &ParentRef,
        report: &mut SyncReport,
    ) -> Result<(), SyncError>;

    /// Applies the desired children of `parent`.
    async fn apply(
        &self,
        ctx: &ApplyContext,
        parent: &P,
        parent_ref: &ParentRef,
        report: &mut SyncReport,
    ) -> Result<(), SyncError>;
}

/// [`ChildSyncer`] for one typed kind `K` of a `P` parent.
pub struct KindSyncer<P, K, C, L> {
    client: C,
    lister: L,
    events: Arc<dyn EventSink>,
    policy: KindPolicy,
    desired: Box<DesiredFn<P, K>>,
}

impl<P, K, C, L> KindSyncer<P, K, C, L>
where
    K: ApplyObject,
    C: ObjectClient<K>,
    L: Lister<K>,
{
    /// Creates a syncer with the default policy for `K`.
    pub fn new<F>(client: C, lister: L, events: Arc<dyn EventSink>, desired: F) -> Self
    where
        F: Fn(&P, &ParentRef) -> Vec<K> + Send + Sync + 'static,
    {
        Self {
            client,
            lister,
            events,
            policy: KindPolicy::for_kind::<K>(),
            desired: Box::new(desired),
        }
    }

    /// Sets the sync policy.
    #[must_use]
    pub fn with_policy(mut self, policy: KindPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the sync policy.
    #[must_use]
    pub const fn policy(&self) -> &KindPolicy {
        &self.policy
    }
}

impl<P, K, C, L> fmt::Debug for KindSyncer<P, K, C, L>
where
    K: ApplyObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindSyncer")
            .field("kind", &K::kind(&()))
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P, K, C, L> ChildSyncer<P> for KindSyncer<P, K, C, L>
where
    P: Send + Sync + 'static,
    K: ApplyObject,
    C: ObjectClient<K>,
    L: Lister<K>,
{
    fn kind(&self) -> String {
        K::kind(&()).into_owned()
    }

    fn condition_type(&self) -> String {
        self.policy.condition_type.clone()
    }

    async fn prune(
        &self,
        ctx: &ApplyContext,
        parent: &P,
        parent_ref: &ParentRef,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let desired = (self.desired)(parent, parent_ref);
        prune_children(
            ctx,
            &self.client,
            &self.lister,
            parent_ref,
            &desired,
            &self.policy,
            report,
        )
        .await
    }

    async fn apply(
        &self,
        ctx: &ApplyContext,
        parent: &P,
        parent_ref: &ParentRef,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let desired = (self.desired)(parent, parent_ref);
        apply_children(
            ctx,
            &self.client,
            &self.lister,
            self.events.as_ref(),
            parent_ref,
            &desired,
            &self.policy,
            report,
        )
        .await
    }
}
