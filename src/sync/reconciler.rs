//! Multi-kind reconciler for one parent.
//!
//! A pass prunes the excess children of every kind before it applies the
//! desired children of any kind, so names and quota held by a previous
//! generation never block the current one. The conditions of the pass are
//! handed to the status writer whether or not the pass succeeded.

use std::fmt;
use std::time::Duration;

use kube::Resource;
use tracing::{debug, error, info};

use crate::config::ControllerConfig;
use crate::context::ApplyContext;
use crate::error::{AggregateSyncError, SyncError};

use super::conditions::{
    AS_EXPECTED_REASON, Condition, ConditionStatus, DEGRADED_CONDITION, ERROR_REASON,
    PROGRESSING_CONDITION, aggregate_conditions, set_condition,
};
use super::kind::{ChildSyncer, SyncReport};
use super::parent::ParentRef;
use super::status::StatusWriter;

/// Reconciler driving every registered kind for one `P` parent.
pub struct Reconciler<P, S: StatusWriter> {
    /// Per-kind syncers, in apply order.
    syncers: Vec<Box<dyn ChildSyncer<P>>>,
    /// Destination of the computed conditions.
    status: S,
    /// Deadline of a whole pass.
    pass_timeout: Option<Duration>,
}

/// Result of a successful reconciliation pass.
#[derive(Debug)]
pub struct ReconciliationResult {
    /// Mutations performed.
    pub report: SyncReport,
    /// Conditions handed to the status writer.
    pub conditions: Vec<Condition>,
}

impl ReconciliationResult {
    /// Returns true if the pass found every child converged.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.report.is_converged()
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_settled() { "settled" } else { "progressing" };
        write!(f, "Reconciliation {state}: {}", self.report)
    }
}

impl<P, S> Reconciler<P, S>
where
    P: Resource<DynamicType = ()> + Send + Sync + 'static,
    S: StatusWriter,
{
    /// Creates a reconciler without any kind.
    #[must_use]
    pub fn new(status: S) -> Self {
        Self {
            syncers: Vec::new(),
            status,
            pass_timeout: None,
        }
    }

    /// Adds a kind. Kinds are applied in the order they are added.
    #[must_use]
    pub fn with_syncer(mut self, syncer: impl ChildSyncer<P> + 'static) -> Self {
        self.syncers.push(Box::new(syncer));
        self
    }

    /// Bounds every pass by a deadline.
    #[must_use]
    pub const fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = Some(timeout);
        self
    }

    /// Applies the pass timeout of the controller configuration.
    #[must_use]
    pub fn with_controller_config(self, controller: &ControllerConfig) -> Self {
        match controller.pass_timeout() {
            Some(timeout) => self.with_pass_timeout(timeout),
            None => self,
        }
    }

    /// Runs one pass for `parent`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Parent` without any store call if the parent
    /// has no name or UID. Otherwise returns the failures of the pass,
    /// after the conditions were handed to the status writer. A single
    /// failure is returned as is; several are returned as
    /// `SyncError::Multiple`.
    pub async fn reconcile(
        &self,
        ctx: &ApplyContext,
        parent: &P,
    ) -> Result<ReconciliationResult, SyncError> {
        let parent_ref =
            ParentRef::from_resource(parent).map_err(|source| SyncError::Parent { source })?;
        info!("Starting reconciliation for {} {}", parent_ref.kind, parent_ref.key());

        let ctx = match self.pass_timeout {
            Some(timeout) => ctx.child().with_timeout(timeout),
            None => ctx.child(),
        };
        let mut report = SyncReport::default();
        let mut failures: Vec<(String, SyncError)> = Vec::new();

        for syncer in &self.syncers {
            if let Err(err) = syncer.prune(&ctx, parent, &parent_ref, &mut report).await {
                error!("Pruning {} failed: {}", syncer.kind(), err);
                failures.push((syncer.kind(), err));
            }
        }

        if failures.is_empty() {
            for syncer in &self.syncers {
                if let Err(err) = syncer.apply(&ctx, parent, &parent_ref, &mut report).await {
                    error!("Applying {} failed: {}", syncer.kind(), err);
                    failures.push((syncer.kind(), err));
                }
            }
        } else {
            debug!("Skipping applies after {} prune failure(s)", failures.len());
        }

        let conditions = self.status_conditions(&parent_ref, &report, &failures);
        if let Err(err) = self.status.write_conditions(&parent_ref, &conditions).await {
            error!("Failed to write status of {}: {}", parent_ref.key(), err);
            failures.push((parent_ref.kind.clone(), SyncError::Status { source: err }));
        }

        info!("Reconciliation of {} finished: {}", parent_ref.key(), report);

        let mut errors: Vec<SyncError> = failures.into_iter().map(|(_, e)| e).collect();
        match errors.len() {
            0 => Ok(ReconciliationResult { report, conditions }),
            1 => Err(errors.remove(0)),
            _ => Err(SyncError::Multiple(AggregateSyncError(errors))),
        }
    }

    /// Builds per-kind and parent-level conditions for a pass.
    fn status_conditions(
        &self,
        parent: &ParentRef,
        report: &SyncReport,
        failures: &[(String, SyncError)],
    ) -> Vec<Condition> {
        let generation = parent.generation;
        let mut progressing = Vec::new();
        let mut degraded = Vec::new();

        for syncer in &self.syncers {
            let condition_type = syncer.condition_type();
            let own: Vec<Condition> = report
                .progressing
                .iter()
                .filter(|c| c.type_ == condition_type)
                .cloned()
                .collect();
            set_condition(
                &mut progressing,
                aggregate_conditions(&own, &condition_type, generation),
            );

            let kind = syncer.kind();
            let degraded_type = format!("{kind}ControllerDegraded");
            let condition = match failures.iter().find(|(k, _)| *k == kind) {
                Some((_, err)) => Condition::new(
                    degraded_type,
                    ConditionStatus::True,
                    ERROR_REASON,
                    err.to_string(),
                    generation,
                ),
                None => Condition::new(
                    degraded_type,
                    ConditionStatus::False,
                    AS_EXPECTED_REASON,
                    "",
                    generation,
                ),
            };
            set_condition(&mut degraded, condition);
        }

        let mut conditions = Vec::with_capacity(progressing.len() + degraded.len() + 2);
        conditions.push(aggregate_conditions(&progressing, PROGRESSING_CONDITION, generation));
        conditions.push(aggregate_conditions(&degraded, DEGRADED_CONDITION, generation));
        conditions.extend(progressing);
        conditions.extend(degraded);
        conditions
    }
}

impl<P, S: StatusWriter> fmt::Debug for Reconciler<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.syncers.iter().map(|s| s.kind()).collect();
        f.debug_struct("Reconciler")
            .field("kinds", &kinds)
            .field("pass_timeout", &self.pass_timeout)
            .finish_non_exhaustive()
    }
}
