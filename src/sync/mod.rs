//! Sync orchestration.
//!
//! A controller pass for one parent computes the desired children of each
//! kind, prunes the excess ones, applies the desired ones and folds what it
//! did into status conditions.

mod conditions;
mod kind;
mod parent;
mod reconciler;
mod serviceaccounts;
mod status;

pub use conditions::{
    AS_EXPECTED_REASON, Condition, ConditionStatus, DEGRADED_CONDITION, ERROR_REASON,
    MULTIPLE_REASONS, PROGRESSING_CONDITION, PROGRESSING_REASON, ProgressAction,
    add_progressing_condition, aggregate_conditions, find_condition, set_condition,
};
pub use kind::{
    ChildSyncer, DesiredFn, KindPolicy, KindSyncer, SyncOutcome, SyncReport, apply_children,
    prune_children, sync_kind,
};
pub use parent::ParentRef;
pub use reconciler::{Reconciler, ReconciliationResult};
pub use serviceaccounts::{
    make_service_account, member_service_account_name, service_account_policy,
    sync_service_accounts,
};
pub use status::{RecordingStatusWriter, StatusWriter};
