//! The converge-one-object primitive.
//!
//! [`apply`] drives one child towards its desired form:
//!
//! 1. absent from the cache: create it;
//! 2. present but owned by someone else: refuse;
//! 3. present with the desired content hash: do nothing;
//! 4. otherwise: update it in place.
//!
//! Repeated calls with the same desired object converge after at most one
//! write; every later call is a no-op without events.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ApplyContext;
use crate::error::ApplyError;
use crate::events::{EventRecord, EventSink, object_reference};
use crate::hash::{ManagedKeys, ObjectHasher, read_hash_annotation, set_hash_annotation};
use crate::ownership::{check_ownership, controller_ref};
use crate::store::{Lister, ObjectClient};

use super::merge::merge_managed;
use super::object::{ApplyObject, describe, object_key};

/// Ownership policy of one apply call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    /// Claim existing objects that have no controller.
    pub force_ownership: bool,
    /// Accept desired objects without a controller reference.
    pub allow_missing_controller_ref: bool,
}

impl ApplyOptions {
    /// Default policy: controller reference required, no claiming.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            force_ownership: false,
            allow_missing_controller_ref: false,
        }
    }

    /// Sets whether orphans are claimed.
    #[must_use]
    pub const fn with_force_ownership(mut self, force: bool) -> Self {
        self.force_ownership = force;
        self
    }

    /// Sets whether a missing controller reference is accepted.
    #[must_use]
    pub const fn with_allow_missing_controller_ref(mut self, allow: bool) -> Self {
        self.allow_missing_controller_ref = allow;
        self
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone)]
pub struct Applied<K> {
    /// The object as stored after the call.
    pub object: K,
    /// Whether a write happened.
    pub changed: bool,
}

impl<K> Applied<K> {
    const fn changed(object: K) -> Self {
        Self {
            object,
            changed: true,
        }
    }

    const fn unchanged(object: K) -> Self {
        Self {
            object,
            changed: false,
        }
    }
}

impl<K: ApplyObject> fmt::Display for Applied<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.changed { "changed" } else { "unchanged" };
        write!(f, "{} {} {}", K::kind(&()), object_key(&self.object), state)
    }
}

/// Converges one object to `required`.
///
/// The existing object is read from `lister`; writes go through `client`
/// under `ctx`. Creates, updates and ownership failures are reported to
/// `events`.
///
/// # Errors
///
/// - `MissingControllerRef` / `InvalidObject` before any store call.
/// - `OwnershipConflict` if the live object belongs to someone else.
/// - `Create`, `Update` or `NotFoundOnUpdate` wrapping the store failure.
pub async fn apply<K, C, L, E>(
    ctx: &ApplyContext,
    client: &C,
    lister: &L,
    events: &E,
    required: &K,
    options: ApplyOptions,
) -> Result<Applied<K>, ApplyError>
where
    K: ApplyObject,
    C: ObjectClient<K> + ?Sized,
    L: Lister<K> + ?Sized,
    E: EventSink + ?Sized,
{
    let object = describe(required);
    validate(required, &object, options)?;

    let mut required = required.clone();
    let required_hash = set_hash_annotation(&mut required).map_err(|e| ApplyError::Hash {
        object: object.clone(),
        message: e.to_string(),
    })?;

    let meta = required.meta();
    let namespace = if K::NAMESPACED {
        meta.namespace.as_deref()
    } else {
        None
    };
    let name = meta.name.as_deref().unwrap_or_default();

    let Some(existing) = lister.get(namespace, name) else {
        let body = build_create(&required);
        return create(ctx, client, events, &body, object).await;
    };

    let ownership = check_ownership(existing.meta(), required.meta());
    if !ownership.permits_mutation(options.force_ownership) {
        let err = ApplyError::OwnershipConflict { object };
        warn!("Refusing to update {}: {:?} ownership", object_key(&required), ownership);
        report_update_failure(events, &required, err.to_string()).await;
        return Err(err);
    }

    if read_hash_annotation(existing.as_ref())
        .is_some_and(|h| ObjectHasher::hashes_match(h, &required_hash))
    {
        debug!("{} {} is up to date", K::kind(&()), object_key(&required));
        return Ok(Applied::unchanged(existing.as_ref().clone()));
    }

    let body = build_update(&required, existing.as_ref());
    match ctx.run(client.update(&body)).await {
        Ok(updated) => {
            info!("Updated {} {}", K::kind(&()), object_key(&updated));
            events
                .publish(
                    &object_reference(&updated),
                    EventRecord::normal(
                        format!("{}Updated", K::kind(&())),
                        format!("{} {} updated", K::kind(&()), object_key(&updated)),
                    ),
                )
                .await;
            Ok(Applied::changed(updated))
        }
        Err(source) => {
            report_update_failure(events, &required, source.to_string()).await;
            if source.is_not_found() {
                Err(ApplyError::NotFoundOnUpdate { object, source })
            } else {
                Err(ApplyError::Update { object, source })
            }
        }
    }
}

fn validate<K: ApplyObject>(
    required: &K,
    object: &str,
    options: ApplyOptions,
) -> Result<(), ApplyError> {
    let meta = required.meta();
    let invalid = |message: &str| ApplyError::InvalidObject {
        object: object.to_string(),
        message: message.to_string(),
    };

    if meta.name.as_deref().is_none_or(str::is_empty) {
        return Err(invalid("name must be set"));
    }
    if K::NAMESPACED && meta.namespace.as_deref().is_none_or(str::is_empty) {
        return Err(invalid("namespace must be set"));
    }
    let controllers = meta
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.controller == Some(true))
        .count();
    if controllers > 1 {
        return Err(invalid("must have at most one controller reference"));
    }
    if !options.allow_missing_controller_ref && controller_ref(meta).is_none() {
        return Err(ApplyError::MissingControllerRef {
            object: object.to_string(),
        });
    }
    Ok(())
}

async fn create<K, C, E>(
    ctx: &ApplyContext,
    client: &C,
    events: &E,
    required: &K,
    object: String,
) -> Result<Applied<K>, ApplyError>
where
    K: ApplyObject,
    C: ObjectClient<K> + ?Sized,
    E: EventSink + ?Sized,
{
    let kind = K::kind(&());
    let key = object_key(required);

    match ctx.run(client.create(required)).await {
        Ok(created) => {
            info!("Created {} {}", kind, key);
            events
                .publish(
                    &object_reference(&created),
                    EventRecord::normal(format!("{kind}Created"), format!("{kind} {key} created")),
                )
                .await;
            Ok(Applied::changed(created))
        }
        Err(source) => {
            events
                .publish(
                    &object_reference(required),
                    EventRecord::warning(
                        format!("Create{kind}Failed"),
                        format!("Failed to create {kind} {key}: {source}"),
                    ),
                )
                .await;
            Err(ApplyError::Create { object, source })
        }
    }
}

/// Builds the create body: the desired object without removal keys.
fn build_create<K: ApplyObject>(required: &K) -> K {
    let mut body = required.clone();
    let meta = body.meta_mut();
    meta.labels = merge_managed(None, meta.labels.as_ref(), &BTreeSet::new());
    meta.annotations = merge_managed(None, meta.annotations.as_ref(), &BTreeSet::new());
    body
}

/// Builds the update body from the desired and the live object.
///
/// Neither input is modified. The body carries the desired content and
/// owner references, the live server state, and labels and annotations
/// merged under the managed-key policy.
fn build_update<K: ApplyObject>(required: &K, existing: &K) -> K {
    let mut body = required.clone();
    let live = existing.meta();
    let previously_managed =
        ManagedKeys::recorded(live).unwrap_or_else(|| ManagedKeys::of(required.meta()));

    let meta = body.meta_mut();
    if meta.resource_version.is_none() {
        meta.resource_version.clone_from(&live.resource_version);
    }
    meta.uid.clone_from(&live.uid);
    meta.creation_timestamp.clone_from(&live.creation_timestamp);
    meta.generation = live.generation;
    meta.deletion_timestamp.clone_from(&live.deletion_timestamp);
    meta.deletion_grace_period_seconds = live.deletion_grace_period_seconds;
    meta.managed_fields.clone_from(&live.managed_fields);
    if meta.finalizers.is_none() {
        meta.finalizers.clone_from(&live.finalizers);
    }

    meta.labels = merge_managed(
        live.labels.as_ref(),
        required.meta().labels.as_ref(),
        &previously_managed.labels,
    );
    meta.annotations = merge_managed(
        live.annotations.as_ref(),
        required.meta().annotations.as_ref(),
        &previously_managed.annotations,
    );

    body.carry_server_state(existing);
    body
}

async fn report_update_failure<K, E>(events: &E, required: &K, cause: String)
where
    K: ApplyObject,
    E: EventSink + ?Sized,
{
    let kind = K::kind(&());
    events
        .publish(
            &object_reference(required),
            EventRecord::warning(
                format!("Update{kind}Failed"),
                format!("Failed to update {kind} {}: {cause}", object_key(required)),
            ),
        )
        .await;
}
