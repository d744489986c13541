//! Declarative apply engine.
//!
//! This module converges a single child object to its desired form with
//! ownership protection and hash-based change detection.

mod engine;
mod kinds;
mod merge;
mod object;

pub use engine::{Applied, ApplyOptions, apply};
pub use kinds::{
    apply_config_map, apply_endpoints, apply_namespace, apply_persistent_volume_claim, apply_pod,
    apply_secret, apply_service, apply_service_account,
};
pub use merge::merge_managed;
pub use object::{ApplyObject, describe, object_key};
