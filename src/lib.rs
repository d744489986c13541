// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![warn(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # kubeconverge
//!
//! A declarative, idempotent apply engine and sync orchestration for
//! Kubernetes operators.
//!
//! ## Overview
//!
//! An operator reconciles a parent object into a set of child objects
//! (services, endpoints, secrets, service accounts, config maps, pods,
//! volume claims, namespaces). This crate provides the pieces every such
//! controller pass needs:
//!
//! - Converging one child to its desired form, with ownership protection
//!   and hash-based change detection
//! - Pruning children that are no longer desired before applying new ones
//! - Reporting partial progress as status conditions
//!
//! ## Architecture
//!
//! 1. **Desired state**: computed from the parent, without I/O
//! 2. **Observed state**: read from a watch-fed cache
//! 3. **Apply**: create, update or leave alone, depending on ownership and
//!    the hash of the desired form
//!
//! ## Modules
//!
//! - [`hash`]: Hash annotation of desired objects
//! - [`ownership`]: Controller reference checks
//! - [`apply`]: The apply engine and its per-kind entry points
//! - [`sync`]: Prune-then-apply passes and status conditions
//! - [`store`]: Cluster store seams, in-memory and Kubernetes backends
//! - [`events`]: Event recording
//! - [`config`]: Operator configuration
//!
//! ## Example
//!
//! ```yaml
//! controller:
//!   name: scylla-operator
//!   request_timeout_secs: 30
//!
//! kinds:
//!   ServiceAccount:
//!     force_ownership: true
//!
//! logging:
//!   json: true
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod apply;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod hash;
pub mod naming;
pub mod ownership;
pub mod registry;
pub mod store;
pub mod sync;
pub mod telemetry;

// ============================================================================
// Re-exports
// ============================================================================

pub use apply::{Applied, ApplyObject, ApplyOptions, apply};
pub use config::{ConfigParser, ConfigValidator, OperatorConfig};
pub use context::ApplyContext;
pub use error::{ApplyError, Error, Result, StoreError, SyncError};
pub use events::{EventRecord, EventSink, KubeEventSink, RecordingEventSink};
pub use hash::{ObjectHasher, compute_hash, read_hash_annotation, set_hash_annotation};
pub use ownership::{Ownership, check_ownership, is_controlled_by};
pub use registry::{KindInfo, KindRegistry};
pub use store::{Lister, MemoryCluster, ObjectClient};
pub use sync::{
    ChildSyncer, Condition, KindPolicy, KindSyncer, ParentRef, Reconciler, ReconciliationResult,
    StatusWriter, SyncOutcome, SyncReport, sync_kind, sync_service_accounts,
};
