//! Cluster store interfaces and backends.
//!
//! The live store and its watch-fed cache are external collaborators; this
//! module defines the typed seams the engine talks to and ships two
//! backends: an in-memory cluster and a Kubernetes API adapter.

mod client;
mod kubernetes;
mod memory;

pub use client::{DeleteOptions, LabelSelector, Lister, ObjectClient, PropagationPolicy};
pub use kubernetes::{KubeObjectClient, ReflectorLister};
pub use memory::{Action, MemoryClient, MemoryCluster, MemoryLister, Verb};
