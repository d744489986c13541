//! Error types for the kubeconverge operator core.
//!
//! This module provides the error hierarchy for every layer of a reconcile
//! pass: configuration, the cluster store, the apply engine, and sync
//! orchestration.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cluster store errors.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Apply engine errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Sync orchestration errors.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Errors returned by the cluster store and its cache.
///
/// Display strings follow the wording of the Kubernetes API server so that
/// they read the same in events whichever backend produced them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist.
    #[error("{resource} \"{name}\" not found")]
    NotFound {
        /// Plural resource name (e.g. `services`).
        resource: String,
        /// Object name.
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists {
        /// Plural resource name.
        resource: String,
        /// Object name.
        name: String,
    },

    /// Optimistic concurrency or precondition failure.
    #[error("Operation cannot be fulfilled on {resource} \"{name}\": {message}")]
    Conflict {
        /// Plural resource name.
        resource: String,
        /// Object name.
        name: String,
        /// Reason reported by the store.
        message: String,
    },

    /// The call context was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The call context deadline passed before the store answered.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The kind is not known to the registry backing the store.
    #[error("no kind \"{kind}\" is registered for version \"{api_version}\"")]
    UnregisteredKind {
        /// API version of the object.
        api_version: String,
        /// Kind of the object.
        kind: String,
    },

    /// Encoding or decoding an object failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The API server could not be reached.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Any other status returned by the API server.
    #[error("{message} ({reason}, {code})")]
    Api {
        /// HTTP status code.
        code: u16,
        /// Machine-readable reason.
        reason: String,
        /// Human-readable message.
        message: String,
    },
}

/// Errors returned by the apply engine.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The desired object carries no controller reference and the call
    /// did not allow it. No store call was made.
    #[error("{object} is missing controllerRef")]
    MissingControllerRef {
        /// Object descriptor.
        object: String,
    },

    /// The existing object is controlled by someone else (or by nobody
    /// while ownership is not forced). Nothing was mutated.
    #[error("{object} isn't controlled by us")]
    OwnershipConflict {
        /// Object descriptor.
        object: String,
    },

    /// The desired object is malformed (missing name or namespace, or
    /// more than one controller reference).
    #[error("{object} is invalid: {message}")]
    InvalidObject {
        /// Object descriptor.
        object: String,
        /// What is wrong with it.
        message: String,
    },

    /// The content hash could not be computed.
    #[error("can't hash {object}: {message}")]
    Hash {
        /// Object descriptor.
        object: String,
        /// Serialization failure.
        message: String,
    },

    /// The create call failed.
    #[error("can't create {object}: {source}")]
    Create {
        /// Object descriptor.
        object: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The object vanished between the cache read and the update call.
    /// The next pass recreates it through the create path.
    #[error("can't update {object}: {source}")]
    NotFoundOnUpdate {
        /// Object descriptor.
        object: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The update call failed.
    #[error("can't update {object}: {source}")]
    Update {
        /// Object descriptor.
        object: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// Errors returned by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// One or more deletions of excess children failed.
    #[error("can't delete {kind}(s): {errors}")]
    Prune {
        /// Child kind.
        kind: String,
        /// Every deletion failure of the pass.
        errors: AggregateError,
    },

    /// Applying a desired child failed.
    #[error("can't apply {kind}: {source}")]
    Apply {
        /// Child kind.
        kind: String,
        /// Apply failure.
        #[source]
        source: ApplyError,
    },

    /// The computed conditions could not be handed to the status writer.
    #[error("can't update status: {source}")]
    Status {
        /// Store failure.
        #[source]
        source: StoreError,
    },

    /// The parent object cannot identify its children.
    #[error("can't reconcile parent: {source}")]
    Parent {
        /// Validation failure of the parent.
        #[source]
        source: ApplyError,
    },

    /// Several kinds failed in one multi-kind pass.
    #[error("{0}")]
    Multiple(AggregateSyncError),
}

/// A set of store errors collected without stopping at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError(pub Vec<StoreError>);

/// A set of sync errors collected across kinds.
#[derive(Debug)]
pub struct AggregateSyncError(pub Vec<SyncError>);

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the scheduler should requeue the parent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Apply(e) => e.is_retryable(),
            Self::Sync(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StoreError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(
        resource: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            resource: resource.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true for a 404 from any backend.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { code: 404, .. })
    }

    /// Returns true when the object already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists { .. } => true,
            Self::Api { code: 409, reason, .. } => reason == "AlreadyExists",
            _ => false,
        }
    }

    /// Returns true on an optimistic concurrency or precondition failure.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Api { code: 409, reason, .. } => reason != "AlreadyExists",
            _ => false,
        }
    }

    /// Returns true if the call was aborted by its context.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns true if requeueing the parent may succeed.
    ///
    /// `AlreadyExists` counts as retryable: the cache has not caught up
    /// with a create yet.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::Conflict { .. }
            | Self::Transport { .. }
            | Self::DeadlineExceeded => true,
            Self::Api { code, .. } => matches!(*code, 404 | 409 | 429 | 500..=599),
            Self::Cancelled | Self::UnregisteredKind { .. } | Self::Serialization { .. } => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api { code: 429, .. } => Some(5),
            Self::Api { code: 500..=599, .. } | Self::Transport { .. } | Self::DeadlineExceeded => {
                Some(2)
            }
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::Conflict { .. } => Some(1),
            _ => None,
        }
    }
}

impl ApplyError {
    /// Returns true for precondition failures detected before any I/O.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingControllerRef { .. } | Self::InvalidObject { .. } | Self::Hash { .. }
        )
    }

    /// Returns true when the existing object belongs to someone else.
    #[must_use]
    pub const fn is_ownership_conflict(&self) -> bool {
        matches!(self, Self::OwnershipConflict { .. })
    }

    /// Returns true when the object disappeared after the cache read.
    #[must_use]
    pub const fn is_not_found_on_update(&self) -> bool {
        matches!(self, Self::NotFoundOnUpdate { .. })
    }

    /// Returns the underlying store error, if any.
    #[must_use]
    pub const fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Create { source, .. }
            | Self::NotFoundOnUpdate { source, .. }
            | Self::Update { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if requeueing the parent may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_retryable)
    }
}

impl SyncError {
    /// Returns true if requeueing the parent may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Prune { errors, .. } => errors.0.iter().all(StoreError::is_retryable),
            Self::Apply { source, .. } => source.is_retryable(),
            Self::Status { source } => source.is_retryable(),
            Self::Parent { .. } => false,
            Self::Multiple(all) => all.0.iter().all(Self::is_retryable),
        }
    }
}

impl AggregateError {
    /// Builds an aggregate from per-attempt results, keeping only failures.
    ///
    /// Returns `None` when every attempt succeeded.
    #[must_use]
    pub fn from_results(results: Vec<std::result::Result<(), StoreError>>) -> Option<Self> {
        let errors: Vec<StoreError> = results
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    /// Number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no error was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{single}");
        }
        write!(f, "[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{err}")?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for AggregateError {}

impl fmt::Display for AggregateSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{single}");
        }
        write!(f, "[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{err}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_messages_match_api_server_wording() {
        let err = StoreError::not_found("services", "test");
        assert_eq!(err.to_string(), "services \"test\" not found");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_api_status_classification() {
        let exists = StoreError::Api {
            code: 409,
            reason: String::from("AlreadyExists"),
            message: String::from("x"),
        };
        assert!(exists.is_already_exists());
        assert!(!exists.is_conflict());

        let throttled = StoreError::Api {
            code: 429,
            reason: String::from("TooManyRequests"),
            message: String::from("slow down"),
        };
        assert!(throttled.is_retryable());
        assert_eq!(throttled.retry_delay_secs(), Some(5));
        assert!(!StoreError::Cancelled.is_retryable());
    }

    #[test]
    fn test_aggregate_display() {
        assert!(AggregateError::from_results(vec![Ok(()), Ok(())]).is_none());

        let single =
            AggregateError::from_results(vec![Ok(()), Err(StoreError::Cancelled)]).unwrap();
        assert_eq!(single.to_string(), "context canceled");

        let many = AggregateError(vec![
            StoreError::not_found("pods", "a"),
            StoreError::DeadlineExceeded,
        ]);
        assert_eq!(
            many.to_string(),
            "[pods \"a\" not found, context deadline exceeded]"
        );
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn test_apply_error_taxonomy() {
        let missing = ApplyError::MissingControllerRef {
            object: String::from("v1, Kind=Secret \"default/test\""),
        };
        assert!(missing.is_validation());
        assert_eq!(
            missing.to_string(),
            "v1, Kind=Secret \"default/test\" is missing controllerRef"
        );

        let vanished = ApplyError::NotFoundOnUpdate {
            object: String::from("v1, Kind=Secret \"default/test\""),
            source: StoreError::not_found("secrets", "test"),
        };
        assert!(vanished.is_not_found_on_update());
        assert!(vanished.is_retryable());
        assert_eq!(
            vanished.to_string(),
            "can't update v1, Kind=Secret \"default/test\": secrets \"test\" not found"
        );
    }
}
