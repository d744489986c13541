//! Hand-off of conditions to the component that persists parent status.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::StoreError;

use super::conditions::Condition;
use super::parent::ParentRef;

/// Persists the conditions computed by a pass on the parent's status.
///
/// The sync core never writes parent status itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Stores `conditions` on `parent`.
    async fn write_conditions(
        &self,
        parent: &ParentRef,
        conditions: &[Condition],
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: StatusWriter + ?Sized> StatusWriter for Arc<T> {
    async fn write_conditions(
        &self,
        parent: &ParentRef,
        conditions: &[Condition],
    ) -> Result<(), StoreError> {
        (**self).write_conditions(parent, conditions).await
    }
}

/// Status writer that keeps every write in memory.
#[derive(Debug, Default)]
pub struct RecordingStatusWriter {
    writes: Mutex<Vec<(ParentRef, Vec<Condition>)>>,
}

impl RecordingStatusWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every write, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<(ParentRef, Vec<Condition>)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the conditions of the latest write.
    #[must_use]
    pub fn latest(&self) -> Option<Vec<Condition>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn write_conditions(
        &self,
        parent: &ParentRef,
        conditions: &[Condition],
    ) -> Result<(), StoreError> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((parent.clone(), conditions.to_vec()));
        Ok(())
    }
}
