//! Event recording.
//!
//! The apply engine reports every create, update and ownership failure as
//! an event against the child object. [`EventSink`] is the seam; the crate
//! ships a recording sink for tests and dry runs and an adapter over the
//! Kubernetes event recorder.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube::Client;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};
use tracing::warn;

use crate::config::ControllerConfig;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Routine progress.
    Normal,
    /// Something went wrong.
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// One event: severity, machine-readable reason and human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Severity.
    pub type_: EventType,
    /// Reason, e.g. `SecretCreated`.
    pub reason: String,
    /// Message, e.g. `Secret default/test created`.
    pub message: String,
}

impl EventRecord {
    /// Creates a normal event.
    #[must_use]
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.type_, self.reason, self.message)
    }
}

/// Destination for events.
///
/// Publishing never fails from the caller's point of view: a sink that
/// cannot deliver an event logs the failure.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes an event about `regarding`.
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord);
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for &T {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        (**self).publish(regarding, event).await;
    }
}

#[async_trait]
impl EventSink for Box<dyn EventSink> {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        (**self).publish(regarding, event).await;
    }
}

/// Builds the object reference an event is attached to.
#[must_use]
pub fn object_reference<K: Resource<DynamicType = ()>>(obj: &K) -> ObjectReference {
    obj.object_ref(&())
}

/// Sink that keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(ObjectReference, EventRecord)>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Returns the recorded events formatted as `"<Type> <Reason> <Message>"`.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(|(_, e)| e.to_string()).collect()
    }

    /// Returns the recorded events together with their object references.
    #[must_use]
    pub fn entries(&self) -> Vec<(ObjectReference, EventRecord)> {
        self.lock().clone()
    }

    /// Drops all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObjectReference, EventRecord)>> {
        // A poisoned lock still holds a valid event list.
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        self.lock().push((regarding.clone(), event));
    }
}

/// Sink that writes events to the cluster through the event recorder.
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    /// Wraps a recorder.
    #[must_use]
    pub const fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }

    /// Creates a sink reporting as the configured controller.
    #[must_use]
    pub fn for_controller(client: Client, controller: &ControllerConfig) -> Self {
        let reporter = Reporter {
            controller: controller.name.clone(),
            instance: controller.instance.clone(),
        };
        Self::new(Recorder::new(client, reporter))
    }
}

impl fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        let type_ = match event.type_ {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        };
        let action = event.reason.clone();

        let result = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason,
                    note: Some(event.message),
                    action,
                    secondary: None,
                },
                regarding,
            )
            .await;

        if let Err(e) = result {
            warn!(
                "Failed to publish event for {}/{}: {}",
                regarding.namespace.as_deref().unwrap_or_default(),
                regarding.name.as_deref().unwrap_or_default(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[tokio::test]
    async fn test_recording_sink_formats_lines() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(String::from("test")),
                namespace: Some(String::from("default")),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        let sink = RecordingEventSink::new();
        let reference = object_reference(&secret);

        sink.publish(
            &reference,
            EventRecord::normal("SecretCreated", "Secret default/test created"),
        )
        .await;
        sink.publish(&reference, EventRecord::warning("UpdateSecretFailed", "boom"))
            .await;

        assert_eq!(
            sink.lines(),
            vec![
                "Normal SecretCreated Secret default/test created",
                "Warning UpdateSecretFailed boom",
            ]
        );
        assert_eq!(sink.entries()[0].0.kind.as_deref(), Some("Secret"));

        sink.clear();
        assert!(sink.events().is_empty());
    }
}
