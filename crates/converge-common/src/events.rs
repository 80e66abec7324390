//! Kubernetes Event recording for converge controllers.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that every create, update, delete and failed read of a managed resource
//! shows up on the owning custom resource via `kubectl describe`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The owning custom resource this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "MyCreateObjectFail")
    /// * `action` - What action was taken (e.g. "Create")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher for the given controller name.
    ///
    /// The controller name appears as the "reportingComponent" on Events.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// A published event as captured by [`RecordingEventPublisher`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// Reason code
    pub reason: String,
    /// Action string
    pub action: String,
    /// Human-readable note
    pub note: Option<String>,
}

/// Publisher that keeps every event in memory so tests can assert on them.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reason codes in publication order
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                type_,
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
        }
    }
}

/// Well-known event reason suffixes.
///
/// The reason published on the owner is the controller name followed by one
/// of these, e.g. `DruidCreateObjectFail`.
pub mod reasons {
    /// Managed resource created
    pub const CREATE_SUCCESS: &str = "CreateObjectSuccess";
    /// Create call rejected or failed
    pub const CREATE_FAIL: &str = "CreateObjectFail";
    /// Managed resource updated after a hash change
    pub const UPDATE_SUCCESS: &str = "UpdateObjectSuccess";
    /// Update call rejected or failed
    pub const UPDATE_FAIL: &str = "UpdateObjectFail";
    /// Reading the live resource failed
    pub const GET_FAIL: &str = "GetObjectFail";
    /// Listing live resources for the sweep failed
    pub const LIST_FAIL: &str = "ListObjectFail";
    /// Orphaned resource deleted by the sweep
    pub const DELETE_SUCCESS: &str = "DeleteObjectSuccess";
    /// Deleting an orphaned resource failed
    pub const DELETE_FAIL: &str = "DeleteObjectFail";

    /// Build the full reason code for a controller
    pub fn for_controller(controller: &str, suffix: &str) -> String {
        format!("{controller}{suffix}")
    }
}

/// Well-known event action strings.
pub mod actions {
    /// Creating a managed resource
    pub const CREATE: &str = "Create";
    /// Updating a managed resource
    pub const UPDATE: &str = "Update";
    /// Reading a managed resource
    pub const GET: &str = "Get";
    /// Listing managed resources
    pub const LIST: &str = "List";
    /// Deleting a managed resource
    pub const DELETE: &str = "Delete";
}

/// Format the note attached to a managed-resource event.
///
/// Failures carry the error text in an `Err [..]` suffix.
pub fn object_note(name: &str, namespace: &str, kind: &str, error: Option<&str>) -> String {
    match error {
        Some(err) => format!("Name [{name}], Namespace [{namespace}], Kind [{kind}], Err [{err}]"),
        None => format!("Name [{name}], Namespace [{namespace}], Kind [{kind}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<RecordingEventPublisher>();
    }

    #[test]
    fn reason_codes_are_prefixed_with_controller() {
        assert_eq!(
            reasons::for_controller("Druid", reasons::CREATE_FAIL),
            "DruidCreateObjectFail"
        );
        assert_eq!(
            reasons::for_controller("Druid", reasons::DELETE_SUCCESS),
            "DruidDeleteObjectSuccess"
        );
    }

    #[test]
    fn notes_carry_error_only_on_failure() {
        assert_eq!(
            object_note("app", "ns", "ConfigMap", None),
            "Name [app], Namespace [ns], Kind [ConfigMap]"
        );
        assert_eq!(
            object_note("app", "ns", "ConfigMap", Some("denied")),
            "Name [app], Namespace [ns], Kind [ConfigMap], Err [denied]"
        );
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingEventPublisher::new();
        let obj_ref = ObjectReference::default();
        publisher
            .publish(&obj_ref, EventType::Normal, "ACreate", actions::CREATE, None)
            .await;
        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                "AUpdate",
                actions::UPDATE,
                Some("x".to_string()),
            )
            .await;

        assert_eq!(publisher.reasons(), vec!["ACreate", "AUpdate"]);
        assert_eq!(publisher.events()[1].type_, EventType::Warning);
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Normal,
                reasons::CREATE_SUCCESS,
                actions::CREATE,
                Some("test".to_string()),
            )
            .await;
    }
}
