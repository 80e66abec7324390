//! Per-pass reconciliation context
//!
//! A [`ReconcileContext`] is built fresh for every pass of one owner and is
//! threaded by reference through every step. It owns the pass-scoped
//! inventory and wraps each remote call so that
//!
//! - the call is abandoned as soon as the pass is cancelled, and
//! - mutations and failed reads are reported as events on the owner.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use converge_common::events::{actions, object_note, reasons, EventPublisher};
use converge_common::Error;
use kube::runtime::events::EventType;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::ClusterClient;
use crate::inventory::ResourceInventory;
use crate::kind::{ManagedObject, ResourceKind};
use crate::owner::Owner;

/// State shared by every step of one reconciliation pass
pub struct ReconcileContext {
    /// Orchestration API client
    pub client: Arc<dyn ClusterClient>,
    /// Event sink for the owning custom resource
    pub events: Arc<dyn EventPublisher>,
    /// The custom resource being reconciled
    pub owner: Owner,
    /// Controller name used as the event reason prefix
    pub controller_name: String,
    /// Cancels every in-flight and future remote call of the pass
    pub cancel: CancellationToken,
    /// Names declared so far in this pass
    pub inventory: ResourceInventory,
}

impl ReconcileContext {
    /// Create a context for a new pass with an empty inventory
    pub fn new(
        client: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        owner: Owner,
        controller_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            events,
            owner,
            controller_name: controller_name.into(),
            cancel: CancellationToken::new(),
            inventory: ResourceInventory::new(),
        }
    }

    /// Bind the pass to a caller-supplied cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Race a remote call against cancellation of the pass
    pub async fn guarded<T, F>(&self, operation: &str, call: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            result = call => result,
        }
    }

    /// Fetch the live copy of a managed object, reporting failures
    pub async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error> {
        let namespace = self.owner.namespace();
        let operation = format!("get {}/{}", kind, name);
        let result = self
            .guarded(&operation, self.client.get(kind, namespace, name))
            .await;
        if let Err(e) = &result {
            self.report_failure(reasons::GET_FAIL, actions::GET, kind, name, e)
                .await;
        }
        result
    }

    /// Create a managed object, reporting the outcome
    pub async fn create(&self, desired: &ManagedObject) -> Result<ManagedObject, Error> {
        let operation = format!("create {}", desired.display_name());
        let result = self
            .guarded(&operation, self.client.create(desired))
            .await;
        match &result {
            Ok(_) => {
                info!(object = %desired.display_name(), "created");
                self.report_success(
                    reasons::CREATE_SUCCESS,
                    actions::CREATE,
                    desired.kind(),
                    desired.name(),
                )
                .await;
            }
            Err(e) => {
                self.report_failure(
                    reasons::CREATE_FAIL,
                    actions::CREATE,
                    desired.kind(),
                    desired.name(),
                    e,
                )
                .await;
            }
        }
        result
    }

    /// Replace a managed object, reporting the outcome
    pub async fn update(&self, desired: &ManagedObject) -> Result<ManagedObject, Error> {
        let operation = format!("update {}", desired.display_name());
        let result = self
            .guarded(&operation, self.client.update(desired))
            .await;
        match &result {
            Ok(_) => {
                info!(object = %desired.display_name(), "updated");
                self.report_success(
                    reasons::UPDATE_SUCCESS,
                    actions::UPDATE,
                    desired.kind(),
                    desired.name(),
                )
                .await;
            }
            Err(e) => {
                self.report_failure(
                    reasons::UPDATE_FAIL,
                    actions::UPDATE,
                    desired.kind(),
                    desired.name(),
                    e,
                )
                .await;
            }
        }
        result
    }

    /// Delete a managed object, reporting the outcome
    pub async fn delete(&self, kind: ResourceKind, name: &str) -> Result<(), Error> {
        let operation = format!("delete {}/{}", kind, name);
        let result = self
            .guarded(
                &operation,
                self.client.delete(kind, self.owner.namespace(), name),
            )
            .await;
        match &result {
            Ok(()) => {
                info!(kind = %kind, name, "deleted orphaned resource");
                self.report_success(reasons::DELETE_SUCCESS, actions::DELETE, kind, name)
                    .await;
            }
            Err(e) => {
                self.report_failure(reasons::DELETE_FAIL, actions::DELETE, kind, name, e)
                    .await;
            }
        }
        result
    }

    /// List live objects of a kind carrying the owner's labels
    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<ManagedObject>, Error> {
        let operation = format!("list {}", kind);
        let labels: &BTreeMap<String, String> = self.owner.labels();
        let result = self
            .guarded(
                &operation,
                self.client.list(kind, self.owner.namespace(), labels),
            )
            .await;
        if let Err(e) = &result {
            self.report_failure(reasons::LIST_FAIL, actions::LIST, kind, "", e)
                .await;
        }
        result
    }

    async fn report_success(&self, suffix: &str, action: &str, kind: ResourceKind, name: &str) {
        let note = object_note(name, self.owner.namespace(), kind.as_str(), None);
        self.events
            .publish(
                self.owner.object_ref(),
                EventType::Normal,
                &reasons::for_controller(&self.controller_name, suffix),
                action,
                Some(note),
            )
            .await;
    }

    async fn report_failure(
        &self,
        suffix: &str,
        action: &str,
        kind: ResourceKind,
        name: &str,
        error: &Error,
    ) {
        warn!(kind = %kind, name, action, error = %error, "remote call failed");
        // The pass is being torn down; publishing would be one more remote call
        if error.is_cancelled() {
            return;
        }
        let note = object_note(
            name,
            self.owner.namespace(),
            kind.as_str(),
            Some(&error.to_string()),
        );
        self.events
            .publish(
                self.owner.object_ref(),
                EventType::Warning,
                &reasons::for_controller(&self.controller_name, suffix),
                action,
                Some(note),
            )
            .await;
    }
}
