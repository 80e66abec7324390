//! Kubernetes helper functions shared by the converge crates

use std::collections::BTreeMap;

/// Status value for a true condition
pub const STATUS_TRUE: &str = "True";

/// Deployment condition type reporting pods that could not be created
pub const CONDITION_REPLICA_FAILURE: &str = "ReplicaFailure";

/// Check whether a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Render a label map as an equality-based selector string (`a=1,b=2`).
///
/// Keys come out in `BTreeMap` order so the selector is stable across passes.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` contains every pair in `selector`
pub fn labels_match(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    let Some(labels) = labels else {
        return selector.is_empty();
    };
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
}

/// Trait for types that have condition-like fields (type, status, reason)
pub trait HasConditionFields {
    /// Get the condition type field value
    fn type_field(&self) -> &str;
    /// Get the condition status field value
    fn status_field(&self) -> &str;
    /// Get the machine-readable reason, if any
    fn reason_field(&self) -> Option<&str>;
}

impl HasConditionFields for k8s_openapi::api::apps::v1::DeploymentCondition {
    fn type_field(&self) -> &str {
        &self.type_
    }
    fn status_field(&self) -> &str {
        &self.status
    }
    fn reason_field(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Find the first condition of the given type whose status is "True"
pub fn find_true_condition<'a, T>(conditions: Option<&'a [T]>, condition_type: &str) -> Option<&'a T>
where
    T: HasConditionFields,
{
    conditions?
        .iter()
        .find(|c| c.type_field() == condition_type && c.status_field() == STATUS_TRUE)
}
