//! Workload rollout readiness
//!
//! A synchronous poll: read the live workload once and report whether its
//! last requested rollout has converged. Waiting is the caller's job; a
//! pass that sees `false` stops and is re-run later.

use converge_common::kube_utils::{find_true_condition, HasConditionFields, CONDITION_REPLICA_FAILURE};
use converge_common::Error;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use crate::context::ReconcileContext;
use crate::kind::{ManagedObject, ResourceKind};

/// Whether the workload controller has acted on the latest spec.
///
/// Until it has, the status fields describe the previous rollout.
fn generation_observed(meta: &ObjectMeta, observed: Option<i64>) -> bool {
    let Some(generation) = meta.generation else {
        return true;
    };
    let observed = observed.unwrap_or(0);
    if observed < generation {
        debug!(generation, observed, "spec change not yet observed");
        return false;
    }
    true
}

/// Ordinal-set rollout: every replica on the update revision and ready
fn statefulset_converged(sts: &StatefulSet) -> bool {
    let Some(status) = sts.status.as_ref() else {
        return false;
    };
    if !generation_observed(&sts.metadata, status.observed_generation) {
        return false;
    }
    if status.current_revision != status.update_revision {
        debug!(
            current = status.current_revision.as_deref().unwrap_or_default(),
            update = status.update_revision.as_deref().unwrap_or_default(),
            "revision rollout in progress"
        );
        return false;
    }
    let current = status.current_replicas.unwrap_or(0);
    let ready = status.ready_replicas.unwrap_or(0);
    if current != ready {
        debug!(current, ready, "replicas not ready");
        return false;
    }
    true
}

/// Replica-set rollout: a replica failure is an error, otherwise ready == desired
fn deployment_converged(deployment: &Deployment) -> Result<bool, Error> {
    let name = deployment.metadata.name.as_deref().unwrap_or_default();
    let Some(status) = deployment.status.as_ref() else {
        return Ok(false);
    };

    if let Some(failure) =
        find_true_condition(status.conditions.as_deref(), CONDITION_REPLICA_FAILURE)
    {
        let reason = failure
            .reason_field()
            .or(failure.message.as_deref())
            .unwrap_or(CONDITION_REPLICA_FAILURE);
        return Err(Error::rollout_failed(name, reason));
    }

    if !generation_observed(&deployment.metadata, status.observed_generation) {
        return Ok(false);
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    if ready != desired {
        debug!(ready, desired, "replicas not ready");
        return Ok(false);
    }
    Ok(true)
}

/// Evaluate the rollout state of a live workload object.
///
/// # Errors
///
/// Returns [`Error::RolloutFailed`] when a Deployment carries a
/// `ReplicaFailure` condition, and an internal error for non-workload kinds.
pub fn rollout_converged(live: &ManagedObject) -> Result<bool, Error> {
    match live {
        ManagedObject::StatefulSet(sts) => Ok(statefulset_converged(sts)),
        ManagedObject::Deployment(deployment) => deployment_converged(deployment),
        other => Err(Error::internal_with_context(
            "rollout",
            format!("{} is not a workload", other.display_name()),
        )),
    }
}

/// Fetch a workload and report whether its rollout has converged.
///
/// A workload that does not exist yet has nothing converged.
pub async fn is_fully_deployed(
    ctx: &ReconcileContext,
    kind: ResourceKind,
    name: &str,
) -> Result<bool, Error> {
    match ctx.get(kind, name).await? {
        Some(live) => rollout_converged(&live),
        None => {
            debug!(kind = %kind, name, "workload not found");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{
        DeploymentCondition, DeploymentSpec, DeploymentStatus, StatefulSetStatus,
    };
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn statefulset(current_rev: &str, update_rev: &str, current: i32, ready: i32) -> ManagedObject {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("historical".to_string()),
                ..Default::default()
            },
            status: Some(StatefulSetStatus {
                current_revision: Some(current_rev.to_string()),
                update_revision: Some(update_rev.to_string()),
                current_replicas: Some(current),
                ready_replicas: Some(ready),
                replicas: current,
                ..Default::default()
            }),
            ..Default::default()
        }
        .into()
    }

    fn deployment(replicas: i32, ready: i32, conditions: Vec<DeploymentCondition>) -> ManagedObject {
        Deployment {
            metadata: ObjectMeta {
                name: Some("broker".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                replicas: Some(replicas),
                conditions: Some(conditions),
                ..Default::default()
            }),
        }
        .into()
    }

    fn replica_failure(reason: &str) -> DeploymentCondition {
        DeploymentCondition {
            type_: CONDITION_REPLICA_FAILURE.to_string(),
            status: "True".to_string(),
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn statefulset_mid_revision_is_pending() {
        let result = rollout_converged(&statefulset("rev-1", "rev-2", 3, 3));
        assert!(!result.expect("no error while pending"));
    }

    #[test]
    fn statefulset_with_unready_replicas_is_pending() {
        let result = rollout_converged(&statefulset("rev-2", "rev-2", 3, 2));
        assert!(!result.expect("no error while pending"));
    }

    #[test]
    fn statefulset_on_one_revision_and_ready_is_converged() {
        assert!(rollout_converged(&statefulset("rev-2", "rev-2", 3, 3)).expect("ok"));
    }

    #[test]
    fn statefulset_without_status_is_pending() {
        let sts: ManagedObject = StatefulSet::default().into();
        assert!(!rollout_converged(&sts).expect("ok"));
    }

    #[test]
    fn deployment_replica_failure_is_an_error_with_reason() {
        let obj = deployment(3, 1, vec![replica_failure("FailedCreate")]);
        let err = rollout_converged(&obj).expect_err("replica failure");
        match &err {
            Error::RolloutFailed { workload, reason } => {
                assert_eq!(workload, "broker");
                assert_eq!(reason, "FailedCreate");
            }
            other => panic!("Expected RolloutFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("FailedCreate"));
    }

    #[test]
    fn deployment_ready_matches_desired() {
        assert!(rollout_converged(&deployment(3, 3, vec![])).expect("ok"));
        assert!(!rollout_converged(&deployment(3, 2, vec![])).expect("ok"));
    }

    #[test]
    fn unobserved_generation_is_pending_even_when_ready() {
        let mut obj = deployment(3, 3, vec![]);
        if let ManagedObject::Deployment(d) = &mut obj {
            d.metadata.generation = Some(4);
            if let Some(status) = d.status.as_mut() {
                status.observed_generation = Some(3);
            }
        }
        assert!(!rollout_converged(&obj).expect("ok"));

        let mut sts = statefulset("rev-1", "rev-1", 3, 3);
        if let ManagedObject::StatefulSet(s) = &mut sts {
            s.metadata.generation = Some(2);
        }
        assert!(!rollout_converged(&sts).expect("ok"));
    }

    #[test]
    fn observed_generation_lets_readiness_decide() {
        let mut obj = deployment(3, 3, vec![]);
        if let ManagedObject::Deployment(d) = &mut obj {
            d.metadata.generation = Some(4);
            if let Some(status) = d.status.as_mut() {
                status.observed_generation = Some(4);
            }
        }
        assert!(rollout_converged(&obj).expect("ok"));
    }

    #[test]
    fn non_workloads_are_rejected() {
        let cm: ManagedObject = ConfigMap::default().into();
        assert!(rollout_converged(&cm).is_err());
    }
}
