//! Reconciliation pass orchestrator
//!
//! A pass applies one owner's declaration in a fixed order:
//!
//! 1. config objects, whose content hashes are collected first
//! 2. storage claims
//! 3. workloads, carrying the config hashes as environment entries and
//!    gated on rollout readiness once the owner is past its first generation;
//!    a workload written in this pass is pending until a later pass sees it
//!    converged
//! 4. services and network policies
//! 5. the sweep of labelled objects the declaration no longer names
//!
//! Every step runs sequentially through one [`ReconcileContext`]. The first
//! error stops the pass; the caller retries the whole pass later, which is
//! safe because every write is hash-gated.

use std::time::Duration;

use converge_common::{Error, OperatorConfig};
use tracing::{debug, info, instrument};

use crate::context::ReconcileContext;
use crate::engine::{attach_owner, create_or_update, OperationResult};
use crate::hash::{compute_config_hashes, HashHolder};
use crate::inventory::sweep;
use crate::kind::{ManagedObject, ResourceKind};
use crate::resources::{
    ConfigResource, DesiredState, NetworkPolicyResource, ServiceResource, StorageResource,
    WorkloadResource,
};
use crate::rollout::is_fully_deployed;

/// Everything one owner asks to exist, in declaration order per kind
#[derive(Clone, Debug, Default)]
pub struct Declaration {
    /// Config objects; their hashes are injected into every workload
    pub configs: Vec<ConfigResource>,
    /// Storage claims
    pub storage: Vec<StorageResource>,
    /// Workloads, rolled out one after another
    pub workloads: Vec<WorkloadResource>,
    /// Services
    pub services: Vec<ServiceResource>,
    /// Network policies
    pub network_policies: Vec<NetworkPolicyResource>,
}

impl Declaration {
    /// Empty declaration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a config object
    pub fn with_config(mut self, config: ConfigResource) -> Self {
        self.configs.push(config);
        self
    }

    /// Add a storage claim
    pub fn with_storage(mut self, storage: StorageResource) -> Self {
        self.storage.push(storage);
        self
    }

    /// Add a workload
    pub fn with_workload(mut self, workload: WorkloadResource) -> Self {
        self.workloads.push(workload);
        self
    }

    /// Add a service
    pub fn with_service(mut self, service: ServiceResource) -> Self {
        self.services.push(service);
        self
    }

    /// Add a network policy
    pub fn with_network_policy(mut self, policy: NetworkPolicyResource) -> Self {
        self.network_policies.push(policy);
        self
    }
}

/// Result of applying one object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceResult {
    /// Kind of the object
    pub kind: ResourceKind,
    /// Name of the object
    pub name: String,
    /// What was done to it
    pub result: OperationResult,
}

/// Summary of a completed pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassOutcome {
    /// Per-object results in application order
    pub results: Vec<ResourceResult>,
    /// Config hashes injected into the workloads
    pub hashes: Vec<HashHolder>,
    /// Objects removed by the sweep
    pub deleted: Vec<(ResourceKind, String)>,
    /// Workload whose rollout was still pending, stopping later workloads
    pub halted_on: Option<String>,
    /// Whether the sweep was skipped because workloads were deferred
    pub sweep_skipped: bool,
}

impl PassOutcome {
    /// Result recorded for one object
    pub fn result_for(&self, kind: ResourceKind, name: &str) -> Option<OperationResult> {
        self.results
            .iter()
            .find(|r| r.kind == kind && r.name == name)
            .map(|r| r.result)
    }

    /// Number of objects created or updated
    pub fn writes(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.result != OperationResult::NoOp)
            .count()
    }

    /// Requeue interval when the pass stopped on a pending rollout
    pub fn requeue_after(&self, config: &OperatorConfig) -> Option<Duration> {
        self.halted_on.as_ref().map(|_| config.reconcile_wait)
    }
}

/// Upsert one object and record it in the pass inventory
async fn apply(
    ctx: &mut ReconcileContext,
    object: ManagedObject,
    outcome: &mut PassOutcome,
) -> Result<OperationResult, Error> {
    let kind = object.kind();
    let name = object.name().to_string();
    let result = create_or_update(ctx, object).await?;
    debug!(kind = %kind, name = %name, result = %result, "applied");
    ctx.inventory.put(name.clone(), kind);
    outcome.results.push(ResourceResult { kind, name, result });
    Ok(result)
}

/// Run one reconciliation pass for the context's owner.
///
/// # Errors
///
/// An owner without selector labels is rejected before any write. Any
/// remote failure, serialization failure, cancellation or workload replica
/// failure stops the pass and is returned. Objects written before the
/// failure stay written.
#[instrument(
    skip_all,
    fields(
        owner = %ctx.owner.name(),
        namespace = %ctx.owner.namespace(),
        generation = ctx.owner.generation()
    )
)]
pub async fn reconcile(
    mut ctx: ReconcileContext,
    declaration: &Declaration,
) -> Result<PassOutcome, Error> {
    ctx.owner.selector()?;
    let mut outcome = PassOutcome::default();
    let key = ctx.owner.hash_annotation_key();

    // Hash the configs exactly as the engine will stamp them
    let mut configs = Vec::with_capacity(declaration.configs.len());
    for config in &declaration.configs {
        let mut object = config.build(&ctx.owner);
        attach_owner(&ctx, &mut object);
        configs.push(object);
    }
    outcome.hashes = compute_config_hashes(&configs, &key)?;

    for object in configs {
        apply(&mut ctx, object, &mut outcome).await?;
    }

    for storage in &declaration.storage {
        let object = storage.build(&ctx.owner);
        apply(&mut ctx, object, &mut outcome).await?;
    }

    let gate_rollouts = ctx.owner.generation() > 1;
    for workload in &declaration.workloads {
        let object = workload.build_with_hashes(&ctx.owner, &outcome.hashes);
        let result = apply(&mut ctx, object, &mut outcome).await?;
        if !gate_rollouts {
            continue;
        }

        // A workload replaced in this pass has not started its new rollout
        let pending = result == OperationResult::Updated
            || !is_fully_deployed(&ctx, workload.kind(), workload.name()).await?;
        if pending {
            info!(
                kind = %workload.kind(),
                workload = %workload.name(),
                "rollout pending, deferring remaining workloads"
            );
            outcome.halted_on = Some(format!("{}/{}", workload.kind(), workload.name()));
            break;
        }
    }

    for service in &declaration.services {
        let object = service.build(&ctx.owner);
        apply(&mut ctx, object, &mut outcome).await?;
    }

    for policy in &declaration.network_policies {
        let object = policy.build(&ctx.owner);
        apply(&mut ctx, object, &mut outcome).await?;
    }

    if outcome.halted_on.is_some() {
        debug!("sweep skipped until deferred workloads are applied");
        outcome.sweep_skipped = true;
    } else {
        outcome.deleted = sweep(&ctx).await?;
    }

    info!(
        writes = outcome.writes(),
        deleted = outcome.deleted.len(),
        halted = outcome.halted_on.is_some(),
        "pass complete"
    );
    Ok(outcome)
}
