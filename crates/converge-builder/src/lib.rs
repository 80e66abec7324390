//! Reconciliation protocol for operators that manage a fixed catalog of
//! Kubernetes resource kinds on behalf of a custom resource.
//!
//! A pass builds the desired objects for one owner, writes each one only
//! when its content hash differs from the live copy, waits for workload
//! rollouts before moving on, and finally deletes labelled resources that the
//! owner no longer declares.

pub mod client;
pub mod context;
pub mod engine;
pub mod hash;
pub mod inventory;
pub mod kind;
pub mod owner;
pub mod reconciler;
pub mod resources;
pub mod rollout;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClusterClient, KubeClusterClient};
pub use context::ReconcileContext;
pub use converge_common::{Error, Result};
pub use engine::{create_or_update, OperationResult};
pub use hash::{compute_config_hashes, HashHolder};
pub use inventory::{sweep, ResourceInventory};
pub use kind::{ManagedObject, ResourceKind};
pub use owner::Owner;
pub use reconciler::{reconcile, Declaration, PassOutcome, ResourceResult};
pub use resources::{
    ConfigResource, DesiredState, NetworkPolicyResource, ServiceResource, StorageResource,
    WorkloadKind, WorkloadResource,
};
pub use rollout::{is_fully_deployed, rollout_converged};
