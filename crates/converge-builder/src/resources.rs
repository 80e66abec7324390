//! Desired-state builders, one per managed kind
//!
//! Each declaration type turns operator configuration into a Kubernetes
//! object for one owner. Metadata is uniform: name from the declaration,
//! namespace from the owner, and the owner's selector labels merged over the
//! declaration's own labels so every managed object is visible to the sweep.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Service, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicySpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::hash::HashHolder;
use crate::kind::{ManagedObject, ResourceKind};
use crate::owner::Owner;

/// Pod label identifying which workload a pod belongs to
pub const WORKLOAD_LABEL: &str = "converge.io/workload";

/// A declaration that can produce the desired object for an owner
pub trait DesiredState {
    /// Kind of the object produced
    fn kind(&self) -> ResourceKind;

    /// Name of the object produced
    fn name(&self) -> &str;

    /// Build the desired object
    fn build(&self, owner: &Owner) -> ManagedObject;
}

fn object_meta(owner: &Owner, name: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    let mut merged = labels.clone();
    merged.extend(
        owner
            .labels()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(owner.namespace().to_string()),
        labels: (!merged.is_empty()).then_some(merged),
        ..Default::default()
    }
}

// =============================================================================
// Config
// =============================================================================

/// A configuration object; its content hash is injected into every workload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigResource {
    /// Object name
    pub name: String,
    /// Configuration data
    pub data: BTreeMap<String, String>,
    /// Extra labels
    pub labels: BTreeMap<String, String>,
}

impl ConfigResource {
    /// Declare a config object
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a data entry
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl DesiredState for ConfigResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ConfigMap
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, owner: &Owner) -> ManagedObject {
        ConfigMap {
            metadata: object_meta(owner, &self.name, &self.labels),
            data: Some(self.data.clone()),
            ..Default::default()
        }
        .into()
    }
}

// =============================================================================
// Storage
// =============================================================================

/// A storage claim
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageResource {
    /// Object name
    pub name: String,
    /// Claim spec
    pub spec: PersistentVolumeClaimSpec,
    /// Extra labels
    pub labels: BTreeMap<String, String>,
}

impl StorageResource {
    /// Declare a storage claim
    pub fn new(name: impl Into<String>, spec: PersistentVolumeClaimSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            labels: BTreeMap::new(),
        }
    }

    fn claim(&self, owner: &Owner) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: object_meta(owner, &self.name, &self.labels),
            spec: Some(self.spec.clone()),
            ..Default::default()
        }
    }
}

impl DesiredState for StorageResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PersistentVolumeClaim
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, owner: &Owner) -> ManagedObject {
        self.claim(owner).into()
    }
}

// =============================================================================
// Workload
// =============================================================================

/// Rollout style of a workload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Interchangeable replicas (Deployment)
    #[default]
    ReplicaSet,
    /// Stable per-replica identity, ordered rollout (StatefulSet)
    Ordinal,
}

/// A workload: Deployment or StatefulSet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadResource {
    /// Object name
    pub name: String,
    /// Rollout style
    pub kind: WorkloadKind,
    /// Desired replica count
    pub replicas: i32,
    /// Pod spec
    pub pod_spec: PodSpec,
    /// Governing service for ordinal workloads
    pub service_name: Option<String>,
    /// Per-replica claims for ordinal workloads
    pub volume_claim_templates: Vec<StorageResource>,
    /// Extra labels on the workload object
    pub labels: BTreeMap<String, String>,
}

impl WorkloadResource {
    /// Declare a workload
    pub fn new(name: impl Into<String>, kind: WorkloadKind, pod_spec: PodSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            replicas: 1,
            pod_spec,
            ..Default::default()
        }
    }

    /// Set the replica count
    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the governing service name
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Add a per-replica claim template
    pub fn with_volume_claim_template(mut self, claim: StorageResource) -> Self {
        self.volume_claim_templates.push(claim);
        self
    }

    /// Labels shared by the selector and the pod template
    pub fn pod_labels(&self, owner: &Owner) -> BTreeMap<String, String> {
        let mut labels = owner.labels().clone();
        labels.insert(WORKLOAD_LABEL.to_string(), self.name.clone());
        labels
    }

    /// Build the workload with config hashes injected into every container.
    ///
    /// A changed config changes an environment value, which changes the pod
    /// template and with it the workload's own hash.
    pub fn build_with_hashes(&self, owner: &Owner, hashes: &[HashHolder]) -> ManagedObject {
        let pod_labels = self.pod_labels(owner);
        let mut pod_spec = self.pod_spec.clone();
        inject_config_hashes(&mut pod_spec, hashes);

        let selector = LabelSelector {
            match_labels: Some(pod_labels.clone()),
            ..Default::default()
        };
        let template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(pod_labels),
                ..Default::default()
            }),
            spec: Some(pod_spec),
        };
        let metadata = object_meta(owner, &self.name, &self.labels);

        match self.kind {
            WorkloadKind::ReplicaSet => Deployment {
                metadata,
                spec: Some(DeploymentSpec {
                    replicas: Some(self.replicas),
                    selector,
                    template,
                    ..Default::default()
                }),
                ..Default::default()
            }
            .into(),
            WorkloadKind::Ordinal => {
                let claims: Vec<PersistentVolumeClaim> = self
                    .volume_claim_templates
                    .iter()
                    .map(|c| c.claim(owner))
                    .collect();
                StatefulSet {
                    metadata,
                    spec: Some(StatefulSetSpec {
                        replicas: Some(self.replicas),
                        selector,
                        service_name: self.service_name.clone().unwrap_or_default(),
                        template,
                        volume_claim_templates: (!claims.is_empty()).then_some(claims),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
                .into()
            }
        }
    }
}

impl DesiredState for WorkloadResource {
    fn kind(&self) -> ResourceKind {
        match self.kind {
            WorkloadKind::ReplicaSet => ResourceKind::Deployment,
            WorkloadKind::Ordinal => ResourceKind::StatefulSet,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, owner: &Owner) -> ManagedObject {
        self.build_with_hashes(owner, &[])
    }
}

/// Set one environment entry per hash holder on every container.
///
/// An existing entry with the same name is overwritten in place, so
/// repeated injection never duplicates variables.
pub fn inject_config_hashes(pod_spec: &mut PodSpec, hashes: &[HashHolder]) {
    for container in &mut pod_spec.containers {
        let env = container.env.get_or_insert_with(Vec::new);
        for holder in hashes {
            match env.iter_mut().find(|e| e.name == holder.name) {
                Some(existing) => {
                    existing.value = Some(holder.hash_value.clone());
                    existing.value_from = None;
                }
                None => env.push(EnvVar {
                    name: holder.name.clone(),
                    value: Some(holder.hash_value.clone()),
                    value_from: None,
                }),
            }
        }
    }
}

// =============================================================================
// Network
// =============================================================================

/// A network service
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceResource {
    /// Object name
    pub name: String,
    /// Service spec; its selector is replaced by `selector_labels`
    pub spec: ServiceSpec,
    /// Pod labels the service selects
    pub selector_labels: BTreeMap<String, String>,
    /// Extra labels
    pub labels: BTreeMap<String, String>,
}

impl ServiceResource {
    /// Declare a service
    pub fn new(
        name: impl Into<String>,
        spec: ServiceSpec,
        selector_labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            selector_labels,
            labels: BTreeMap::new(),
        }
    }
}

impl DesiredState for ServiceResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, owner: &Owner) -> ManagedObject {
        let mut spec = self.spec.clone();
        spec.selector = Some(self.selector_labels.clone());
        Service {
            metadata: object_meta(owner, &self.name, &self.labels),
            spec: Some(spec),
            ..Default::default()
        }
        .into()
    }
}

/// A network policy
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkPolicyResource {
    /// Object name
    pub name: String,
    /// Policy spec
    pub spec: NetworkPolicySpec,
    /// Extra labels
    pub labels: BTreeMap<String, String>,
}

impl NetworkPolicyResource {
    /// Declare a network policy
    pub fn new(name: impl Into<String>, spec: NetworkPolicySpec) -> Self {
        Self {
            name: name.into(),
            spec,
            labels: BTreeMap::new(),
        }
    }
}

impl DesiredState for NetworkPolicyResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::NetworkPolicy
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, owner: &Owner) -> ManagedObject {
        NetworkPolicy {
            metadata: object_meta(owner, &self.name, &self.labels),
            spec: Some(self.spec.clone()),
            ..Default::default()
        }
        .into()
    }
}
