//! The closed set of resource kinds a converge operator manages
//!
//! Every managed payload travels through the engine as a [`ManagedObject`],
//! one variant per kind, so dispatch happens on the variant rather than on
//! kind strings.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

/// Resource kinds known to the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Configuration object (config-bearing, hashed into workloads)
    ConfigMap,
    /// Storage claim
    PersistentVolumeClaim,
    /// Replica-set-style workload
    Deployment,
    /// Ordinal-set-style workload
    StatefulSet,
    /// Network service
    Service,
    /// Network policy
    NetworkPolicy,
}

impl ResourceKind {
    /// Every kind, in the order a pass applies them
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::ConfigMap,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::Service,
        ResourceKind::NetworkPolicy,
    ];

    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Service => "Service",
            ResourceKind::NetworkPolicy => "NetworkPolicy",
        }
    }

    /// Whether the garbage-collection sweep may delete orphans of this kind.
    ///
    /// Storage claims are never swept: dropping a claim from the declaration
    /// must not destroy the data behind it.
    pub fn is_swept(&self) -> bool {
        !matches!(self, ResourceKind::PersistentVolumeClaim)
    }

    /// Whether the kind is a workload subject to rollout gating
    pub fn is_workload(&self) -> bool {
        matches!(self, ResourceKind::Deployment | ResourceKind::StatefulSet)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired or live resource payload of one of the managed kinds.
///
/// Serializes as the wrapped Kubernetes object (including `apiVersion` and
/// `kind`), which is what the content hash is computed over.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManagedObject {
    /// A ConfigMap
    ConfigMap(ConfigMap),
    /// A PersistentVolumeClaim
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// A Deployment
    Deployment(Deployment),
    /// A StatefulSet
    StatefulSet(StatefulSet),
    /// A Service
    Service(Service),
    /// A NetworkPolicy
    NetworkPolicy(NetworkPolicy),
}

/// Evaluate `$body` with `$obj` bound to the wrapped object of any variant.
macro_rules! with_object {
    ($value:expr, $obj:ident => $body:expr) => {
        match $value {
            ManagedObject::ConfigMap($obj) => $body,
            ManagedObject::PersistentVolumeClaim($obj) => $body,
            ManagedObject::Deployment($obj) => $body,
            ManagedObject::StatefulSet($obj) => $body,
            ManagedObject::Service($obj) => $body,
            ManagedObject::NetworkPolicy($obj) => $body,
        }
    };
}
pub(crate) use with_object;

macro_rules! impl_from_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ManagedObject {
                fn from(obj: $variant) -> Self {
                    ManagedObject::$variant(obj)
                }
            }
        )*
    };
}

impl_from_object!(
    ConfigMap,
    PersistentVolumeClaim,
    Deployment,
    StatefulSet,
    Service,
    NetworkPolicy,
);

impl ManagedObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedObject::ConfigMap(_) => ResourceKind::ConfigMap,
            ManagedObject::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            ManagedObject::Deployment(_) => ResourceKind::Deployment,
            ManagedObject::StatefulSet(_) => ResourceKind::StatefulSet,
            ManagedObject::Service(_) => ResourceKind::Service,
            ManagedObject::NetworkPolicy(_) => ResourceKind::NetworkPolicy,
        }
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        with_object!(self, obj => &obj.metadata)
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        with_object!(self, obj => &mut obj.metadata)
    }

    /// Object name, empty when unset
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, empty when unset
    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Value of a single annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Set an annotation, creating the map if needed
    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// Remove an annotation, dropping the map once it is empty
    pub fn remove_annotation(&mut self, key: &str) {
        let meta = self.meta_mut();
        if let Some(annotations) = meta.annotations.as_mut() {
            annotations.remove(key);
            if annotations.is_empty() {
                meta.annotations = None;
            }
        }
    }

    /// Labels on the object
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    /// Resource version assigned by the API server
    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    /// Short `Kind/name` form for logs and errors
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }
}
