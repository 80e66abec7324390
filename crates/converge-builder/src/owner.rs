//! The custom resource on whose behalf a pass runs

use std::collections::BTreeMap;

use converge_common::{Error, OperatorConfig};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Identity of the owning custom resource.
///
/// Carries the controller owner reference stamped on every managed object,
/// the object reference events are published against, and the label set that
/// scopes list and sweep operations.
#[derive(Clone, Debug, PartialEq)]
pub struct Owner {
    reference: OwnerReference,
    object_ref: ObjectReference,
    namespace: String,
    generation: i64,
    labels: BTreeMap<String, String>,
}

impl Owner {
    /// Build an owner from its raw identity fields
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let reference = OwnerReference {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            controller: Some(true),
            block_owner_deletion: None,
        };
        let namespace = namespace.into();
        let object_ref = ObjectReference {
            api_version: Some(reference.api_version.clone()),
            kind: Some(reference.kind.clone()),
            name: Some(reference.name.clone()),
            namespace: Some(namespace.clone()),
            uid: Some(reference.uid.clone()),
            ..Default::default()
        };
        Self {
            reference,
            object_ref,
            namespace,
            generation: 1,
            labels: BTreeMap::new(),
        }
    }

    /// Build an owner from a namespaced custom resource fetched from the API
    ///
    /// # Errors
    ///
    /// Returns an internal error when the resource has no uid or namespace,
    /// which only happens for objects that were never persisted.
    pub fn from_resource<K>(resource: &K, labels: BTreeMap<String, String>) -> Result<Self, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let name = resource.name_any();
        let uid = resource.uid().ok_or_else(|| {
            Error::internal_with_context("owner", format!("{} has no uid", name))
        })?;
        let namespace = resource.namespace().ok_or_else(|| {
            Error::internal_with_context("owner", format!("{} has no namespace", name))
        })?;

        let mut owner = Self::new(
            K::api_version(&()),
            K::kind(&()),
            name,
            uid,
            namespace,
        )
        .with_generation(resource.meta().generation.unwrap_or(1))
        .with_labels(labels);
        owner.object_ref = resource.object_ref(&());
        Ok(owner)
    }

    /// Set the observed generation
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    /// Set the label set stamped on, and used to select, managed resources
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Add a single selector label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Owner reference appended to managed objects
    pub fn reference(&self) -> &OwnerReference {
        &self.reference
    }

    /// Reference events are published against
    pub fn object_ref(&self) -> &ObjectReference {
        &self.object_ref
    }

    /// Owner name
    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Owner kind
    pub fn kind(&self) -> &str {
        &self.reference.kind
    }

    /// Namespace managed resources are created in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Generation of the custom resource this pass was triggered by
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Selector labels
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Selector labels, required to be non-empty.
    ///
    /// An empty selector matches every object in the namespace, so anything
    /// that lists or deletes by selector must go through this accessor.
    pub fn selector(&self) -> Result<&BTreeMap<String, String>, Error> {
        if self.labels.is_empty() {
            return Err(Error::internal_with_context(
                "selector",
                format!("{}/{} has no selector labels", self.kind(), self.name()),
            ));
        }
        Ok(&self.labels)
    }

    /// Annotation key holding the content hash, e.g. `DruidOperatorHash`
    pub fn hash_annotation_key(&self) -> String {
        OperatorConfig::hash_annotation_key(self.kind())
    }
}
