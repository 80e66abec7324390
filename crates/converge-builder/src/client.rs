//! Orchestration API client used by the engine, the rollout checker and the sweep
//!
//! The trait exposes exactly the verbs a pass needs. `get` reports a missing
//! object as `Ok(None)` so the create path never has to inspect error codes.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use converge_common::kube_utils::{is_not_found, label_selector};
use converge_common::Error;

use crate::kind::{with_object, ManagedObject, ResourceKind};

/// Trait abstracting the orchestration API for managed resources
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a live object, `Ok(None)` when it does not exist
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error>;

    /// Create an object, returning the stored copy
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, Error>;

    /// Replace an object; `metadata.resourceVersion` must match the stored copy
    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, Error>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error>;

    /// List objects of a kind in a namespace carrying every label in `labels`
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, Error>;
}

/// Bind `$T` to the Kubernetes type for `$kind` and evaluate `$body`.
macro_rules! with_kind_type {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            ResourceKind::ConfigMap => {
                type $T = ConfigMap;
                $body
            }
            ResourceKind::PersistentVolumeClaim => {
                type $T = PersistentVolumeClaim;
                $body
            }
            ResourceKind::Deployment => {
                type $T = Deployment;
                $body
            }
            ResourceKind::StatefulSet => {
                type $T = StatefulSet;
                $body
            }
            ResourceKind::Service => {
                type $T = Service;
                $body
            }
            ResourceKind::NetworkPolicy => {
                type $T = NetworkPolicy;
                $body
            }
        }
    };
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create_typed<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = obj.namespace().unwrap_or_default();
        Ok(self
            .api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn replace_typed<K>(&self, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        Ok(self
            .api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await?)
    }

    async fn delete_typed<K>(&self, namespace: &str, name: &str) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                trace!(name, namespace, "object already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_typed<K>(&self, namespace: &str, selector: &str) -> Result<Vec<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let params = ListParams::default().labels(selector);
        Ok(self.api::<K>(namespace).list(&params).await?.items)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error> {
        with_kind_type!(kind, K => Ok(self
            .get_typed::<K>(namespace, name)
            .await?
            .map(ManagedObject::from)))
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, Error> {
        debug!(object = %object.display_name(), "creating");
        with_object!(object, obj => self.create_typed(obj).await.map(ManagedObject::from))
    }

    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, Error> {
        debug!(
            object = %object.display_name(),
            resource_version = object.resource_version().unwrap_or_default(),
            "replacing"
        );
        with_object!(object, obj => self.replace_typed(obj).await.map(ManagedObject::from))
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error> {
        with_kind_type!(kind, K => self.delete_typed::<K>(namespace, name).await)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, Error> {
        let selector = label_selector(labels);
        with_kind_type!(kind, K => Ok(self
            .list_typed::<K>(namespace, &selector)
            .await?
            .into_iter()
            .map(ManagedObject::from)
            .collect()))
    }
}
