//! In-memory orchestration API for scenario tests
//!
//! Behaves like the API server for the verbs a pass uses: resource versions
//! are assigned on every write, every replace bumps `metadata.generation`,
//! replace rejects a stale version, deletes of
//! missing objects succeed and lists filter by namespace and labels. Status
//! is never written by clients; tests drive it with the `mark_*` helpers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use converge_common::kube_utils::{labels_match, CONDITION_REPLICA_FAILURE, STATUS_TRUE};
use converge_common::Error;
use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus, StatefulSetStatus};

use crate::client::ClusterClient;
use crate::kind::{ManagedObject, ResourceKind};

type Key = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, ManagedObject>,
    next_version: u64,
    creates: usize,
    updates: usize,
    deletes: usize,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

fn key_of(object: &ManagedObject) -> Key {
    (
        object.kind(),
        object.namespace().to_string(),
        object.name().to_string(),
    )
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster lock poisoned")
    }

    /// Seed a live object without counting it as a write
    pub(crate) fn insert(&self, mut object: ManagedObject) {
        let mut state = self.lock();
        let version = state.bump_version();
        object.meta_mut().resource_version = Some(version);
        state.objects.insert(key_of(&object), object);
    }

    pub(crate) fn object(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Option<ManagedObject> {
        self.lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn creates(&self) -> usize {
        self.lock().creates
    }

    pub(crate) fn updates(&self) -> usize {
        self.lock().updates
    }

    /// Creates plus updates
    pub(crate) fn writes(&self) -> usize {
        let state = self.lock();
        state.creates + state.updates
    }

    pub(crate) fn deletes(&self) -> usize {
        self.lock().deletes
    }

    fn with_live(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut ManagedObject),
    ) {
        let mut state = self.lock();
        let key = (kind, namespace.to_string(), name.to_string());
        let object = state
            .objects
            .get_mut(&key)
            .unwrap_or_else(|| panic!("no live {kind}/{name} in {namespace}"));
        f(object);
    }

    /// Report the workload's rollout as finished
    pub(crate) fn mark_rolled_out(&self, kind: ResourceKind, namespace: &str, name: &str) {
        self.with_live(kind, namespace, name, |object| match object {
            ManagedObject::Deployment(d) => {
                let replicas = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                d.status = Some(DeploymentStatus {
                    observed_generation: d.metadata.generation,
                    replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    ..Default::default()
                });
            }
            ManagedObject::StatefulSet(s) => {
                let replicas = s.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                s.status = Some(StatefulSetStatus {
                    observed_generation: s.metadata.generation,
                    current_revision: Some("rev-1".to_string()),
                    update_revision: Some("rev-1".to_string()),
                    current_replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    replicas,
                    ..Default::default()
                });
            }
            other => panic!("{} is not a workload", other.display_name()),
        });
    }

    /// Report the workload as mid-rollout
    pub(crate) fn mark_rolling(&self, kind: ResourceKind, namespace: &str, name: &str) {
        self.with_live(kind, namespace, name, |object| match object {
            ManagedObject::Deployment(d) => {
                let replicas = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                d.status = Some(DeploymentStatus {
                    observed_generation: d.metadata.generation,
                    replicas: Some(replicas),
                    ready_replicas: Some(0),
                    ..Default::default()
                });
            }
            ManagedObject::StatefulSet(s) => {
                let replicas = s.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                s.status = Some(StatefulSetStatus {
                    observed_generation: s.metadata.generation,
                    current_revision: Some("rev-1".to_string()),
                    update_revision: Some("rev-2".to_string()),
                    current_replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    replicas,
                    ..Default::default()
                });
            }
            other => panic!("{} is not a workload", other.display_name()),
        });
    }

    /// Put a true `ReplicaFailure` condition on a Deployment
    pub(crate) fn mark_replica_failure(&self, namespace: &str, name: &str, reason: &str) {
        self.with_live(ResourceKind::Deployment, namespace, name, |object| {
            if let ManagedObject::Deployment(d) = object {
                d.status = Some(DeploymentStatus {
                    observed_generation: d.metadata.generation,
                    ready_replicas: Some(0),
                    conditions: Some(vec![DeploymentCondition {
                        type_: CONDITION_REPLICA_FAILURE.to_string(),
                        status: STATUS_TRUE.to_string(),
                        reason: Some(reason.to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                });
            }
        });
    }
}

fn clear_status(object: &mut ManagedObject) {
    match object {
        ManagedObject::Deployment(d) => d.status = None,
        ManagedObject::StatefulSet(s) => s.status = None,
        ManagedObject::PersistentVolumeClaim(p) => p.status = None,
        ManagedObject::Service(s) => s.status = None,
        ManagedObject::ConfigMap(_) | ManagedObject::NetworkPolicy(_) => {}
    }
}

fn copy_status(from: &ManagedObject, to: &mut ManagedObject) {
    match (from, to) {
        (ManagedObject::Deployment(a), ManagedObject::Deployment(b)) => b.status = a.status.clone(),
        (ManagedObject::StatefulSet(a), ManagedObject::StatefulSet(b)) => {
            b.status = a.status.clone()
        }
        (ManagedObject::PersistentVolumeClaim(a), ManagedObject::PersistentVolumeClaim(b)) => {
            b.status = a.status.clone()
        }
        (ManagedObject::Service(a), ManagedObject::Service(b)) => b.status = a.status.clone(),
        _ => {}
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error> {
        Ok(self.object(kind, namespace, name))
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, Error> {
        let mut state = self.lock();
        let key = key_of(object);
        if state.objects.contains_key(&key) {
            return Err(Error::remote(
                "create",
                object.kind().as_str(),
                object.name(),
                "already exists",
            ));
        }
        let mut stored = object.clone();
        clear_status(&mut stored);
        stored.meta_mut().generation = Some(1);
        stored.meta_mut().resource_version = Some(state.bump_version());
        state.objects.insert(key, stored.clone());
        state.creates += 1;
        Ok(stored)
    }

    async fn update(&self, object: &ManagedObject) -> Result<ManagedObject, Error> {
        let mut state = self.lock();
        let key = key_of(object);
        let Some(live) = state.objects.get(&key) else {
            return Err(Error::remote(
                "update",
                object.kind().as_str(),
                object.name(),
                "not found",
            ));
        };
        if let Some(expected) = object.resource_version() {
            if live.resource_version() != Some(expected) {
                return Err(Error::remote(
                    "update",
                    object.kind().as_str(),
                    object.name(),
                    "conflict: resourceVersion is stale",
                ));
            }
        }
        let mut stored = object.clone();
        copy_status(live, &mut stored);
        stored.meta_mut().generation = Some(live.meta().generation.unwrap_or(1) + 1);
        stored.meta_mut().resource_version = Some(state.bump_version());
        state.objects.insert(key, stored.clone());
        state.updates += 1;
        Ok(stored)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.lock();
        if state
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.deletes += 1;
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, Error> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), obj)| {
                *k == kind && ns == namespace && labels_match(obj.labels(), labels)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ManagedObject {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .into()
    }

    #[tokio::test]
    async fn stale_resource_version_is_rejected() {
        let cluster = FakeCluster::new();
        let created = cluster.create(&config_map("a")).await.expect("create");

        let mut stale = created.clone();
        stale.meta_mut().resource_version = Some("0".to_string());
        assert!(cluster.update(&stale).await.is_err());

        let updated = cluster.update(&created).await.expect("update");
        assert_eq!(updated.meta().generation, Some(2));
        assert_eq!(cluster.writes(), 2);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let cluster = FakeCluster::new();
        cluster.create(&config_map("a")).await.expect("create");
        assert!(cluster.create(&config_map("a")).await.is_err());
        assert_eq!(cluster.creates(), 1);
    }
}
