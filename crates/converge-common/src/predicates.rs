//! Watch predicates for converge controllers
//!
//! These are consulted by the outer control loop before a pass is queued.
//! They never touch the API server.

use kube::ResourceExt;
use tracing::info;

use crate::OperatorConfig;

/// Returns false when the object lives in a namespace on the deny-list.
///
/// Controllers that watch all namespaces use this to stay out of
/// `kube-system` and friends without narrowing the watch itself.
pub fn namespace_allowed<K: ResourceExt>(config: &OperatorConfig, obj: &K) -> bool {
    let namespace = obj.namespace().unwrap_or_default();
    if config.is_denied(&namespace) {
        info!(
            controller = %config.controller_name,
            namespace = %namespace,
            "namespace is on the deny-list, alter DENY_LIST to reconcile"
        );
        return false;
    }
    true
}

/// Returns false when the object carries the ignore annotation set to "true".
pub fn object_not_ignored<K: ResourceExt>(config: &OperatorConfig, obj: &K) -> bool {
    let ignored = obj
        .annotations()
        .get(&config.ignore_annotation)
        .is_some_and(|v| v == "true");
    if ignored {
        info!(
            controller = %config.controller_name,
            name = %obj.name_any(),
            "object is ignored, remove the annotation to reconcile"
        );
        return false;
    }
    true
}

/// Returns false for update events that did not bump the generation.
///
/// Status-only writes and metadata churn keep the generation unchanged; a
/// generation of zero means the server does not track generations for the
/// kind, so such updates always pass.
pub fn generation_changed<K: ResourceExt>(old: Option<&K>, new: Option<&K>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };
    let old_gen = old.meta().generation.unwrap_or(0);
    let new_gen = new.meta().generation.unwrap_or(0);
    !(new_gen == old_gen && new_gen != 0)
}
