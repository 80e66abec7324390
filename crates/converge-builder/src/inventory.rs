//! Pass-scoped inventory of declared resources and the orphan sweep
//!
//! Every object upserted during a pass is recorded here. Once all kinds have
//! been applied, [`sweep`] lists the owner's labelled resources of each
//! recorded kind and deletes the ones the pass never declared: whatever an
//! earlier configuration asked for and this one dropped.

use std::collections::{BTreeMap, BTreeSet};

use converge_common::kube_utils::labels_match;
use converge_common::Error;
use tracing::{debug, info, instrument};

use crate::context::ReconcileContext;
use crate::kind::ResourceKind;

/// Names declared during one pass, with the kind they were declared as
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceInventory {
    names: BTreeMap<String, ResourceKind>,
    kinds: BTreeSet<ResourceKind>,
}

impl ResourceInventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `name` of `kind` was declared.
    ///
    /// The first kind recorded for a name wins. Every kind passed in is
    /// remembered for the sweep even when its name was already taken.
    /// Returns true when the name was not yet present.
    pub fn put(&mut self, name: impl Into<String>, kind: ResourceKind) -> bool {
        self.kinds.insert(kind);
        let name = name.into();
        if self.names.contains_key(&name) {
            return false;
        }
        self.names.insert(name, kind);
        true
    }

    /// Whether `name` was declared in this pass
    pub fn exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Kind first recorded for `name`
    pub fn kind_of(&self, name: &str) -> Option<ResourceKind> {
        self.names.get(name).copied()
    }

    /// Kinds declared in this pass
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing was declared
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Delete the owner's resources that the current pass did not declare.
///
/// The owner must carry selector labels; an empty selector would match
/// objects other tools own. Only kinds present in the inventory and
/// eligible for sweeping are listed.
/// A listed object is deleted when it carries every owner selector label and
/// its name was never recorded. Returns the deleted `(kind, name)` pairs.
///
/// # Errors
///
/// An owner without selector labels is rejected before anything is listed.
/// The first list or delete failure stops the sweep and is returned.
/// Deletions that already happened are not undone.
#[instrument(skip_all, fields(owner = %ctx.owner.name()))]
pub async fn sweep(ctx: &ReconcileContext) -> Result<Vec<(ResourceKind, String)>, Error> {
    let inventory = &ctx.inventory;
    let selector = ctx.owner.selector()?;
    let mut deleted = Vec::new();

    for kind in inventory.kinds().filter(ResourceKind::is_swept) {
        let live = ctx.list(kind).await?;
        debug!(kind = %kind, live = live.len(), "sweeping");

        for object in live {
            if !labels_match(object.labels(), selector) {
                continue;
            }
            if inventory.exists(object.name()) {
                continue;
            }
            ctx.delete(kind, object.name()).await?;
            deleted.push((kind, object.name().to_string()));
        }
    }

    if !deleted.is_empty() {
        info!(count = deleted.len(), "removed resources no longer declared");
    }
    Ok(deleted)
}
