//! Create-or-update driven by a content hash annotation
//!
//! The decision is a single opaque comparison: the desired object is
//! digested, the digest is written to `<OwnerKind>OperatorHash`, and the live
//! object is only written when its annotation differs. At most one write is
//! issued per call.

use std::fmt;

use converge_common::Error;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, instrument};

use crate::context::ReconcileContext;
use crate::hash::digest_object;
use crate::kind::ManagedObject;

/// What `create_or_update` did to the live object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object did not exist and was created
    Created,
    /// The hash differed and the object was replaced
    Updated,
    /// The hash matched; nothing was written
    NoOp,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::NoOp => "unchanged",
        };
        f.write_str(s)
    }
}

/// Attach `reference` to the object, replacing an entry for the same owner.
///
/// Entries are keyed by `{apiVersion, kind, name, uid}` so repeated passes
/// never accumulate duplicates; references to other owners are preserved.
pub fn upsert_owner_reference(object: &mut ManagedObject, reference: &OwnerReference) {
    let refs = object.meta_mut().owner_references.get_or_insert_with(Vec::new);
    let same_owner = |r: &OwnerReference| {
        r.api_version == reference.api_version
            && r.kind == reference.kind
            && r.name == reference.name
            && r.uid == reference.uid
    };
    match refs.iter_mut().find(|r| same_owner(r)) {
        Some(existing) => *existing = reference.clone(),
        None => refs.push(reference.clone()),
    }
}

/// Bring a freshly built object into the state that gets hashed: owned by
/// the pass owner and placed in its namespace.
pub fn attach_owner(ctx: &ReconcileContext, object: &mut ManagedObject) {
    upsert_owner_reference(object, ctx.owner.reference());
    let meta = object.meta_mut();
    if meta.namespace.as_deref().unwrap_or_default().is_empty() {
        meta.namespace = Some(ctx.owner.namespace().to_string());
    }
}

/// Digest the object and write the result to the owner's hash annotation.
///
/// Returns the digest. The annotation is never part of its own input.
pub fn stamp_hash(object: &mut ManagedObject, annotation_key: &str) -> Result<String, Error> {
    let digest = digest_object(object, annotation_key)?;
    object.set_annotation(annotation_key, digest.clone());
    Ok(digest)
}

/// Create, update or leave alone the live copy of `desired`.
///
/// # Errors
///
/// Serialization failures abort before any remote call. Get, create and
/// update failures are reported as events on the owner and returned
/// unchanged; a failed get never falls through to a write.
#[instrument(skip_all, fields(object = %desired.display_name()))]
pub async fn create_or_update(
    ctx: &ReconcileContext,
    mut desired: ManagedObject,
) -> Result<OperationResult, Error> {
    attach_owner(ctx, &mut desired);
    let key = ctx.owner.hash_annotation_key();
    let digest = stamp_hash(&mut desired, &key)?;

    let Some(current) = ctx.get(desired.kind(), desired.name()).await? else {
        ctx.create(&desired).await?;
        return Ok(OperationResult::Created);
    };

    if current.annotation(&key) == Some(digest.as_str()) {
        debug!(hash = %digest, "hash unchanged");
        return Ok(OperationResult::NoOp);
    }

    debug!(
        desired = %digest,
        live = current.annotation(&key).unwrap_or_default(),
        "hash changed"
    );
    desired.meta_mut().resource_version = current.resource_version().map(String::from);
    ctx.update(&desired).await?;
    Ok(OperationResult::Updated)
}
