//! Content hashing for drift detection
//!
//! One routine digests every payload: the engine uses it for the hash
//! annotation and the aggregator uses it for the config hashes injected into
//! workloads, so both always agree on the value for the same object.
//!
//! The digest is SHA-256 over the JSON serialization of the object with the
//! hash annotation removed, base64 (standard alphabet) encoded.

use aws_lc_rs::digest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::trace;

use converge_common::Error;

use crate::kind::ManagedObject;

/// Name and content hash of one config-bearing resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HashHolder {
    /// Resource name, also used as the injected environment variable name
    pub name: String,
    /// Base64 content digest
    pub hash_value: String,
}

/// Digest any serializable payload
pub fn digest_payload<T: Serialize>(payload: &T) -> Result<String, Error> {
    let bytes = serde_json::to_vec(payload).map_err(|e| Error::serialization(e.to_string()))?;
    let hash = digest::digest(&digest::SHA256, &bytes);
    Ok(STANDARD.encode(hash.as_ref()))
}

/// Digest a managed object, excluding the hash annotation itself.
///
/// A payload that already carries `annotation_key` (for example one read
/// back from a previous pass) hashes to the same value as the payload before
/// the annotation was attached.
pub fn digest_object(object: &ManagedObject, annotation_key: &str) -> Result<String, Error> {
    let mut stripped = object.clone();
    stripped.remove_annotation(annotation_key);
    digest_payload(&stripped).map_err(|e| match e {
        Error::Serialization { message, .. } => {
            Error::serialization_for_kind(object.kind().as_str(), message)
        }
        other => other,
    })
}

/// Compute the hash holders for a batch of config-bearing resources.
///
/// Entries are deduplicated by value, keeping first-seen order. Any
/// serialization failure fails the whole batch.
pub fn compute_config_hashes(
    resources: &[ManagedObject],
    annotation_key: &str,
) -> Result<Vec<HashHolder>, Error> {
    let mut holders: Vec<HashHolder> = Vec::with_capacity(resources.len());
    for resource in resources {
        let holder = HashHolder {
            name: resource.name().to_string(),
            hash_value: digest_object(resource, annotation_key)?,
        };
        trace!(name = %holder.name, hash = %holder.hash_value, "config hash");
        if !holders.contains(&holder) {
            holders.push(holder);
        }
    }
    Ok(holders)
}
