//! Error types for converge reconciliation
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource or setting it concerns so that a
//! failed pass can be traced back to the object that broke it.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for converge operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Remote call failure reported by a non-kube client implementation
    #[error("{verb} {kind}/{name} failed: {message}")]
    Remote {
        /// API verb that failed (get, list, create, update, delete)
        verb: String,
        /// Resource kind the call targeted
        kind: String,
        /// Resource name (empty for list calls)
        name: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization error while digesting or converting a payload
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// A replica-set workload reported a replica failure condition
    #[error("rollout of {workload} failed: {reason}")]
    RolloutFailed {
        /// Name of the workload whose rollout failed
        workload: String,
        /// Reason string copied from the failure condition
        reason: String,
    },

    /// Invalid operator configuration
    #[error("invalid configuration {key}: {message}")]
    Config {
        /// Environment key or setting name
        key: String,
        /// Description of what's invalid
        message: String,
    },

    /// The pass was cancelled while a remote call was in flight
    #[error("cancelled during {context}")]
    Cancelled {
        /// The operation that was interrupted
        context: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "engine", "sweep")
        context: String,
    },
}

impl Error {
    /// Create a remote call error for a client that is not backed by kube
    pub fn remote(
        verb: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Remote {
            verb: verb.into(),
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a rollout failure for the named workload
    pub fn rollout_failed(workload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RolloutFailed {
            workload: workload.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a cancellation error for the interrupted operation
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Serialization and configuration errors need a code or config fix.
    /// Everything that came from the API server, a rollout, or a
    /// cancellation is worth another pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // 409 conflicts are stale resource versions; the next pass refetches
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
                )
            }
            Error::Remote { .. } => true,
            Error::Serialization { .. } => false,
            Error::RolloutFailed { .. } => true,
            Error::Config { .. } => false,
            Error::Cancelled { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this error came from cancelling the pass
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
