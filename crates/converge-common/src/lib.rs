//! Common types for converge operators: errors, events, configuration,
//! watch predicates and logging setup.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod predicates;
pub mod telemetry;

pub use config::OperatorConfig;
pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher, RecordingEventPublisher};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Suffix appended to the owner kind to form the hash annotation key
pub const HASH_ANNOTATION_SUFFIX: &str = "OperatorHash";

/// Default requeue interval when `RECONCILE_WAIT` is not set
pub const DEFAULT_RECONCILE_WAIT: std::time::Duration = std::time::Duration::from_secs(10);
