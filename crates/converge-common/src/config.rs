//! Operator configuration read from the process environment
//!
//! Operators built on converge are configured through a handful of
//! environment variables set on their Deployment:
//!
//! - `RECONCILE_WAIT`: how long to wait before re-running a pass that halted
//!   on a pending rollout (humantime syntax, e.g. `10s`, `2m`)
//! - `DENY_LIST`: comma-separated namespaces the controller never touches

use std::time::Duration;

use tracing::debug;

use crate::{Error, DEFAULT_RECONCILE_WAIT};

/// Environment key for the requeue interval
pub const RECONCILE_WAIT_ENV: &str = "RECONCILE_WAIT";

/// Environment key for the namespace deny-list
pub const DENY_LIST_ENV: &str = "DENY_LIST";

/// Configuration shared by the reconciler and the watch predicates
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Controller name, used as the event reason prefix (e.g. "Druid")
    pub controller_name: String,
    /// Annotation that pauses reconciliation of a custom resource when "true"
    pub ignore_annotation: String,
    /// Requeue interval for passes that did not converge
    pub reconcile_wait: Duration,
    /// Namespaces excluded from reconciliation
    pub deny_list: Vec<String>,
}

impl OperatorConfig {
    /// Create a configuration with defaults for everything read from the environment
    pub fn new(controller_name: impl Into<String>, ignore_annotation: impl Into<String>) -> Self {
        Self {
            controller_name: controller_name.into(),
            ignore_annotation: ignore_annotation.into(),
            reconcile_wait: DEFAULT_RECONCILE_WAIT,
            deny_list: Vec::new(),
        }
    }

    /// Build the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `RECONCILE_WAIT` is set but is not a
    /// valid duration.
    pub fn from_env(
        controller_name: impl Into<String>,
        ignore_annotation: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::from_lookup(controller_name, ignore_annotation, |key| {
            std::env::var(key).ok()
        })
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `RECONCILE_WAIT` does not parse.
    pub fn from_lookup<F>(
        controller_name: impl Into<String>,
        ignore_annotation: impl Into<String>,
        lookup: F,
    ) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(controller_name, ignore_annotation);

        if let Some(raw) = lookup(RECONCILE_WAIT_ENV) {
            config.reconcile_wait = parse_reconcile_wait(&raw)?;
        }
        if let Some(raw) = lookup(DENY_LIST_ENV) {
            config.deny_list = parse_deny_list(&raw);
        }

        debug!(
            controller = %config.controller_name,
            reconcile_wait = ?config.reconcile_wait,
            denied = config.deny_list.len(),
            "loaded operator configuration"
        );
        Ok(config)
    }

    /// Key of the hash annotation written on managed resources for `owner_kind`
    pub fn hash_annotation_key(owner_kind: &str) -> String {
        format!("{}{}", owner_kind, crate::HASH_ANNOTATION_SUFFIX)
    }

    /// Whether the namespace is on the deny-list
    pub fn is_denied(&self, namespace: &str) -> bool {
        self.deny_list.iter().any(|ns| ns == namespace)
    }
}

fn parse_reconcile_wait(raw: &str) -> Result<Duration, Error> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| Error::config(RECONCILE_WAIT_ENV, format!("'{}': {}", raw, e)))
}

fn parse_deny_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(String::from)
        .collect()
}
