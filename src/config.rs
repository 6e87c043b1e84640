//! Operator configuration
//!
//! Settings come from command-line flags / environment variables and may be
//! overlaid on an optional TOML file. Flags always win over the file. The
//! merged [`ConfigSource`] is validated into a [`FailoverConfig`] before the
//! first pass runs, so malformed selectors are reported at startup.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::selector::parse_label_selector;

/// Default number of seconds between passes
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// The `key=value` label marking failover pool membership
///
/// Presence of `key` on a node means the node is in the pool; `value` is
/// what gets written when a node is admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolLabel {
    pub key: String,
    pub value: String,
}

impl FromStr for PoolLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s.trim().split_once('=').ok_or_else(|| {
            Error::ConfigError(format!("failover pool label {:?} must be key=value", s))
        })?;
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            return Err(Error::ConfigError(format!(
                "failover pool label {:?} has an empty key",
                s
            )));
        }
        if value.contains('=') || key.chars().any(char::is_whitespace) {
            return Err(Error::ConfigError(format!(
                "failover pool label {:?} must be a single key=value pair",
                s
            )));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for PoolLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Raw, possibly partial settings from one source (flags or file)
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSource {
    pub node_selector: Option<String>,
    pub master_pod_selector: Option<String>,
    pub slave_pod_selector: Option<String>,
    pub slave_pod_namespace: Option<String>,
    pub failover_pool_label: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub namespace: Option<String>,
}

impl ConfigSource {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win
    pub fn merge(self, overrides: ConfigSource) -> ConfigSource {
        ConfigSource {
            node_selector: overrides.node_selector.or(self.node_selector),
            master_pod_selector: overrides.master_pod_selector.or(self.master_pod_selector),
            slave_pod_selector: overrides.slave_pod_selector.or(self.slave_pod_selector),
            slave_pod_namespace: overrides.slave_pod_namespace.or(self.slave_pod_namespace),
            failover_pool_label: overrides.failover_pool_label.or(self.failover_pool_label),
            poll_interval_secs: overrides.poll_interval_secs.or(self.poll_interval_secs),
            verbose: overrides.verbose.or(self.verbose),
            namespace: overrides.namespace.or(self.namespace),
        }
    }
}

/// Validated configuration consumed by the reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailoverConfig {
    /// Nodes watched by the operator
    pub node_selector: String,
    /// Master pods, looked up in the operator's own namespace
    pub master_pod_selector: String,
    /// Slave pods, looked up in `slave_pod_namespace`
    pub slave_pod_selector: String,
    pub slave_pod_namespace: String,
    pub pool_label: PoolLabel,
    pub poll_interval: Duration,
    /// Log a summary line for every node on every pass
    pub verbose: bool,
    /// Explicit operator namespace; otherwise the service account mount is used
    pub namespace: Option<String>,
}

impl FailoverConfig {
    /// Check that every selector parses and the interval is usable
    pub fn validate(&self) -> Result<()> {
        for (flag, selector) in [
            ("node selector", &self.node_selector),
            ("master pod selector", &self.master_pod_selector),
            ("slave pod selector", &self.slave_pod_selector),
        ] {
            if selector.trim().is_empty() {
                return Err(Error::ConfigError(format!("{} must not be empty", flag)));
            }
            parse_label_selector(selector)?;
        }
        if self.slave_pod_namespace.trim().is_empty() {
            return Err(Error::ConfigError(
                "slave pod namespace must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::ConfigError(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| Error::ConfigError(format!("missing required setting `{}`", name)))
}

impl TryFrom<ConfigSource> for FailoverConfig {
    type Error = Error;

    fn try_from(src: ConfigSource) -> Result<Self> {
        let pool_label: PoolLabel =
            required(src.failover_pool_label, "failover_pool_label")?.parse()?;
        let config = FailoverConfig {
            node_selector: required(src.node_selector, "node_selector")?,
            master_pod_selector: required(src.master_pod_selector, "master_pod_selector")?,
            slave_pod_selector: required(src.slave_pod_selector, "slave_pod_selector")?,
            slave_pod_namespace: required(src.slave_pod_namespace, "slave_pod_namespace")?,
            pool_label,
            poll_interval: Duration::from_secs(
                src.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            verbose: src.verbose.unwrap_or(false),
            namespace: src.namespace.filter(|ns| !ns.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }
}
