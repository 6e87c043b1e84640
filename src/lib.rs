//! Pool Failover: keeps a node label-based failover pool in sync with the
//! health of a master workload, and restarts the dependent slave workload
//! when its node leaves the pool.
//!
//! This crate provides the reconciliation engine and the cluster store
//! abstraction it runs against, plus the probe server used by the
//! `failover-operator` binary.

pub mod config;
pub mod controller;
pub mod error;
pub mod selector;
pub mod store;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
