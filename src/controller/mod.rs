//! Controller module for failover pool reconciliation
//! This module contains the pass loop, the membership decision engine,
//! and the readiness and topology helpers it is built on.

#[cfg(test)]
mod fixtures;
pub mod health;
pub mod membership;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod topology;

pub use health::{is_node_ready, is_pod_ready};
pub use membership::{decide, NodeSnapshot, PoolState, PoolTransition};
pub use reconciler::{stamp_restart, PassSummary, Reconciler, RESTARTED_AT_ANNOTATION};
pub use topology::{
    derive_workload_name, find_master_pod, find_slave_pod, resolve_owning_workload,
};
