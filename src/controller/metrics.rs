//! Prometheus metrics for the failover operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `failover_passes_total` (counter): passes labeled by result (`ok` / `error`).
//! - `failover_pass_duration_seconds` (histogram): wall time of one pass.
//! - `failover_transitions_total` (counter): pool transitions labeled by kind (`join` / `leave`).
//! - `failover_restarts_total` (counter): slave deployments restarted.
//! - `failover_mutation_errors_total` (counter): failed writes labeled by operation.
//! - `failover_pool_nodes` (gauge): nodes in the pool after the last pass.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    /// "ok" or "error"
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    /// "join" or "leave"
    pub transition: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MutationLabels {
    /// e.g. "add_label", "remove_label", "resolve_workload", "restart_workload"
    pub operation: String,
}

pub static PASSES_TOTAL: Lazy<Family<PassLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

// 1ms .. ~32s across 16 buckets.
pub static PASS_DURATION_SECONDS: Lazy<Histogram> =
    Lazy::new(|| Histogram::new(exponential_buckets(0.001, 2.0, 16)));

pub static TRANSITIONS_TOTAL: Lazy<Family<TransitionLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static RESTARTS_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

pub static MUTATION_ERRORS_TOTAL: Lazy<Family<MutationLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static POOL_NODES: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "failover_passes",
        "Total number of reconciliation passes",
        PASSES_TOTAL.clone(),
    );
    registry.register(
        "failover_pass_duration_seconds",
        "Duration of reconciliation passes in seconds",
        PASS_DURATION_SECONDS.clone(),
    );
    registry.register(
        "failover_transitions",
        "Total number of failover pool membership transitions",
        TRANSITIONS_TOTAL.clone(),
    );
    registry.register(
        "failover_restarts",
        "Total number of slave deployments restarted",
        RESTARTS_TOTAL.clone(),
    );
    registry.register(
        "failover_mutation_errors",
        "Total number of failed cluster writes",
        MUTATION_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "failover_pool_nodes",
        "Number of nodes in the failover pool after the last pass",
        POOL_NODES.clone(),
    );

    registry
});

/// Record a completed (or aborted) pass
pub fn observe_pass(ok: bool, seconds: f64) {
    let labels = PassLabels {
        result: if ok { "ok" } else { "error" }.to_string(),
    };
    PASSES_TOTAL.get_or_create(&labels).inc();
    PASS_DURATION_SECONDS.observe(seconds);
}

pub fn inc_transition(transition: &str) {
    let labels = TransitionLabels {
        transition: transition.to_string(),
    };
    TRANSITIONS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_restart() {
    RESTARTS_TOTAL.inc();
}

pub fn inc_mutation_error(operation: &str) {
    let labels = MutationLabels {
        operation: operation.to_string(),
    };
    MUTATION_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn set_pool_nodes(count: usize) {
    POOL_NODES.set(count as i64);
}
