//! Readiness predicates for nodes and pods
//!
//! Only the `Ready` condition counts. Pressure conditions (disk, memory,
//! PID) reported by the kubelet do not take a node out of the pool.

use k8s_openapi::api::core::v1::{Node, Pod};

/// Standard condition type reported by both kubelet and pod status
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Standard condition status
pub const CONDITION_STATUS_TRUE: &str = "True";

/// True iff the node reports `Ready=True`
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == CONDITION_TYPE_READY && c.status == CONDITION_STATUS_TRUE)
        })
        .unwrap_or(false)
}

/// True iff the pod is not terminating and reports `Ready=True`
///
/// A deletion timestamp wins over a stale `Ready=True` condition.
pub fn is_pod_ready(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == CONDITION_TYPE_READY && c.status == CONDITION_STATUS_TRUE)
        })
        .unwrap_or(false)
}
