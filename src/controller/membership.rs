//! Failover pool membership decisions
//!
//! Membership lives in the cluster as the presence of the pool label key on a
//! node. Each pass derives a [`PoolState`] from that label, pairs it with the
//! health of the node's master pod in a [`NodeSnapshot`], and [`decide`]s
//! which transition (if any) must be applied.
//!
//! ```text
//! NotInPool --[master ready]-----> InPool      (add label)
//! InPool    --[master not ready]--> NotInPool   (remove label, restart slave)
//! ```
//!
//! Transitions only fire from the opposite state, so the slave restart
//! happens once per unhealthy episode rather than once per pass.

use std::fmt;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;

use super::health::{is_node_ready, is_pod_ready};

/// Whether a node currently carries the pool label
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    InPool,
    NotInPool,
}

impl PoolState {
    /// Derive the state from the node's labels; only the key matters
    pub fn of(node: &Node, pool_key: &str) -> Self {
        if node.labels().contains_key(pool_key) {
            PoolState::InPool
        } else {
            PoolState::NotInPool
        }
    }

    pub fn is_in_pool(self) -> bool {
        self == PoolState::InPool
    }

    /// State after `transition` has been applied
    pub fn apply(self, transition: PoolTransition) -> Self {
        match transition {
            PoolTransition::Join => PoolState::InPool,
            PoolTransition::Leave => PoolState::NotInPool,
            PoolTransition::None => self,
        }
    }
}

/// Membership change required for one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolTransition {
    None,
    /// Admission: label the node
    Join,
    /// Eviction: unlabel the node and restart its slave workload
    Leave,
}

impl PoolTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTransition::None => "none",
            PoolTransition::Join => "join",
            PoolTransition::Leave => "leave",
        }
    }
}

impl fmt::Display for PoolTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine needs to know about one node, read fresh each pass
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub node: Node,
    pub master_pod: Option<Pod>,
    pub slave_pod: Option<Pod>,
    pub state: PoolState,
}

impl NodeSnapshot {
    pub fn new(
        node: Node,
        master_pod: Option<Pod>,
        slave_pod: Option<Pod>,
        pool_key: &str,
    ) -> Self {
        let state = PoolState::of(&node, pool_key);
        Self {
            node,
            master_pod,
            slave_pod,
            state,
        }
    }

    /// Master present and ready on a ready node
    pub fn master_healthy(&self) -> bool {
        self.master_pod.as_ref().is_some_and(is_pod_ready) && is_node_ready(&self.node)
    }

    /// One-line, human-readable description used for verbose logging
    pub fn summary(&self) -> String {
        format!(
            "node={} masterPod={} ready={} slavePod={}",
            self.node.name_any(),
            self.master_pod
                .as_ref()
                .map(|p| p.name_any())
                .unwrap_or_default(),
            self.master_healthy(),
            self.slave_pod
                .as_ref()
                .map(|p| p.name_any())
                .unwrap_or_default(),
        )
    }
}

/// Decide the membership transition for a snapshot. Performs no I/O.
pub fn decide(snapshot: &NodeSnapshot) -> PoolTransition {
    match (snapshot.state, snapshot.master_healthy()) {
        (PoolState::InPool, false) => PoolTransition::Leave,
        (PoolState::NotInPool, true) => PoolTransition::Join,
        _ => PoolTransition::None,
    }
}
