//! Reconciliation loop for the failover pool
//!
//! One pass walks every selected node: it reads the node's master and slave
//! pods, decides the membership transition and applies it. Read failures
//! abort the pass, since deciding on a partial view of the cluster could
//! evict healthy nodes. Write failures are logged and the pass moves on to
//! the next node; the next pass re-derives everything and retries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::membership::{decide, NodeSnapshot, PoolTransition};
#[cfg(feature = "metrics")]
use super::metrics;
use super::topology::{find_master_pod, find_slave_pod, resolve_owning_workload};
use crate::config::FailoverConfig;
use crate::error::{Error, Result};
use crate::selector::{parse_label_selector, Selector};
use crate::store::ClusterStore;

/// Pod template annotation `kubectl rollout restart` sets
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Selectors parsed once per pass
#[derive(Debug)]
struct Selectors {
    nodes: Selector,
    master: Selector,
    slave: Selector,
}

impl Selectors {
    fn parse(config: &FailoverConfig) -> Result<Self> {
        Ok(Self {
            nodes: parse_label_selector(&config.node_selector)?,
            master: parse_label_selector(&config.master_pod_selector)?,
            slave: parse_label_selector(&config.slave_pod_selector)?,
        })
    }
}

/// Outcome of one pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub nodes: usize,
    pub joined: usize,
    pub left: usize,
    pub restarts: usize,
    pub mutation_errors: usize,
    /// Nodes carrying the pool label once the pass finished
    pub in_pool: usize,
}

/// Upsert the restart annotation on a deployment's pod template
pub fn stamp_restart(deployment: &mut Deployment, at: DateTime<Utc>) {
    let spec = deployment.spec.get_or_insert_with(Default::default);
    spec.template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(RESTARTED_AT_ANNOTATION.to_string(), at.to_rfc3339());
}

pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    config: FailoverConfig,
}

impl<S: ClusterStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>, config: FailoverConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Run passes forever, sleeping `poll_interval` in between
    ///
    /// Returns only when a pass fails; the caller is expected to exit.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting failover loop (interval {:?})",
            self.config.poll_interval
        );
        loop {
            let started = Instant::now();
            let result = self.run_pass().await;

            #[cfg(feature = "metrics")]
            metrics::observe_pass(result.is_ok(), started.elapsed().as_secs_f64());

            match result {
                Ok(summary) => {
                    #[cfg(feature = "metrics")]
                    metrics::set_pool_nodes(summary.in_pool);

                    debug!(
                        "Pass finished in {:?}: {} nodes, {} joined, {} left, {} restarts, {} write errors",
                        started.elapsed(),
                        summary.nodes,
                        summary.joined,
                        summary.left,
                        summary.restarts,
                        summary.mutation_errors
                    );
                }
                Err(e) => {
                    error!("Failover pass aborted: {}", e);
                    return Err(e);
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One reconciliation pass over all selected nodes
    #[instrument(skip(self), fields(node_selector = %self.config.node_selector))]
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let selectors = Selectors::parse(&self.config)?;
        let namespace = self.store.current_namespace().await?;

        let nodes = self.store.list_nodes(&selectors.nodes).await?;
        if nodes.is_empty() {
            return Err(Error::NoNodesMatched(self.config.node_selector.clone()));
        }

        let mut summary = PassSummary {
            nodes: nodes.len(),
            ..Default::default()
        };

        for node in nodes {
            let snapshot = self.snapshot(node, &namespace, &selectors).await?;
            let transition = decide(&snapshot);

            let applied = self.apply(&snapshot, transition, &mut summary).await;
            let state = if applied {
                snapshot.state.apply(transition)
            } else {
                snapshot.state
            };
            if state.is_in_pool() {
                summary.in_pool += 1;
            }

            if self.config.verbose {
                info!("{}", snapshot.summary());
            }
        }

        Ok(summary)
    }

    async fn snapshot(
        &self,
        node: Node,
        namespace: &str,
        selectors: &Selectors,
    ) -> Result<NodeSnapshot> {
        let master = find_master_pod(&*self.store, &node, namespace, &selectors.master).await?;
        let slave = find_slave_pod(
            &*self.store,
            &node,
            &self.config.slave_pod_namespace,
            &selectors.slave,
            &self.config.pool_label.key,
        )
        .await?;
        Ok(NodeSnapshot::new(
            node,
            master,
            slave,
            &self.config.pool_label.key,
        ))
    }

    /// Apply a transition; returns whether the membership label was written
    async fn apply(
        &self,
        snapshot: &NodeSnapshot,
        transition: PoolTransition,
        summary: &mut PassSummary,
    ) -> bool {
        let name = snapshot.node.name_any();
        match transition {
            PoolTransition::None => false,
            PoolTransition::Join => match self.add_to_pool(&snapshot.node).await {
                Ok(()) => {
                    info!("Added node {} to failover pool", name);
                    summary.joined += 1;
                    #[cfg(feature = "metrics")]
                    metrics::inc_transition(transition.as_str());
                    true
                }
                Err(e) => {
                    warn!("Failed to add node {} to failover pool: {}", name, e);
                    summary.mutation_errors += 1;
                    #[cfg(feature = "metrics")]
                    metrics::inc_mutation_error("add_label");
                    false
                }
            },
            PoolTransition::Leave => {
                let removed = match self.remove_from_pool(&snapshot.node).await {
                    Ok(()) => {
                        info!("Removed node {} from failover pool", name);
                        summary.left += 1;
                        #[cfg(feature = "metrics")]
                        metrics::inc_transition(transition.as_str());
                        true
                    }
                    Err(e) => {
                        warn!("Failed to remove node {} from failover pool: {}", name, e);
                        summary.mutation_errors += 1;
                        #[cfg(feature = "metrics")]
                        metrics::inc_mutation_error("remove_label");
                        false
                    }
                };

                // the slave is relocated even if the label write failed
                if let Some(slave) = &snapshot.slave_pod {
                    self.restart_slave(slave, summary).await;
                }
                removed
            }
        }
    }

    async fn restart_slave(&self, slave: &Pod, summary: &mut PassSummary) {
        let namespace = &self.config.slave_pod_namespace;
        let deployment = match resolve_owning_workload(&*self.store, slave, namespace).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                info!(
                    "Pod {} has no owning deployment, nothing to restart",
                    slave.name_any()
                );
                return;
            }
            Err(e) => {
                warn!("Failed to get deployment of pod {}: {}", slave.name_any(), e);
                summary.mutation_errors += 1;
                #[cfg(feature = "metrics")]
                metrics::inc_mutation_error("resolve_workload");
                return;
            }
        };

        let ns = deployment.namespace().unwrap_or_else(|| namespace.clone());
        let name = deployment.name_any();
        info!("Restarting deployment {}/{}", ns, name);

        match self.restart_deployment(deployment).await {
            Ok(()) => {
                summary.restarts += 1;
                #[cfg(feature = "metrics")]
                metrics::inc_restart();
            }
            Err(e) => {
                warn!("Failed to restart deployment {}/{}: {}", ns, name, e);
                summary.mutation_errors += 1;
                #[cfg(feature = "metrics")]
                metrics::inc_mutation_error("restart_workload");
            }
        }
    }

    async fn add_to_pool(&self, node: &Node) -> Result<()> {
        let label = &self.config.pool_label;
        let mut node = node.clone();
        node.labels_mut()
            .insert(label.key.clone(), label.value.clone());
        self.store.update_node(&node).await
    }

    async fn remove_from_pool(&self, node: &Node) -> Result<()> {
        let mut node = node.clone();
        node.labels_mut().remove(&self.config.pool_label.key);
        self.store.update_node(&node).await
    }

    async fn restart_deployment(&self, mut deployment: Deployment) -> Result<()> {
        stamp_restart(&mut deployment, Utc::now());
        self.store.update_deployment(&deployment).await
    }
}
