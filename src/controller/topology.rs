//! Locating the master and slave pods on a node, and the deployment that
//! owns a slave pod.
//!
//! When several pods qualify the one with the lexicographically smallest
//! name is chosen, so repeated passes over the same cluster state always
//! pick the same pod regardless of list order.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::selector::{FieldSelector, Selector};
use crate::store::ClusterStore;

/// Label the ReplicaSet controller stamps on every pod it creates
pub const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";

/// Owner kind that links a pod back to a Deployment
pub const REPLICA_SET_KIND: &str = "ReplicaSet";

fn first_by_name(pods: impl IntoIterator<Item = Pod>) -> Option<Pod> {
    pods.into_iter().min_by_key(|p| p.name_any())
}

/// Master pod scheduled on `node`, looked up in the operator's namespace
pub async fn find_master_pod<S: ClusterStore + ?Sized>(
    store: &S,
    node: &Node,
    namespace: &str,
    master_selector: &Selector,
) -> Result<Option<Pod>> {
    let on_node = FieldSelector::node_name(node.name_any());
    let pods = store
        .list_pods(namespace, Some(&on_node), Some(master_selector))
        .await?;
    Ok(first_by_name(pods))
}

/// Whether the pod's scheduling constraints mention the pool label key
///
/// Checks `spec.nodeSelector` and the required terms of the pod's node
/// affinity. Only such pods are bound to failover-pool nodes and are
/// candidates for relocation.
pub fn targets_pool(pod: &Pod, pool_key: &str) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };

    if spec
        .node_selector
        .as_ref()
        .is_some_and(|sel| sel.contains_key(pool_key))
    {
        return true;
    }

    spec.affinity
        .as_ref()
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref())
        .map(|required| {
            required.node_selector_terms.iter().any(|term| {
                term.match_expressions
                    .iter()
                    .flatten()
                    .any(|expr| expr.key == pool_key)
            })
        })
        .unwrap_or(false)
}

/// Pool-bound slave pod scheduled on `node`
pub async fn find_slave_pod<S: ClusterStore + ?Sized>(
    store: &S,
    node: &Node,
    namespace: &str,
    slave_selector: &Selector,
    pool_key: &str,
) -> Result<Option<Pod>> {
    let on_node = FieldSelector::node_name(node.name_any());
    let pods = store
        .list_pods(namespace, Some(&on_node), Some(slave_selector))
        .await?;

    let total = pods.len();
    let eligible = first_by_name(pods.into_iter().filter(|p| targets_pool(p, pool_key)));
    if eligible.is_none() && total > 0 {
        debug!(
            "{} slave pod(s) on node {} but none target pool key {}",
            total,
            node.name_any(),
            pool_key
        );
    }
    Ok(eligible)
}

/// Deployment name from a ReplicaSet name by stripping `-<pod-template-hash>`
///
/// Fails with `NotFound` rather than guessing when the suffix is absent.
pub fn derive_workload_name(owner_name: &str, pod_template_hash: &str) -> Result<String> {
    let not_found = || Error::NotFound {
        kind: "Deployment".to_string(),
        name: owner_name.to_string(),
        namespace: String::new(),
    };

    if pod_template_hash.is_empty() {
        return Err(not_found());
    }
    owner_name
        .strip_suffix(pod_template_hash)
        .and_then(|rest| rest.strip_suffix('-'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(not_found)
}

/// Deployment owning `pod` through its ReplicaSet
///
/// `Ok(None)` for pods without a ReplicaSet owner. A ReplicaSet owner whose
/// deployment cannot be found is an error.
pub async fn resolve_owning_workload<S: ClusterStore + ?Sized>(
    store: &S,
    pod: &Pod,
    namespace: &str,
) -> Result<Option<Deployment>> {
    let Some(owner) = pod
        .owner_references()
        .iter()
        .find(|o| o.kind == REPLICA_SET_KIND)
    else {
        debug!("Pod {} has no {} owner", pod.name_any(), REPLICA_SET_KIND);
        return Ok(None);
    };

    let hash = pod
        .labels()
        .get(POD_TEMPLATE_HASH_LABEL)
        .map(String::as_str)
        .unwrap_or_default();

    let name = derive_workload_name(&owner.name, hash).map_err(|_| Error::NotFound {
        kind: "Deployment".to_string(),
        name: owner.name.clone(),
        namespace: namespace.to_string(),
    })?;

    store.get_deployment(namespace, &name).await.map(Some)
}
