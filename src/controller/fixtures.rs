//! Builders for the node, pod and deployment objects used across the
//! controller tests

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Node, NodeCondition, NodeStatus, Pod, PodCondition, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::api::ObjectMeta;

use super::topology::{POD_TEMPLATE_HASH_LABEL, REPLICA_SET_KIND};

pub const POOL_KEY: &str = "pool";
pub const OPERATOR_NS: &str = "failover-system";
pub const SLAVE_NS: &str = "apps";

pub fn node(name: &str, ready: bool, in_pool: bool) -> Node {
    let mut labels = BTreeMap::from([("role".to_string(), "worker".to_string())]);
    if in_pool {
        labels.insert(POOL_KEY.to_string(), "true".to_string());
    }
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

fn pod(name: &str, namespace: &str, node: &str, app: &str, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn master(name: &str, node: &str, ready: bool) -> Pod {
    pod(name, OPERATOR_NS, node, "master", ready)
}

pub fn terminating(mut pod: Pod) -> Pod {
    pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
    pod
}

/// Pool-bound slave pod owned by ReplicaSet `<deployment>-<hash>`
pub fn slave(name: &str, node: &str, deployment: &str) -> Pod {
    let hash = "6d4cf56db6";
    let mut p = pod(name, SLAVE_NS, node, "slave", true);
    if let Some(spec) = p.spec.as_mut() {
        spec.node_selector = Some(BTreeMap::from([(POOL_KEY.to_string(), "true".to_string())]));
    }
    if let Some(labels) = p.metadata.labels.as_mut() {
        labels.insert(POD_TEMPLATE_HASH_LABEL.to_string(), hash.to_string());
    }
    p.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: REPLICA_SET_KIND.to_string(),
        name: format!("{}-{}", deployment, hash),
        uid: format!("uid-{}", deployment),
        controller: Some(true),
        ..Default::default()
    }]);
    p
}

/// Pool-bound slave pod with no owner at all
pub fn unmanaged_slave(name: &str, node: &str) -> Pod {
    let mut p = slave(name, node, "unused");
    p.metadata.owner_references = None;
    p
}

pub fn deployment(name: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(SLAVE_NS.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec::default()),
        status: None,
    }
}
