//! Cluster state store
//!
//! Everything the failover engine reads from or writes to the cluster goes
//! through [`ClusterStore`]. The reconciler is generic over it, so the same
//! decision code runs against the API server ([`KubeStore`]) and, in tests,
//! against an in-process fake (`InMemoryStore`).

mod kube_store;
#[cfg(test)]
mod memory;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};

use crate::error::Result;
use crate::selector::{FieldSelector, Selector};

pub use kube_store::{KubeStore, SERVICE_ACCOUNT_NAMESPACE_PATH};
#[cfg(test)]
pub use memory::{InMemoryStore, Mutation};

#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// List cluster nodes matching the label selector
    async fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>>;

    /// List pods in a namespace, optionally filtered by field and label selector
    async fn list_pods(
        &self,
        namespace: &str,
        field_selector: Option<&FieldSelector>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<Pod>>;

    /// Fetch a deployment; a missing object is reported as `Error::NotFound`
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    /// Persist a modified node (labels)
    async fn update_node(&self, node: &Node) -> Result<()>;

    /// Persist a modified deployment (pod template annotations)
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Namespace the operator itself runs in
    async fn current_namespace(&self) -> Result<String>;
}
