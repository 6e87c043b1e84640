//! [`ClusterStore`] backed by the Kubernetes API server

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{Api, ListParams, PostParams},
    Client, ResourceExt,
};
use tracing::{debug, instrument};

use super::ClusterStore;
use crate::error::{Error, Result};
use crate::selector::{FieldSelector, Selector};

/// Where the kubelet mounts the pod's own namespace
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Store talking to a live cluster through kube-rs
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    namespace_override: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace_override: None,
        }
    }

    /// Use a fixed namespace instead of the service account mount,
    /// needed when running outside the cluster
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace_override = namespace;
        self
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    #[instrument(skip(self, selector), fields(selector = %selector))]
    async fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = ListParams::default().labels_from(selector);
        let nodes = api.list(&params).await.map_err(Error::KubeError)?;
        debug!("Listed {} nodes", nodes.items.len());
        Ok(nodes.items)
    }

    #[instrument(skip(self, field_selector, label_selector))]
    async fn list_pods(
        &self,
        namespace: &str,
        field_selector: Option<&FieldSelector>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(fs) = field_selector {
            params = params.fields(&fs.to_query());
        }
        if let Some(ls) = label_selector {
            params = params.labels_from(ls);
        }
        let pods = api.list(&params).await.map_err(Error::KubeError)?;
        Ok(pods.items)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(Error::KubeError)?
            .ok_or_else(|| Error::NotFound {
                kind: "Deployment".to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.replace(&node.name_any(), &PostParams::default(), node)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let namespace = deployment
            .namespace()
            .ok_or_else(|| Error::StoreError("deployment has no namespace".to_string()))?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn current_namespace(&self) -> Result<String> {
        match &self.namespace_override {
            Some(ns) => Ok(ns.clone()),
            None => read_namespace_file(Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH)).await,
        }
    }
}

/// Trimmed content of a namespace file; an empty file is an error
async fn read_namespace_file(path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::StoreError(format!(
            "failed to read current namespace from {}: {}",
            path.display(),
            e
        ))
    })?;
    let ns = raw.trim();
    if ns.is_empty() {
        return Err(Error::StoreError(format!("{} is empty", path.display())));
    }
    Ok(ns.to_string())
}
