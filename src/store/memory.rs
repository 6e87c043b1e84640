//! In-memory [`ClusterStore`]
//!
//! Holds plain `k8s-openapi` objects, applies selectors locally and records
//! every write so tests can assert on exactly which mutations a pass issued.
//! Individual operations can be made to fail to exercise the error paths of
//! the reconciler.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;

use super::ClusterStore;
use crate::error::{Error, Result};
use crate::selector::{FieldSelector, Selector, SelectorExt};

/// A write issued against the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    UpdateNode {
        name: String,
        labels: BTreeMap<String, String>,
    },
    UpdateDeployment {
        namespace: String,
        name: String,
        template_annotations: BTreeMap<String, String>,
    },
}

#[derive(Default)]
struct State {
    namespace: Option<String>,
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    deployments: Vec<Deployment>,
    mutations: Vec<Mutation>,
    fail_list_nodes: bool,
    fail_list_pods: bool,
    fail_node_updates: HashSet<String>,
    fail_deployment_updates: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        let store = Self::default();
        store.lock().namespace = Some(namespace.into());
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic in one test must not cascade through the poisoned lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_node(&self, node: Node) {
        self.lock().nodes.push(node);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.lock().pods.push(pod);
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        self.lock().deployments.push(deployment);
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.lock()
            .nodes
            .iter()
            .find(|n| n.name_any() == name)
            .cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.lock()
            .deployments
            .iter()
            .find(|d| d.name_any() == name && d.namespace().as_deref() == Some(namespace))
            .cloned()
    }

    /// All writes issued so far, in order
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    pub fn fail_list_nodes(&self, fail: bool) {
        self.lock().fail_list_nodes = fail;
    }

    pub fn fail_list_pods(&self, fail: bool) {
        self.lock().fail_list_pods = fail;
    }

    pub fn fail_node_update(&self, name: &str) {
        self.lock().fail_node_updates.insert(name.to_string());
    }

    pub fn fail_deployment_update(&self, name: &str) {
        self.lock().fail_deployment_updates.insert(name.to_string());
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>> {
        let state = self.lock();
        if state.fail_list_nodes {
            return Err(Error::StoreError("injected list_nodes failure".to_string()));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| selector.matches(n.labels()))
            .cloned()
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        field_selector: Option<&FieldSelector>,
        label_selector: Option<&Selector>,
    ) -> Result<Vec<Pod>> {
        let state = self.lock();
        if state.fail_list_pods {
            return Err(Error::StoreError("injected list_pods failure".to_string()));
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace))
            .filter(|p| field_selector.map_or(true, |fs| fs.matches_pod(p)))
            .filter(|p| label_selector.map_or(true, |ls| ls.matches(p.labels())))
            .cloned()
            .collect())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        self.deployment(namespace, name).ok_or_else(|| Error::NotFound {
            kind: "Deployment".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        let name = node.name_any();
        let mut state = self.lock();
        if state.fail_node_updates.contains(&name) {
            return Err(Error::StoreError(format!(
                "injected update failure for node {}",
                name
            )));
        }
        let slot = state
            .nodes
            .iter_mut()
            .find(|n| n.name_any() == name)
            .ok_or_else(|| Error::NotFound {
                kind: "Node".to_string(),
                name: name.clone(),
                namespace: String::new(),
            })?;
        *slot = node.clone();
        state.mutations.push(Mutation::UpdateNode {
            name,
            labels: node.labels().clone(),
        });
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let name = deployment.name_any();
        let namespace = deployment.namespace().unwrap_or_default();
        let mut state = self.lock();
        if state.fail_deployment_updates.contains(&name) {
            return Err(Error::StoreError(format!(
                "injected update failure for deployment {}/{}",
                namespace, name
            )));
        }
        let slot = state
            .deployments
            .iter_mut()
            .find(|d| d.name_any() == name && d.namespace().as_deref() == Some(namespace.as_str()))
            .ok_or_else(|| Error::NotFound {
                kind: "Deployment".to_string(),
                name: name.clone(),
                namespace: namespace.clone(),
            })?;
        *slot = deployment.clone();
        let template_annotations = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default();
        state.mutations.push(Mutation::UpdateDeployment {
            namespace,
            name,
            template_annotations,
        });
        Ok(())
    }

    async fn current_namespace(&self) -> Result<String> {
        self.lock()
            .namespace
            .clone()
            .ok_or_else(|| Error::StoreError("no current namespace configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::parse_label_selector;
    use k8s_openapi::api::core::v1::PodSpec;
    use kube::api::ObjectMeta;

    fn pod(name: &str, namespace: &str, node: &str, app: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.into()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_list_pods_applies_namespace_field_and_labels() {
        let store = InMemoryStore::new("ops");
        store.add_pod(pod("a", "ops", "n1", "db"));
        store.add_pod(pod("b", "ops", "n2", "db"));
        store.add_pod(pod("c", "apps", "n1", "db"));
        store.add_pod(pod("d", "ops", "n1", "cache"));

        let fs = FieldSelector::node_name("n1");
        let ls = parse_label_selector("app=db").unwrap();
        let pods = store.list_pods("ops", Some(&fs), Some(&ls)).await.unwrap();

        let names: Vec<_> = pods.iter().map(|p| p.name_any()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn test_update_unknown_node_is_not_found() {
        let store = InMemoryStore::new("ops");
        let node = Node {
            metadata: ObjectMeta {
                name: Some("ghost".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = store.update_node(&node).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new("ops");
        store.fail_list_nodes(true);
        assert!(store
            .list_nodes(&Selector::default())
            .await
            .is_err());

        store.fail_list_pods(true);
        assert!(store.list_pods("ops", None, None).await.is_err());
    }
}
