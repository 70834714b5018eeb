//! Kubernetes client for kubetriage

use std::collections::HashMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::Api;
use kube::api::{ListParams, Patch, PatchParams};
use tracing::debug;

use crate::reader::{ClusterError, ClusterReader};
use kubetriage_types::{
    ContainerState, DeploymentCondition, DeploymentDetail, EventRecord, PodInfo, PodPhase,
    ReplicaSetInfo,
};

/// Kubernetes client wrapper with a per-call timeout.
///
/// Credentials come from the ambient kubeconfig context; this client does not
/// manage or rotate them.
pub struct KubeClient {
    client: kube::Client,
    timeout: Duration,
}

impl KubeClient {
    /// Create a new KubeClient from the ambient kubeconfig context.
    pub async fn new(timeout: Duration) -> Result<Self, ClusterError> {
        let client = kube::Client::try_default().await?;
        Ok(Self { client, timeout })
    }

    /// Bound a cluster call by the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, ClusterError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ClusterError::Api(e)),
            Err(_) => Err(ClusterError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    /// List deployments in one namespace, or across all namespaces.
    pub async fn list_deployments(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<DeploymentDetail>, ClusterError> {
        let deployments: Api<Deployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let list = self
            .bounded("list deployments", deployments.list(&ListParams::default()))
            .await?;

        debug!(count = list.items.len(), "listed deployments");
        Ok(list.items.into_iter().map(deployment_to_detail).collect())
    }
}

impl ClusterReader for KubeClient {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DeploymentDetail, ClusterError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);

        match self
            .bounded("get deployment", deployments.get_opt(name))
            .await?
        {
            Some(deploy) => Ok(deployment_to_detail(deploy)),
            None => Err(ClusterError::NotFound {
                kind: "Deployment",
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
        }
    }

    async fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
        owner_uid: &str,
    ) -> Result<Vec<ReplicaSetInfo>, ClusterError> {
        let replica_sets: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));

        let list = self
            .bounded("list replicasets", replica_sets.list(&params))
            .await?;

        Ok(list
            .items
            .into_iter()
            .map(replica_set_to_info)
            .filter(|rs| rs.owner_uid.as_deref() == Some(owner_uid))
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));

        let list = self.bounded("list pods", pods.list(&params)).await?;

        Ok(list.items.into_iter().map(pod_to_info).collect())
    }

    async fn list_events(
        &self,
        namespace: &str,
        involved_name: Option<&str>,
    ) -> Result<Vec<EventRecord>, ClusterError> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let params = match involved_name {
            Some(name) => ListParams::default().fields(&format!("involvedObject.name={}", name)),
            None => ListParams::default(),
        };

        let list = self.bounded("list events", events.list(&params)).await?;

        Ok(list.items.into_iter().map(event_to_record).collect())
    }

    async fn update_replica_count(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<i32, ClusterError> {
        let replicas = non_negative_replicas(replicas)?;

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        let scale = self
            .bounded(
                "scale deployment",
                deployments.patch_scale(name, &PatchParams::default(), &Patch::Merge(&patch)),
            )
            .await
            .map_err(|e| match e {
                ClusterError::Api(kube::Error::Api(ref resp)) if resp.code == 404 => {
                    ClusterError::NotFound {
                        kind: "Deployment",
                        name: name.to_string(),
                        namespace: namespace.to_string(),
                    }
                }
                other => other,
            })?;

        Ok(scale
            .spec
            .and_then(|s| s.replicas)
            .unwrap_or(replicas))
    }
}

/// Scale guard; rejected values never reach the API.
fn non_negative_replicas(replicas: i32) -> Result<i32, ClusterError> {
    if replicas < 0 {
        return Err(ClusterError::InvalidArgument(format!(
            "replica count must be non-negative, got {}",
            replicas
        )));
    }
    Ok(replicas)
}

/// Build a label selector string from match labels.
fn label_selector(selector: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// Convert a k8s Deployment to DeploymentDetail
fn deployment_to_detail(deploy: Deployment) -> DeploymentDetail {
    let name = deploy.metadata.name.unwrap_or_default();
    let namespace = deploy.metadata.namespace.unwrap_or_default();
    let mut detail = DeploymentDetail::new(name, namespace);

    detail.uid = deploy.metadata.uid.unwrap_or_default();
    detail.created = deploy.metadata.creation_timestamp.map(|t| t.0);

    if let Some(labels) = deploy.metadata.labels {
        detail.labels = labels.into_iter().collect();
    }
    if let Some(annotations) = deploy.metadata.annotations {
        detail.annotations = annotations.into_iter().collect();
    }

    if let Some(spec) = deploy.spec {
        detail.desired_replicas = spec.replicas.unwrap_or(0);
        detail.strategy = spec.strategy.and_then(|s| s.type_);

        // Get the selector labels (convert BTreeMap to HashMap)
        if let Some(selector) = spec.selector.match_labels {
            detail.selector = selector.into_iter().collect();
        }
    }

    if let Some(status) = deploy.status {
        detail.available_replicas = status.available_replicas.unwrap_or(0);
        detail.ready_replicas = status.ready_replicas.unwrap_or(0);

        if let Some(conditions) = status.conditions {
            detail.conditions = conditions
                .into_iter()
                .map(|c| DeploymentCondition {
                    kind: c.type_,
                    status: c.status,
                    reason: c.reason,
                    message: c.message,
                    last_transition: c.last_transition_time.map(|t| t.0),
                })
                .collect();
        }
    }

    detail
}

/// Convert a k8s ReplicaSet to ReplicaSetInfo
fn replica_set_to_info(rs: ReplicaSet) -> ReplicaSetInfo {
    let owner_uid = rs
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.kind == "Deployment"))
        .map(|r| r.uid.clone());

    ReplicaSetInfo {
        name: rs.metadata.name.unwrap_or_default(),
        uid: rs.metadata.uid.unwrap_or_default(),
        owner_uid,
        desired_replicas: rs.spec.and_then(|s| s.replicas).unwrap_or(0),
        ready_replicas: rs
            .status
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0),
        created: rs.metadata.creation_timestamp.map(|t| t.0),
    }
}

/// Convert a k8s Pod to PodInfo
fn pod_to_info(pod: Pod) -> PodInfo {
    let name = pod.metadata.name.unwrap_or_default();
    let mut info = PodInfo::new(name);

    info.uid = pod.metadata.uid.unwrap_or_default();
    info.owner_uid = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.kind == "ReplicaSet"))
        .map(|r| r.uid.clone());

    if let Some(spec) = &pod.spec {
        info.node_name = spec.node_name.clone();

        // Resource requests/limits of the first container carrying them.
        for container in &spec.containers {
            if let Some(resources) = &container.resources {
                if let Some(requests) = &resources.requests {
                    for (k, v) in requests {
                        info.requests.insert(k.clone(), v.0.clone());
                    }
                }
                if let Some(limits) = &resources.limits {
                    for (k, v) in limits {
                        info.limits.insert(k.clone(), v.0.clone());
                    }
                }
            }
        }
    }

    if let Some(status) = pod.status {
        info.phase = status
            .phase
            .as_deref()
            .map(PodPhase::from)
            .unwrap_or(PodPhase::Unknown);

        info.ready = status
            .conditions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");

        if let Some(container_statuses) = status.container_statuses {
            info.containers = container_statuses
                .into_iter()
                .map(|cs| {
                    let mut container = ContainerState::new(cs.name);
                    container.ready = cs.ready;
                    container.restart_count = cs.restart_count;

                    if let Some(state) = cs.state {
                        if let Some(waiting) = state.waiting {
                            container.waiting_reason = waiting.reason;
                            container.waiting_message = waiting.message;
                        }
                        if let Some(terminated) = state.terminated {
                            container.terminated_reason = terminated.reason;
                        }
                    }
                    if let Some(last) = cs.last_state {
                        if let Some(terminated) = last.terminated {
                            container.last_terminated_reason = terminated.reason;
                        }
                    }

                    container
                })
                .collect();
        }
    }

    info
}

/// Convert a k8s Event to EventRecord
fn event_to_record(event: Event) -> EventRecord {
    let last_seen = event
        .last_timestamp
        .map(|t| t.0)
        .or_else(|| event.event_time.map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.map(|t| t.0));

    EventRecord {
        kind: event.type_.unwrap_or_default(),
        reason: event.reason,
        message: event.message,
        involved_kind: event.involved_object.kind,
        involved_name: event.involved_object.name,
        count: event.count.unwrap_or(1),
        last_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_replica_counts_are_rejected_before_any_write() {
        assert!(matches!(
            non_negative_replicas(-1),
            Err(ClusterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_and_positive_replica_counts_pass() {
        assert_eq!(non_negative_replicas(0).unwrap(), 0);
        assert_eq!(non_negative_replicas(5).unwrap(), 5);
    }

    #[test]
    fn label_selector_is_sorted_and_comma_joined() {
        let mut selector = HashMap::new();
        selector.insert("app".to_string(), "web".to_string());
        selector.insert("tier".to_string(), "frontend".to_string());

        assert_eq!(label_selector(&selector), "app=web,tier=frontend");
    }
}
