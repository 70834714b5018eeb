//! Read interface the diagnostic pipeline depends on.
//!
//! The evidence collector is generic over this trait so it can run against
//! the real cluster in production and an in-memory fake in tests.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use kubetriage_types::{DeploymentDetail, EventRecord, PodInfo, ReplicaSetInfo};

/// Errors from cluster access.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Api(#[from] kube::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Narrow read interface over the cluster, plus the scale write counterpart.
///
/// Every call is bounded by the implementation's per-call timeout; an elapsed
/// deadline surfaces as [`ClusterError::Timeout`].
pub trait ClusterReader {
    /// Fetch a single Deployment. Absence is [`ClusterError::NotFound`].
    fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<DeploymentDetail, ClusterError>>;

    /// List ReplicaSets matching `selector` and owned by `owner_uid`.
    fn list_replica_sets(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
        owner_uid: &str,
    ) -> impl Future<Output = Result<Vec<ReplicaSetInfo>, ClusterError>>;

    /// List Pods matching `selector`, with owner UIDs recorded from their
    /// ownerReferences.
    fn list_pods(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> impl Future<Output = Result<Vec<PodInfo>, ClusterError>>;

    /// List recent events, optionally restricted to one involved object.
    fn list_events(
        &self,
        namespace: &str,
        involved_name: Option<&str>,
    ) -> impl Future<Output = Result<Vec<EventRecord>, ClusterError>>;

    /// Set the replica count of a deployment, returning the accepted value.
    fn update_replica_count(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> impl Future<Output = Result<i32, ClusterError>>;
}
