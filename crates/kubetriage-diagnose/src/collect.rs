//! Evidence collector: assembles a deployment snapshot from cluster reads.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, warn};

use kubetriage_k8s::{ClusterError, ClusterReader};
use kubetriage_types::{CollectionError, DeploymentSnapshot, EvidenceKind};

/// Assembles a [`DeploymentSnapshot`] for one deployment.
///
/// The deployment fetch is fatal when it fails; every other sub-fetch
/// downgrades to a recorded [`CollectionError`] with an empty sub-result, so
/// the engine can always run on whatever evidence is available.
pub struct EvidenceCollector<'a, R: ClusterReader> {
    reader: &'a R,
}

impl<'a, R: ClusterReader> EvidenceCollector<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Perform a fresh point-in-time collection run.
    ///
    /// Returns the snapshot together with any non-fatal collection errors.
    /// Fails only when the arguments are invalid or the deployment itself
    /// cannot be fetched.
    pub async fn collect(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(DeploymentSnapshot, Vec<CollectionError>), ClusterError> {
        if namespace.trim().is_empty() {
            return Err(ClusterError::InvalidArgument(
                "namespace must not be empty".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(ClusterError::InvalidArgument(
                "deployment name must not be empty".to_string(),
            ));
        }

        // The deployment anchors the snapshot; without it there is nothing
        // to diagnose.
        let deployment = self.reader.get_deployment(namespace, name).await?;
        debug!(
            deployment = %deployment.name,
            desired = deployment.desired_replicas,
            ready = deployment.ready_replicas,
            "fetched deployment"
        );

        let mut errors = Vec::new();

        // Independent reads run concurrently and join before diagnosis.
        let (rs_result, pods_result, events_result) = futures::join!(
            self.reader
                .list_replica_sets(namespace, &deployment.selector, &deployment.uid),
            self.reader.list_pods(namespace, &deployment.selector),
            self.reader.list_events(namespace, None),
        );

        let mut replica_sets =
            record_degraded(rs_result, EvidenceKind::ReplicaSets, &mut errors);
        let mut pods = record_degraded(pods_result, EvidenceKind::Pods, &mut errors);
        let mut events = record_degraded(events_result, EvidenceKind::Events, &mut errors);

        // Newest first.
        replica_sets.sort_by(|a, b| b.created.cmp(&a.created));
        events.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        // Keep the snapshot internally consistent: when the owning
        // ReplicaSets are known, drop selector matches owned by something
        // else. When the ReplicaSet fetch degraded, keep everything.
        if !replica_sets.is_empty() {
            let owner_uids: HashSet<&str> =
                replica_sets.iter().map(|rs| rs.uid.as_str()).collect();
            pods.retain(|p| {
                p.owner_uid
                    .as_deref()
                    .is_none_or(|uid| owner_uids.contains(uid))
            });
        }

        let snapshot = DeploymentSnapshot {
            deployment,
            replica_sets,
            pods,
            events,
            collected_at: Utc::now(),
        };

        Ok((snapshot, errors))
    }
}

/// Downgrade a sub-fetch failure to a recorded error and an empty result.
fn record_degraded<T>(
    result: Result<Vec<T>, ClusterError>,
    resource: EvidenceKind,
    errors: &mut Vec<CollectionError>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(resource = resource.as_str(), error = %e, "collection degraded");
            errors.push(CollectionError::new(resource, e.to_string()));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use kubetriage_types::{DeploymentDetail, EventRecord, PodInfo, ReplicaSetInfo};

    #[derive(Default)]
    struct MockReader {
        deployment: Option<DeploymentDetail>,
        replica_sets: Vec<ReplicaSetInfo>,
        pods: Vec<PodInfo>,
        events: Vec<EventRecord>,
        fail_replica_sets: bool,
        fail_pods: bool,
        fail_events: bool,
    }

    fn timed_out(operation: &'static str) -> ClusterError {
        ClusterError::Timeout {
            operation,
            timeout: Duration::from_secs(1),
        }
    }

    impl ClusterReader for MockReader {
        async fn get_deployment(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<DeploymentDetail, ClusterError> {
            match &self.deployment {
                Some(d) => Ok(d.clone()),
                None => Err(ClusterError::NotFound {
                    kind: "Deployment",
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                }),
            }
        }

        async fn list_replica_sets(
            &self,
            _namespace: &str,
            _selector: &HashMap<String, String>,
            owner_uid: &str,
        ) -> Result<Vec<ReplicaSetInfo>, ClusterError> {
            if self.fail_replica_sets {
                return Err(timed_out("list replicasets"));
            }
            Ok(self
                .replica_sets
                .iter()
                .filter(|rs| rs.owner_uid.as_deref() == Some(owner_uid))
                .cloned()
                .collect())
        }

        async fn list_pods(
            &self,
            _namespace: &str,
            _selector: &HashMap<String, String>,
        ) -> Result<Vec<PodInfo>, ClusterError> {
            if self.fail_pods {
                return Err(timed_out("list pods"));
            }
            Ok(self.pods.clone())
        }

        async fn list_events(
            &self,
            _namespace: &str,
            _involved_name: Option<&str>,
        ) -> Result<Vec<EventRecord>, ClusterError> {
            if self.fail_events {
                return Err(timed_out("list events"));
            }
            Ok(self.events.clone())
        }

        async fn update_replica_count(
            &self,
            _namespace: &str,
            _name: &str,
            replicas: i32,
        ) -> Result<i32, ClusterError> {
            Ok(replicas)
        }
    }

    fn deployment(name: &str, uid: &str) -> DeploymentDetail {
        let mut d = DeploymentDetail::new(name.to_string(), "default".to_string());
        d.uid = uid.to_string();
        d
    }

    fn replica_set(name: &str, uid: &str, owner_uid: &str) -> ReplicaSetInfo {
        ReplicaSetInfo {
            name: name.to_string(),
            uid: uid.to_string(),
            owner_uid: Some(owner_uid.to_string()),
            desired_replicas: 1,
            ready_replicas: 1,
            created: None,
        }
    }

    fn pod(name: &str, owner_uid: Option<&str>) -> PodInfo {
        let mut p = PodInfo::new(name.to_string());
        p.owner_uid = owner_uid.map(str::to_string);
        p
    }

    #[tokio::test]
    async fn missing_deployment_is_fatal() {
        let reader = MockReader::default();
        let collector = EvidenceCollector::new(&reader);

        let err = collector.collect("default", "web").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_arguments_are_rejected_before_any_read() {
        let reader = MockReader {
            deployment: Some(deployment("web", "d1")),
            ..Default::default()
        };
        let collector = EvidenceCollector::new(&reader);

        assert!(matches!(
            collector.collect("", "web").await,
            Err(ClusterError::InvalidArgument(_))
        ));
        assert!(matches!(
            collector.collect("default", "  ").await,
            Err(ClusterError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn event_failure_degrades_without_aborting() {
        let reader = MockReader {
            deployment: Some(deployment("web", "d1")),
            replica_sets: vec![replica_set("web-abc", "rs1", "d1")],
            pods: vec![pod("web-abc-xyz", Some("rs1"))],
            fail_events: true,
            ..Default::default()
        };
        let collector = EvidenceCollector::new(&reader);

        let (snapshot, errors) = collector.collect("default", "web").await.unwrap();
        assert_eq!(snapshot.pods.len(), 1);
        assert!(snapshot.events.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].resource, EvidenceKind::Events);
    }

    #[tokio::test]
    async fn pods_owned_by_foreign_replica_sets_are_dropped() {
        let reader = MockReader {
            deployment: Some(deployment("web", "d1")),
            replica_sets: vec![replica_set("web-abc", "rs1", "d1")],
            pods: vec![
                pod("web-abc-xyz", Some("rs1")),
                pod("impostor", Some("rs-other")),
                pod("orphan", None),
            ],
            ..Default::default()
        };
        let collector = EvidenceCollector::new(&reader);

        let (snapshot, errors) = collector.collect("default", "web").await.unwrap();
        assert!(errors.is_empty());

        let names: Vec<_> = snapshot.pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["web-abc-xyz", "orphan"]);
    }

    #[tokio::test]
    async fn replica_set_failure_keeps_all_selector_matched_pods() {
        let reader = MockReader {
            deployment: Some(deployment("web", "d1")),
            pods: vec![pod("web-abc-xyz", Some("rs1"))],
            fail_replica_sets: true,
            ..Default::default()
        };
        let collector = EvidenceCollector::new(&reader);

        let (snapshot, errors) = collector.collect("default", "web").await.unwrap();
        assert_eq!(snapshot.pods.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].resource, EvidenceKind::ReplicaSets);
    }
}
