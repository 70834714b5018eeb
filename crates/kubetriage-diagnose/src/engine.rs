//! Diagnostic engine: reduces a deployment snapshot to ordered findings.
//!
//! `diagnose` is a pure function of the snapshot. It performs no I/O, never
//! panics on partial data (missing sub-collections are treated as empty), and
//! is deterministic regardless of how the snapshot was assembled.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use kubetriage_types::{
    ContainerState, DeploymentDetail, DeploymentSnapshot, EventRecord, EvidenceRef, Finding,
    FindingCategory, PodInfo, Severity,
};

/// Tunable thresholds for rule evaluation.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosisConfig {
    /// Restart count above which repeated `Error` exits count as a crash loop.
    pub restart_threshold: i32,
    /// How long a replica shortfall must persist before it is reported.
    pub grace_period: Duration,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            restart_threshold: 3,
            grace_period: Duration::seconds(120),
        }
    }
}

/// Diagnose a deployment snapshot.
///
/// Checks run as an independent pipeline; multiple simultaneous root causes
/// all surface. Output is ordered by severity (critical first), then by
/// category declaration order, and never empty.
pub fn diagnose(snapshot: &DeploymentSnapshot, config: &DiagnosisConfig) -> Vec<Finding> {
    // A snapshot that owns no pods carries too little container evidence for
    // the pipeline below; it reduces to exactly one finding.
    if snapshot.pods.is_empty() {
        return vec![no_pods_finding(snapshot)];
    }

    let mut findings = Vec::new();

    if let Some(finding) = scaling_check(snapshot, config) {
        findings.push(finding);
    }
    findings.extend(container_checks(snapshot, config));

    if findings.is_empty() {
        findings.push(fallback_finding(&snapshot.deployment));
    }

    findings.sort_by_key(Finding::sort_key);
    findings
}

/// The single finding for a pod-less snapshot.
fn no_pods_finding(snapshot: &DeploymentSnapshot) -> Finding {
    if let Some(event) = snapshot
        .events
        .iter()
        .find(|e| e.reason.as_deref() == Some("FailedScheduling") && involves_owned_pod(snapshot, e))
    {
        let detail = event
            .message
            .clone()
            .unwrap_or_else(|| "scheduling failed".to_string());
        return Finding::new(
            FindingCategory::SchedulingFailure,
            Severity::Critical,
            format!("no pods are running: {}", detail),
        )
        .with_evidence(vec![EvidenceRef {
            pod: event.involved_name.clone().unwrap_or_default(),
            container: None,
            event_reason: event.reason.clone(),
        }]);
    }

    let message = if snapshot.deployment.desired_replicas == 0 {
        "deployment is scaled to zero; no pods to inspect".to_string()
    } else {
        "no owned pods and no scheduling events were found; evidence is insufficient to diagnose"
            .to_string()
    };
    Finding::new(FindingCategory::Unknown, Severity::Info, message)
}

/// Whether an event targets a pod this deployment could own. With no pods in
/// the snapshot to match against, ownership is judged by name prefix: pods
/// are named "<replicaset>-<hash>" and ReplicaSets "<deployment>-<hash>".
/// Events for other workloads in the namespace must not be attributed here.
fn involves_owned_pod(snapshot: &DeploymentSnapshot, event: &EventRecord) -> bool {
    let Some(name) = event.involved_name.as_deref() else {
        return false;
    };

    name.starts_with(&format!("{}-", snapshot.deployment.name))
        || snapshot
            .replica_sets
            .iter()
            .any(|rs| name.starts_with(&format!("{}-", rs.name)))
}

/// Report a replica shortfall that has outlived the grace period.
fn scaling_check(snapshot: &DeploymentSnapshot, config: &DiagnosisConfig) -> Option<Finding> {
    let deployment = &snapshot.deployment;
    if deployment.desired_replicas <= 0
        || deployment.ready_replicas >= deployment.desired_replicas
    {
        return None;
    }
    if !grace_elapsed(deployment, snapshot.collected_at, config.grace_period) {
        return None;
    }

    let severity = if deployment.ready_replicas == 0 {
        Severity::Critical
    } else {
        Severity::Warning
    };
    Some(Finding::new(
        FindingCategory::ScalingBlocked,
        severity,
        format!(
            "only {} of {} desired replicas are ready",
            deployment.ready_replicas, deployment.desired_replicas
        ),
    ))
}

/// Whether the shortfall is older than the grace period, judged from the
/// newest non-True condition transition. A deployment without condition
/// history gets no grace.
fn grace_elapsed(deployment: &DeploymentDetail, now: DateTime<Utc>, grace: Duration) -> bool {
    let latest = deployment
        .conditions
        .iter()
        .filter(|c| c.status != "True")
        .filter_map(|c| c.last_transition)
        .max()
        .or_else(|| {
            deployment
                .conditions
                .iter()
                .filter_map(|c| c.last_transition)
                .max()
        });

    match latest {
        Some(since) => now.signed_duration_since(since) >= grace,
        None => true,
    }
}

/// A single container's classification.
struct Verdict {
    category: FindingCategory,
    reason: String,
    event_reason: Option<String>,
}

#[derive(Default)]
struct Bucket {
    reasons: BTreeSet<String>,
    evidence: Vec<EvidenceRef>,
}

/// Classify every container and merge per-category so N replicas sharing one
/// failure yield one finding.
fn container_checks(snapshot: &DeploymentSnapshot, config: &DiagnosisConfig) -> Vec<Finding> {
    let mut buckets: BTreeMap<FindingCategory, Bucket> = BTreeMap::new();

    for pod in &snapshot.pods {
        for container in &pod.containers {
            if let Some(verdict) = classify_container(pod, container, snapshot, config) {
                let bucket = buckets.entry(verdict.category).or_default();
                bucket.reasons.insert(verdict.reason);
                bucket.evidence.push(EvidenceRef {
                    pod: pod.name.clone(),
                    container: Some(container.name.clone()),
                    event_reason: verdict.event_reason,
                });
            }
        }
    }

    buckets
        .into_iter()
        .map(|(category, mut bucket)| {
            bucket.evidence.sort();
            bucket.evidence.dedup();

            let pods: BTreeSet<&str> = bucket.evidence.iter().map(|e| e.pod.as_str()).collect();
            let reasons: Vec<&str> = bucket.reasons.iter().map(String::as_str).collect();
            let message = format!(
                "{} ({} container(s) across {} pod(s))",
                reasons.join(", "),
                bucket.evidence.len(),
                pods.len()
            );

            Finding::new(category, category_severity(category), message)
                .with_evidence(bucket.evidence)
        })
        .collect()
}

/// Fixed precedence table for one container's state.
fn classify_container(
    pod: &PodInfo,
    container: &ContainerState,
    snapshot: &DeploymentSnapshot,
    config: &DiagnosisConfig,
) -> Option<Verdict> {
    if let Some(waiting) = container.waiting_reason.as_deref() {
        match waiting {
            "ImagePullBackOff" | "ErrImagePull" => {
                return Some(Verdict {
                    category: FindingCategory::ImagePullFailure,
                    reason: waiting.to_string(),
                    event_reason: None,
                });
            }
            "CrashLoopBackOff" => {
                return Some(Verdict {
                    category: FindingCategory::CrashLoop,
                    reason: waiting.to_string(),
                    event_reason: None,
                });
            }
            _ => {}
        }
    }

    if container.restart_count > config.restart_threshold
        && container.last_terminated_reason.as_deref() == Some("Error")
    {
        return Some(Verdict {
            category: FindingCategory::CrashLoop,
            reason: "repeated Error exits".to_string(),
            event_reason: None,
        });
    }

    if container.terminated_reason.as_deref() == Some("OOMKilled")
        || container.last_terminated_reason.as_deref() == Some("OOMKilled")
    {
        return Some(Verdict {
            category: FindingCategory::ResourceExhaustion,
            reason: "OOMKilled".to_string(),
            event_reason: None,
        });
    }

    if !container.ready {
        if let Some(event) = snapshot
            .events_for(&pod.name)
            .find(|e| e.reason.as_deref() == Some("FailedScheduling"))
        {
            return Some(Verdict {
                category: FindingCategory::SchedulingFailure,
                reason: "FailedScheduling".to_string(),
                event_reason: event.reason.clone(),
            });
        }
        if let Some(event) = snapshot.events_for(&pod.name).find(|e| is_probe_failure(e)) {
            return Some(Verdict {
                category: FindingCategory::ProbeFailure,
                reason: "probe failures reported".to_string(),
                event_reason: event.reason.clone(),
            });
        }
    }

    None
}

fn is_probe_failure(event: &EventRecord) -> bool {
    event.reason.as_deref() == Some("Unhealthy")
        && event
            .message
            .as_deref()
            .is_some_and(|m| m.contains("probe failed"))
}

fn category_severity(category: FindingCategory) -> Severity {
    match category {
        FindingCategory::ImagePullFailure
        | FindingCategory::CrashLoop
        | FindingCategory::ResourceExhaustion
        | FindingCategory::SchedulingFailure => Severity::Critical,
        FindingCategory::ProbeFailure => Severity::Warning,
        FindingCategory::ScalingBlocked => Severity::Warning,
        FindingCategory::Healthy | FindingCategory::Unknown => Severity::Info,
    }
}

/// Emitted only when no check fired.
fn fallback_finding(deployment: &DeploymentDetail) -> Finding {
    if deployment.desired_replicas == deployment.ready_replicas
        && deployment.desired_replicas == deployment.available_replicas
    {
        Finding::new(
            FindingCategory::Healthy,
            Severity::Info,
            format!(
                "all {} desired replicas are ready and available",
                deployment.desired_replicas
            ),
        )
    } else {
        Finding::new(
            FindingCategory::Unknown,
            Severity::Info,
            "no failure signals were found but replica counts disagree; \
             evidence is insufficient to diagnose",
        )
    }
}
