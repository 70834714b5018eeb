//! Shared types for kubetriage
//!
//! This crate contains the data model used across the kubetriage crates: the
//! point-in-time deployment snapshot assembled by the evidence collector and
//! the findings produced by the diagnostic engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Detailed view of a Deployment's spec and status.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentDetail {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Label selector used to find owned ReplicaSets and Pods.
    pub selector: HashMap<String, String>,
    pub strategy: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub conditions: Vec<DeploymentCondition>,
}

impl DeploymentDetail {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            uid: String::new(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            selector: HashMap::new(),
            strategy: None,
            created: None,
            desired_replicas: 0,
            ready_replicas: 0,
            available_replicas: 0,
            conditions: Vec::new(),
        }
    }

    pub fn unavailable_replicas(&self) -> i32 {
        (self.desired_replicas - self.available_replicas).max(0)
    }

    /// Format replica status as "ready/desired"
    pub fn replica_status(&self) -> String {
        format!("{}/{}", self.ready_replicas, self.desired_replicas)
    }
}

/// One entry of a Deployment's status conditions.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentCondition {
    /// Condition type, e.g. "Available" or "Progressing".
    pub kind: String,
    /// "True", "False" or "Unknown".
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition: Option<DateTime<Utc>>,
}

/// A ReplicaSet owned by the target Deployment.
#[derive(Clone, Debug, Serialize)]
pub struct ReplicaSetInfo {
    pub name: String,
    pub uid: String,
    /// UID of the owning Deployment, if an owner reference was present.
    pub owner_uid: Option<String>,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

/// Pod information as seen at collection time.
#[derive(Clone, Debug, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub uid: String,
    /// UID of the owning ReplicaSet, if an owner reference was present.
    pub owner_uid: Option<String>,
    pub phase: PodPhase,
    /// True when the pod's "Ready" condition is "True".
    pub ready: bool,
    pub containers: Vec<ContainerState>,
    pub node_name: Option<String>,
    pub requests: HashMap<String, String>,
    pub limits: HashMap<String, String>,
}

impl PodInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            uid: String::new(),
            owner_uid: None,
            phase: PodPhase::Unknown,
            ready: false,
            containers: Vec::new(),
            node_name: None,
            requests: HashMap::new(),
            limits: HashMap::new(),
        }
    }
}

/// Per-container status derived from the pod's containerStatuses.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ContainerState {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub waiting_reason: Option<String>,
    pub waiting_message: Option<String>,
    pub terminated_reason: Option<String>,
    /// Termination reason of the previous run of this container.
    pub last_terminated_reason: Option<String>,
}

impl ContainerState {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// A cluster event relevant to the diagnosed deployment.
#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    /// "Normal" or "Warning".
    pub kind: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub involved_kind: Option<String>,
    pub involved_name: Option<String>,
    pub count: i32,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Point-in-time, best-effort aggregation of cluster evidence for one
/// deployment. Built once per diagnostic run and never mutated afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentSnapshot {
    pub deployment: DeploymentDetail,
    /// Owned ReplicaSets, newest first.
    pub replica_sets: Vec<ReplicaSetInfo>,
    /// Pods owned by the ReplicaSets above.
    pub pods: Vec<PodInfo>,
    /// Recent namespace events, newest first.
    pub events: Vec<EventRecord>,
    /// Collection time; the engine's reference clock for grace-period math.
    pub collected_at: DateTime<Utc>,
}

impl DeploymentSnapshot {
    /// Events involving the named object, newest first.
    pub fn events_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EventRecord> {
        self.events
            .iter()
            .filter(move |e| e.involved_name.as_deref() == Some(name))
    }
}

// ============================================================================
// Finding Types
// ============================================================================

/// Severity of a finding, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Ordinal for output ordering; lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Warning => 1,
            Self::Info => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

/// Root-cause classification, in fixed precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FindingCategory {
    ScalingBlocked,
    ImagePullFailure,
    CrashLoop,
    ResourceExhaustion,
    SchedulingFailure,
    ProbeFailure,
    Healthy,
    Unknown,
}

impl FindingCategory {
    /// Ordinal for output ordering within equal severity.
    pub fn rank(&self) -> u8 {
        match self {
            Self::ScalingBlocked => 0,
            Self::ImagePullFailure => 1,
            Self::CrashLoop => 2,
            Self::ResourceExhaustion => 3,
            Self::SchedulingFailure => 4,
            Self::ProbeFailure => 5,
            Self::Healthy => 6,
            Self::Unknown => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScalingBlocked => "ScalingBlocked",
            Self::ImagePullFailure => "ImagePullFailure",
            Self::CrashLoop => "CrashLoop",
            Self::ResourceExhaustion => "ResourceExhaustion",
            Self::SchedulingFailure => "SchedulingFailure",
            Self::ProbeFailure => "ProbeFailure",
            Self::Healthy => "Healthy",
            Self::Unknown => "Unknown",
        }
    }
}

/// Pointer from a finding back to the evidence that produced it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EvidenceRef {
    pub pod: String,
    pub container: Option<String>,
    /// Reason of the event that contributed, if any.
    pub event_reason: Option<String>,
}

/// A single diagnostic conclusion. Value object; created by the engine and
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub message: String,
    pub evidence: Vec<EvidenceRef>,
}

impl Finding {
    pub fn new(category: FindingCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceRef>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Sort key implementing the severity-then-category output order.
    pub fn sort_key(&self) -> (u8, u8) {
        (self.severity.rank(), self.category.rank())
    }
}

// ============================================================================
// Collection Errors
// ============================================================================

/// Which sub-fetch of a collection run degraded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EvidenceKind {
    ReplicaSets,
    Pods,
    Events,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplicaSets => "replicasets",
            Self::Pods => "pods",
            Self::Events => "events",
        }
    }
}

/// A non-fatal failure recorded while assembling a snapshot. Surfaced
/// alongside the findings so operators can judge diagnosis confidence.
#[derive(Clone, Debug, Serialize, Error)]
#[error("{}: {}", .resource.as_str(), .message)]
pub struct CollectionError {
    pub resource: EvidenceKind,
    pub message: String,
}

impl CollectionError {
    pub fn new(resource: EvidenceKind, message: impl Into<String>) -> Self {
        Self {
            resource,
            message: message.into(),
        }
    }
}
