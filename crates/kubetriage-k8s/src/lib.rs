//! Kubernetes client for kubetriage
//!
//! This crate provides Kubernetes API integration for reading deployments,
//! their owned ReplicaSets and Pods, and recent events, plus the single write
//! operation the CLI needs (scaling a deployment).

mod client;
mod reader;

pub use client::KubeClient;
pub use reader::{ClusterError, ClusterReader};

// Re-export types that are used in our public API
pub use kubetriage_types::{
    DeploymentDetail, EventRecord, PodInfo, ReplicaSetInfo,
};
