//! Terminal rendering for findings and deployment listings.

use std::io::Write;

use anyhow::Result;

use kubetriage_types::{CollectionError, DeploymentDetail, DeploymentSnapshot, Finding};

/// How many recent events the per-pod detail section shows.
const EVENT_LIMIT: usize = 10;

pub fn render_deployment_list(out: &mut impl Write, deployments: &[DeploymentDetail]) -> Result<()> {
    if deployments.is_empty() {
        writeln!(out, "No deployments found.")?;
        return Ok(());
    }

    let name_width = deployments
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let ns_width = deployments
        .iter()
        .map(|d| d.namespace.len())
        .max()
        .unwrap_or(0)
        .max("NAMESPACE".len());

    writeln!(
        out,
        "{:name_width$}  {:ns_width$}  {:>5}  {:>9}",
        "NAME", "NAMESPACE", "READY", "AVAILABLE"
    )?;
    for d in deployments {
        writeln!(
            out,
            "{:name_width$}  {:ns_width$}  {:>5}  {:>9}",
            d.name,
            d.namespace,
            d.replica_status(),
            d.available_replicas
        )?;
    }
    Ok(())
}

pub fn render_diagnosis(
    out: &mut impl Write,
    snapshot: &DeploymentSnapshot,
    findings: &[Finding],
    errors: &[CollectionError],
    pod_detail: bool,
) -> Result<()> {
    let deployment = &snapshot.deployment;

    writeln!(out, "--- Deployment Diagnosis: {} ---", deployment.name)?;
    writeln!(out, "Namespace: {}", deployment.namespace)?;
    writeln!(out, "Desired Replicas: {}", deployment.desired_replicas)?;
    writeln!(out, "Ready Replicas: {}", deployment.ready_replicas)?;
    writeln!(out, "Available Replicas: {}", deployment.available_replicas)?;
    writeln!(
        out,
        "Unavailable Replicas: {}",
        deployment.unavailable_replicas()
    )?;

    for condition in &deployment.conditions {
        writeln!(
            out,
            "   Condition: {} | Status: {} | Message: {}",
            condition.kind,
            condition.status,
            condition.message.as_deref().unwrap_or("-")
        )?;
    }

    writeln!(out)?;
    writeln!(out, "--- Findings ---")?;
    for finding in findings {
        writeln!(
            out,
            "[{}] {}: {}",
            finding.severity.as_str(),
            finding.category.as_str(),
            finding.message
        )?;
        for evidence in &finding.evidence {
            let location = match &evidence.container {
                Some(container) => format!("{}/{}", evidence.pod, container),
                None => evidence.pod.clone(),
            };
            match &evidence.event_reason {
                Some(reason) => writeln!(out, "    {} (event: {})", location, reason)?,
                None => writeln!(out, "    {}", location)?,
            }
        }
    }

    if !errors.is_empty() {
        writeln!(out)?;
        writeln!(out, "--- Evidence Gaps ---")?;
        writeln!(
            out,
            "Some evidence could not be collected; judge the findings accordingly."
        )?;
        for error in errors {
            writeln!(out, "   {}", error)?;
        }
    }

    if pod_detail {
        render_pod_detail(out, snapshot)?;
    }

    Ok(())
}

/// Per-pod detail section, shown under `--pod`.
fn render_pod_detail(out: &mut impl Write, snapshot: &DeploymentSnapshot) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "--- Pod Status ---")?;
    if snapshot.pods.is_empty() {
        writeln!(out, "No owned pods found.")?;
    }
    for pod in &snapshot.pods {
        writeln!(
            out,
            "Pod: {} | Phase: {} | Ready: {} | Node: {}",
            pod.name,
            pod.phase.as_str(),
            pod.ready,
            pod.node_name.as_deref().unwrap_or("-")
        )?;
        for container in &pod.containers {
            let state = container
                .waiting_reason
                .as_deref()
                .or(container.terminated_reason.as_deref())
                .unwrap_or("Running");
            writeln!(
                out,
                "   Container: {} | State: {} | Ready: {} | Restarts: {}",
                container.name, state, container.ready, container.restart_count
            )?;
        }
        if !pod.requests.is_empty() || !pod.limits.is_empty() {
            writeln!(
                out,
                "   CPU Request: {} | Memory Request: {}",
                pod.requests.get("cpu").map(String::as_str).unwrap_or("Not Set"),
                pod.requests.get("memory").map(String::as_str).unwrap_or("Not Set")
            )?;
            writeln!(
                out,
                "   CPU Limit: {} | Memory Limit: {}",
                pod.limits.get("cpu").map(String::as_str).unwrap_or("Not Set"),
                pod.limits.get("memory").map(String::as_str).unwrap_or("Not Set")
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "--- Events (Latest First) ---")?;
    if snapshot.events.is_empty() {
        writeln!(out, "No events found for this namespace.")?;
    }
    for event in snapshot.events.iter().take(EVENT_LIMIT) {
        writeln!(
            out,
            "[{}] {}: {}",
            event.kind,
            event.reason.as_deref().unwrap_or("-"),
            event.message.as_deref().unwrap_or("-")
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kubetriage_types::{EvidenceRef, FindingCategory, Severity};

    fn snapshot() -> DeploymentSnapshot {
        let mut deployment = DeploymentDetail::new("web".to_string(), "default".to_string());
        deployment.desired_replicas = 3;
        deployment.ready_replicas = 1;
        deployment.available_replicas = 1;
        DeploymentSnapshot {
            deployment,
            replica_sets: Vec::new(),
            pods: Vec::new(),
            events: Vec::new(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn diagnosis_report_shows_findings_and_gaps() {
        let findings = vec![
            Finding::new(
                FindingCategory::ImagePullFailure,
                Severity::Critical,
                "ImagePullBackOff (1 container(s) across 1 pod(s))",
            )
            .with_evidence(vec![EvidenceRef {
                pod: "web-abc".to_string(),
                container: Some("app".to_string()),
                event_reason: None,
            }]),
        ];
        let errors = vec![CollectionError::new(
            kubetriage_types::EvidenceKind::Events,
            "list events timed out after 10s",
        )];

        let mut buf = Vec::new();
        render_diagnosis(&mut buf, &snapshot(), &findings, &errors, false).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("[CRITICAL] ImagePullFailure"));
        assert!(text.contains("web-abc/app"));
        assert!(text.contains("Evidence Gaps"));
        assert!(text.contains("events: list events timed out"));
    }

    #[test]
    fn deployment_list_is_column_aligned() {
        let mut a = DeploymentDetail::new("api".to_string(), "default".to_string());
        a.desired_replicas = 2;
        a.ready_replicas = 2;
        a.available_replicas = 2;

        let mut buf = Vec::new();
        render_deployment_list(&mut buf, &[a]).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("NAME"));
        assert!(text.contains("2/2"));
    }
}
