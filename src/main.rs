use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use kubetriage_diagnose::{DiagnosisConfig, EvidenceCollector, diagnose};
use kubetriage_k8s::{ClusterReader, KubeClient};

mod report;

const LOG_FILE: &str = "kubetriage.log";

/// Kubetriage - a diagnostic CLI for Kubernetes deployments
#[derive(Parser, Debug)]
#[command(name = "kubetriage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Also write logs to kubetriage.log
    #[arg(long, global = true)]
    log: bool,

    /// Per-request timeout for cluster calls, in seconds
    #[arg(long, global = true, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List deployments
    List {
        /// Namespace to list deployments from
        #[arg(long, conflicts_with = "all_namespaces")]
        namespace: Option<String>,

        /// List deployments across all namespaces
        #[arg(long)]
        all_namespaces: bool,
    },

    /// Scale a deployment
    Scale {
        /// Deployment name
        #[arg(long)]
        deployment: String,

        /// Target replica count
        #[arg(long, allow_negative_numbers = true)]
        replicas: i32,

        /// Namespace of the deployment
        #[arg(long, default_value = "default")]
        namespace: String,
    },

    /// Get deployment details
    Info {
        /// Deployment name
        #[arg(long)]
        deployment: String,

        /// Namespace of the deployment
        #[arg(long, default_value = "default")]
        namespace: String,
    },

    /// Diagnose a deployment
    Diagnostic {
        /// Deployment name
        #[arg(long)]
        deployment: String,

        /// Namespace of the deployment
        #[arg(long, default_value = "default")]
        namespace: String,

        /// Include detailed per-pod diagnostics
        #[arg(long)]
        pod: bool,

        /// Restart count above which repeated Error exits count as a crash loop
        #[arg(long, default_value = "3")]
        restart_threshold: i32,

        /// Seconds a replica shortfall must persist before it is reported
        #[arg(long, default_value = "120")]
        grace_period: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.log) {
        eprintln!("Error: failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build the logger once at startup: stderr always, plus a file layer when
/// `--log` is set. The stderr level is the same in both modes; `--log` only
/// adds the file destination.
fn init_tracing(log_to_file: bool) -> Result<()> {
    let stderr_filter =
        || EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());

    if log_to_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE)
            .context(format!("failed to open {}", LOG_FILE))?;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(stderr_filter()),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_filter(LevelFilter::INFO),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(stderr_filter())
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

/// Argument validation; runs before any cluster call is made.
fn validate_args(command: &Command) -> Result<()> {
    if let Command::Scale { replicas, .. } = command {
        if *replicas < 0 {
            bail!(
                "invalid argument: --replicas must be a non-negative integer, got {}",
                replicas
            );
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    validate_args(&args.command)?;

    let client = KubeClient::new(Duration::from_secs(args.timeout))
        .await
        .context("failed to create Kubernetes client from kubeconfig")?;

    match args.command {
        Command::List {
            namespace,
            all_namespaces,
        } => {
            // Omitting --namespace means all namespaces.
            let namespace = if all_namespaces { None } else { namespace };
            run_list(&client, namespace.as_deref()).await
        }
        Command::Scale {
            deployment,
            replicas,
            namespace,
        } => run_scale(&client, &namespace, &deployment, replicas).await,
        Command::Info {
            deployment,
            namespace,
        } => run_info(&client, &namespace, &deployment).await,
        Command::Diagnostic {
            deployment,
            namespace,
            pod,
            restart_threshold,
            grace_period,
        } => {
            let config = DiagnosisConfig {
                restart_threshold,
                grace_period: chrono::Duration::seconds(grace_period as i64),
            };
            run_diagnostic(&client, &namespace, &deployment, pod, &config).await
        }
    }
}

async fn run_list(client: &KubeClient, namespace: Option<&str>) -> Result<()> {
    let deployments = client
        .list_deployments(namespace)
        .await
        .context("failed to list deployments")?;

    tracing::info!(count = deployments.len(), "listed deployments");

    let mut stdout = std::io::stdout().lock();
    report::render_deployment_list(&mut stdout, &deployments)?;
    Ok(())
}

async fn run_scale(
    client: &KubeClient,
    namespace: &str,
    deployment: &str,
    replicas: i32,
) -> Result<()> {
    let accepted = client
        .update_replica_count(namespace, deployment, replicas)
        .await
        .context(format!("failed to scale deployment '{}'", deployment))?;

    tracing::info!(
        deployment,
        namespace,
        replicas = accepted,
        "scaled deployment"
    );
    println!(
        "Scaled deployment '{}' in namespace '{}' to {} replicas",
        deployment, namespace, accepted
    );
    Ok(())
}

async fn run_info(client: &KubeClient, namespace: &str, deployment: &str) -> Result<()> {
    let detail = client
        .get_deployment(namespace, deployment)
        .await
        .context(format!("failed to get deployment '{}'", deployment))?;

    let info = serde_json::json!({
        "name": detail.name,
        "namespace": detail.namespace,
        "replicas_desired": detail.desired_replicas,
        "replicas_ready": detail.ready_replicas,
        "replicas_available": detail.available_replicas,
        "strategy": detail.strategy,
        "created": detail.created,
        "labels": detail.labels,
        "annotations": detail.annotations,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_diagnostic(
    client: &KubeClient,
    namespace: &str,
    deployment: &str,
    pod_detail: bool,
    config: &DiagnosisConfig,
) -> Result<()> {
    let collector = EvidenceCollector::new(client);

    // A cancelled run aborts before diagnosis; partial results are never
    // surfaced.
    let (snapshot, errors) = tokio::select! {
        result = collector.collect(namespace, deployment) => {
            result.context(format!("failed to collect evidence for '{}'", deployment))?
        }
        _ = tokio::signal::ctrl_c() => {
            bail!("diagnostic run cancelled");
        }
    };

    let findings = diagnose(&snapshot, config);
    tracing::info!(
        deployment,
        namespace,
        findings = findings.len(),
        degraded = errors.len(),
        "diagnosis complete"
    );

    let mut stdout = std::io::stdout().lock();
    report::render_diagnosis(&mut stdout, &snapshot, &findings, &errors, pod_detail)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_replicas_are_rejected_before_any_cluster_call() {
        let command = Command::Scale {
            deployment: "web".to_string(),
            replicas: -1,
            namespace: "default".to_string(),
        };

        let err = validate_args(&command).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn zero_replicas_is_a_valid_scale_target() {
        let command = Command::Scale {
            deployment: "web".to_string(),
            replicas: 0,
            namespace: "default".to_string(),
        };

        assert!(validate_args(&command).is_ok());
    }
}
