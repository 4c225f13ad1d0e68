//! scaltainer — autoscaling daemon for container service fleets.
//!
//! Startup is strict (bad config or corrupt state refuses to start); the
//! running loop is lenient (per-service and per-group failures are logged
//! and never end a tick).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use scaltainer_controller::Controller;
use scaltainer_metrics::{MetricSource, PushGateway, WebMetricSource, WorkerMetricSource};
use scaltainer_orchestrator::{KubeClient, Orchestrator, ResourceKind, SwarmClient};
use scaltainer_state::StateStore;

#[derive(Debug, Parser)]
#[command(name = "scaltainer", version, about = "Autoscale container services from load metrics")]
struct Cli {
    /// Path to the scaling configuration document.
    #[arg(long, default_value = "scaltainer.yml")]
    conf_file: PathBuf,

    /// Path for persisted tick state. Defaults to the config path with a
    /// `.state` suffix.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Seconds between ticks; 0 runs a single tick and exits.
    #[arg(long, default_value_t = 0)]
    wait: u64,

    /// Which orchestrator the configured services live in.
    #[arg(long, value_enum, default_value = "swarm")]
    orchestrator: OrchestratorKind,

    /// Prometheus push-gateway address for per-service gauges.
    #[arg(long)]
    prometheus_push_gateway: Option<String>,

    /// Require New Relic agent reporting credentials at startup.
    #[arg(long)]
    enable_newrelic_reporting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OrchestratorKind {
    Swarm,
    Kubernetes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secret files become env vars before anything reads the environment.
    load_secrets()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.enable_newrelic_reporting {
        for var in ["NEW_RELIC_LICENSE_KEY", "NEW_RELIC_APP_NAME"] {
            if std::env::var_os(var).is_none() {
                bail!("--enable-newrelic-reporting requires {var} to be set");
            }
        }
    }

    let state_path = cli
        .state_file
        .clone()
        .unwrap_or_else(|| default_state_path(&cli.conf_file));

    let config = StateStore::load_config(&cli.conf_file)?;
    let store = StateStore::new(&state_path);
    let state = store.load_state()?;

    let orchestrator = match cli.orchestrator {
        OrchestratorKind::Swarm => Orchestrator::Swarm(SwarmClient::from_env()?),
        OrchestratorKind::Kubernetes => {
            Orchestrator::Kubernetes(KubeClient::from_env(ResourceKind::from_env()?)?)
        }
    };

    let web_source = MetricSource::Web(WebMetricSource::new(
        std::env::var("NEW_RELIC_LICENSE_KEY").ok(),
        response_time_window(),
    ));
    let worker_source = MetricSource::Worker(WorkerMetricSource::new(
        config.endpoint.as_deref(),
        std::env::var("HIREFIRE_TOKEN").ok().as_deref(),
    ));
    let push = cli
        .prometheus_push_gateway
        .as_deref()
        .map(PushGateway::new);

    info!(
        config = %cli.conf_file.display(),
        state = %state_path.display(),
        orchestrator = ?cli.orchestrator,
        wait = cli.wait,
        "scaltainer starting"
    );

    let mut controller = Controller::new(
        config,
        state,
        store,
        orchestrator,
        web_source,
        worker_source,
        push,
    );
    controller.run(cli.wait).await;
    Ok(())
}

fn default_state_path(conf_file: &Path) -> PathBuf {
    PathBuf::from(format!("{}.state", conf_file.display()))
}

/// Trailing window for the web latency metric, in minutes
/// (`RESPONSE_TIME_WINDOW`, default 5).
fn response_time_window() -> Duration {
    let minutes = std::env::var("RESPONSE_TIME_WINDOW")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Duration::from_secs(minutes * 60)
}

/// Export each regular file in `$SECRETS_PATH` as an env var: the file
/// name is the variable, the trimmed contents the value. Variables already
/// set in the environment win over secret files.
fn load_secrets() -> anyhow::Result<()> {
    let Some(dir) = std::env::var_os("SECRETS_PATH") else {
        return Ok(());
    };
    for entry in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry
            .with_context(|| format!("cannot scan secrets directory {}", dir.to_string_lossy()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if std::env::var_os(name).is_some() {
            continue;
        }
        let value = std::fs::read_to_string(entry.path())
            .with_context(|| format!("cannot read secret file {}", entry.path().display()))?;
        // Pre-runtime, single-threaded at this point.
        unsafe { std::env::set_var(name, value.trim()) };
    }
    Ok(())
}
