//! Domain types for the scaltainer configuration and state documents.
//!
//! `ScalerConfig` is the operator-authored YAML document loaded once at
//! startup. `ServiceConfig` carries per-service scaling parameters with
//! the documented defaults applied declaratively through serde, so merging
//! config over defaults never needs explicit code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The two service groups scaltainer knows how to scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Scaled on web response latency (APM-style averaged metric).
    Web,
    /// Scaled on queue/backlog depth from an HTTP endpoint.
    Worker,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Web => write!(f, "web"),
            ServiceKind::Worker => write!(f, "worker"),
        }
    }
}

/// Per-service scaling parameters.
///
/// Absent fields take the documented defaults: `min` 0, quantities and
/// sensitivities 1, `decrementable` false, `max` unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lower replica bound.
    pub min: u32,
    /// Upper replica bound; unbounded when absent.
    pub max: Option<u32>,
    /// Replicas added per upscale action (web only).
    pub upscale_quantity: u32,
    /// Replicas removed per downscale action (web only).
    pub downscale_quantity: u32,
    /// Consecutive upward breaches required before scaling up.
    pub upscale_sensitivity: u32,
    /// Consecutive downward breaches required before scaling down.
    pub downscale_sensitivity: u32,
    /// Permit downscaling a worker even while its backlog is non-zero.
    pub decrementable: bool,
    /// Web: latency floor below which the service scales down.
    pub min_response_time: Option<f64>,
    /// Web: latency ceiling above which the service scales up.
    pub max_response_time: Option<f64>,
    /// Worker: backlog units handled per replica.
    pub ratio: Option<f64>,
    /// Web: New Relic application id for the latency lookup.
    pub newrelic_app_id: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: None,
            upscale_quantity: 1,
            downscale_quantity: 1,
            upscale_sensitivity: 1,
            downscale_sensitivity: 1,
            decrementable: false,
            min_response_time: None,
            max_response_time: None,
            ratio: None,
            newrelic_app_id: None,
        }
    }
}

/// The configuration document loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Worker metric endpoint template. May contain a `$HIREFIRE_TOKEN`
    /// placeholder substituted once at source construction.
    pub endpoint: Option<String>,
    /// Stack prefix (Swarm) or namespace (Kubernetes) under which service
    /// names are resolved.
    #[serde(alias = "namespace")]
    pub stack_name: Option<String>,
    /// Web services keyed by name.
    pub web_services: BTreeMap<String, ServiceConfig>,
    /// Worker services keyed by name.
    pub worker_services: BTreeMap<String, ServiceConfig>,
}

/// Identity of a live replica set in the orchestrator, plus the replica
/// count read fresh at resolution. Never cached across ticks: the count
/// may change outside this controller at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaTarget {
    /// Orchestrator-assigned id (Swarm service id, Kubernetes uid).
    pub id: String,
    /// Bare service name as configured.
    pub name: String,
    /// Stack or namespace scope, when one applies.
    pub namespace: Option<String>,
    /// Resource kind ("service", "deployment", ...).
    pub kind: String,
    /// Current replica count at resolution time.
    pub replicas: u32,
}

/// Persisted per-service runtime state.
///
/// The two counters are the whole hysteresis state machine: both zero is
/// idle, a non-zero counter is an in-progress breach streak. The `last_*`
/// fields exist only for the optional metrics export and never feed back
/// into decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceState {
    /// Consecutive upward breaches observed so far.
    pub upscale_sensitivity: u32,
    /// Consecutive downward breaches observed so far.
    pub downscale_sensitivity: u32,
    /// Metric observed on the last successfully processed tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metric: Option<f64>,
    /// Service kind observed on the last successfully processed tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_kind: Option<ServiceKind>,
    /// Replica count from the last applied scale action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_replicas: Option<u32>,
}

/// All services' runtime state — the unit of persistence.
///
/// Created empty on first run, mutated in place through the tick, written
/// as a whole document afterwards. Entries for services no longer in the
/// config are harmless and simply unused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalState {
    pub services: BTreeMap<String, ServiceState>,
}

impl GlobalState {
    /// State entry for a service, default-initialized when absent so a
    /// missing key is never ambiguous with zero counters.
    pub fn entry(&mut self, name: &str) -> &mut ServiceState {
        self.services.entry(name.to_string()).or_default()
    }

    /// Read-only lookup (for export).
    pub fn get(&self, name: &str) -> Option<&ServiceState> {
        self.services.get(name)
    }
}
