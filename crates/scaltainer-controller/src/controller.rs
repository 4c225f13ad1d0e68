//! The per-tick reconciliation walk.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{error, info, warn};

use scaltainer_metrics::{MetricSource, PushGateway};
use scaltainer_orchestrator::Orchestrator;
use scaltainer_policy::{GateDecision, plan};
use scaltainer_state::{
    GlobalState, ScaleError, ScalerConfig, ServiceConfig, ServiceKind, StateStore,
};

/// Owns everything a tick needs. Clients are built once at startup and
/// reused across ticks.
pub struct Controller {
    config: ScalerConfig,
    state: GlobalState,
    store: StateStore,
    orchestrator: Orchestrator,
    web_source: MetricSource,
    worker_source: MetricSource,
    push: Option<PushGateway>,
}

impl Controller {
    pub fn new(
        config: ScalerConfig,
        state: GlobalState,
        store: StateStore,
        orchestrator: Orchestrator,
        web_source: MetricSource,
        worker_source: MetricSource,
        push: Option<PushGateway>,
    ) -> Self {
        Self {
            config,
            state,
            store,
            orchestrator,
            web_source,
            worker_source,
            push,
        }
    }

    /// Run ticks forever at the given interval, or exactly once when the
    /// interval is zero.
    pub async fn run(&mut self, wait: u64) {
        if wait == 0 {
            self.tick().await;
            return;
        }
        let interval = Duration::from_secs(wait);
        loop {
            self.tick().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One full reconciliation pass. Nothing in here is fatal: a failure
    /// is scoped to its service or group, logged, and the tick moves on.
    pub async fn tick(&mut self) {
        self.process_group(ServiceKind::Web).await;
        self.process_group(ServiceKind::Worker).await;

        if let Err(e) = self.store.persist(&self.state) {
            error!("{e}");
        }
        if let Some(push) = &self.push {
            let namespace = self.config.stack_name.as_deref();
            if let Err(e) = push.publish(namespace, &self.state).await {
                warn!("metrics export failed: {e}");
            }
        }
    }

    /// Process one service group: fetch its metrics as a barrier, then
    /// decide each configured service independently.
    async fn process_group(&mut self, kind: ServiceKind) {
        let (source, services) = match kind {
            ServiceKind::Web => (&self.web_source, &self.config.web_services),
            ServiceKind::Worker => (&self.worker_source, &self.config.worker_services),
        };

        let metrics = match source.fetch(services).await {
            Ok(metrics) => metrics,
            Err(e) => {
                report_group(&e, kind);
                return;
            }
        };

        for (name, service_config) in services {
            process_service(
                &self.orchestrator,
                &mut self.state,
                self.config.stack_name.as_deref(),
                name,
                service_config,
                kind,
                &metrics,
            )
            .await;
        }
    }
}

/// Decide and (when warranted) apply one service. Failures are logged and
/// end this service's turn only.
async fn process_service(
    orchestrator: &Orchestrator,
    state: &mut GlobalState,
    namespace: Option<&str>,
    name: &str,
    config: &ServiceConfig,
    kind: ServiceKind,
    metrics: &HashMap<String, f64>,
) {
    let target = match orchestrator.resolve(name, namespace).await {
        Ok(target) => target,
        Err(e) => {
            report_service(&e, name);
            return;
        }
    };
    let metric = match metrics.get(name) {
        Some(metric) => *metric,
        None => {
            let e = ScaleError::Warning(format!("no metric reported for service {name}"));
            report_service(&e, name);
            return;
        }
    };

    let svc_state = state.entry(name);
    svc_state.last_metric = Some(metric);
    svc_state.last_kind = Some(kind);

    let decision = match plan(kind, metric, config, target.replicas, svc_state) {
        Ok(decision) => decision,
        Err(e) => {
            report_service(&e, name);
            return;
        }
    };

    if let GateDecision::Apply(replicas) = decision {
        if let Some(next) = scale_action(decision, target.replicas) {
            if let Err(e) = orchestrator.scale(&target, next).await {
                report_service(&e, name);
                return;
            }
            info!(
                service = %name,
                kind = %kind,
                metric,
                from = target.replicas,
                to = next,
                "service scaled"
            );
        }
        state.entry(name).last_replicas = Some(replicas);
    }
}

/// The write a decision calls for, if any. An applied count equal to the
/// current one needs no orchestrator round trip.
fn scale_action(decision: GateDecision, current: u32) -> Option<u32> {
    match decision {
        GateDecision::Apply(replicas) if replicas != current => Some(replicas),
        _ => None,
    }
}

fn report_service(err: &ScaleError, service: &str) {
    if err.is_warning() {
        warn!(service = %service, "{err}");
    } else {
        error!(service = %service, "{err}");
    }
}

fn report_group(err: &ScaleError, kind: ServiceKind) {
    if err.is_warning() {
        warn!(group = %kind, "{err}");
    } else {
        error!(group = %kind, "{err}");
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scaltainer_metrics::{WebMetricSource, WorkerMetricSource};
    use scaltainer_orchestrator::SwarmClient;

    #[test]
    fn apply_with_changed_count_scales() {
        assert_eq!(scale_action(GateDecision::Apply(7), 5), Some(7));
    }

    #[test]
    fn apply_with_unchanged_count_skips_the_write() {
        assert_eq!(scale_action(GateDecision::Apply(5), 5), None);
    }

    #[test]
    fn hold_and_noop_never_scale() {
        assert_eq!(scale_action(GateDecision::Hold, 5), None);
        assert_eq!(scale_action(GateDecision::NoOp, 5), None);
    }

    #[tokio::test]
    async fn empty_config_tick_persists_state_and_survives() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("scaltainer.yml.state");

        let mut controller = Controller::new(
            ScalerConfig::default(),
            GlobalState::default(),
            StateStore::new(&state_path),
            Orchestrator::Swarm(SwarmClient::new("http://127.0.0.1:1").unwrap()),
            MetricSource::Web(WebMetricSource::new(None, Duration::from_secs(300))),
            MetricSource::Worker(WorkerMetricSource::new(None, None)),
            None,
        );
        controller.tick().await;

        // Both groups warned and were skipped; the (empty) state document
        // was still written.
        assert!(state_path.exists());
    }
}
