//! Prometheus push-gateway export.
//!
//! After each tick the controller may publish every service's last
//! observed metric and last applied replica count. Export failures are
//! logged by the caller and never affect the tick.

use tracing::debug;

use scaltainer_state::{GlobalState, ScaleError, ScaleResult};

/// Push-gateway client; one instance per process.
pub struct PushGateway {
    client: reqwest::Client,
    address: String,
}

impl PushGateway {
    /// Build a client for a gateway address (scheme optional, http
    /// assumed).
    pub fn new(address: &str) -> Self {
        let address = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        Self {
            client: reqwest::Client::new(),
            address,
        }
    }

    /// Render and push the current per-service gauges.
    pub async fn publish(
        &self,
        namespace: Option<&str>,
        state: &GlobalState,
    ) -> ScaleResult<()> {
        let body = render(namespace, state);
        let url = format!("{}/metrics/job/scaltainer", self.address);
        let response = self
            .client
            .put(&url)
            .header("content-type", "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| ScaleError::Network(format!("push gateway {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ScaleError::Network(format!(
                "push gateway {url} returned {}",
                response.status()
            )));
        }
        debug!(services = state.services.len(), "metrics pushed");
        Ok(())
    }
}

/// Render per-service gauges in Prometheus text exposition format.
///
/// Services that have not yet produced an observation are omitted rather
/// than exported as zeros.
pub fn render(namespace: Option<&str>, state: &GlobalState) -> String {
    let mut out = String::new();

    out.push_str("# HELP scaltainer_service_replicas Last applied replica count.\n");
    out.push_str("# TYPE scaltainer_service_replicas gauge\n");
    for (name, svc) in &state.services {
        if let (Some(replicas), Some(kind)) = (svc.last_replicas, svc.last_kind) {
            out.push_str(&format!(
                "scaltainer_service_replicas{{{}}} {}\n",
                labels(name, &kind.to_string(), namespace),
                replicas
            ));
        }
    }

    out.push_str("# HELP scaltainer_service_metric Last observed load metric.\n");
    out.push_str("# TYPE scaltainer_service_metric gauge\n");
    for (name, svc) in &state.services {
        if let (Some(metric), Some(kind)) = (svc.last_metric, svc.last_kind) {
            out.push_str(&format!(
                "scaltainer_service_metric{{{}}} {}\n",
                labels(name, &kind.to_string(), namespace),
                metric
            ));
        }
    }

    out
}

fn labels(service: &str, kind: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("service=\"{service}\",kind=\"{kind}\",namespace=\"{ns}\""),
        None => format!("service=\"{service}\",kind=\"{kind}\""),
    }
}
