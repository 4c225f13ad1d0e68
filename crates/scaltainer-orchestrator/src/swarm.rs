//! Docker Swarm adapter, speaking the Engine REST API.
//!
//! Services are resolved by (possibly stack-prefixed) name through the
//! `/services` name filter. Only replicated services have a meaningful
//! replica count; a service in global mode is a configuration error.
//! Scaling re-reads the service by id to pick up the current spec and
//! version index, then posts the updated spec.

use serde_json::{Value, json};
use tracing::debug;

use scaltainer_state::{ReplicaTarget, ScaleError, ScaleResult};

/// Docker Engine API client; one per process.
pub struct SwarmClient {
    client: reqwest::Client,
    host: String,
}

impl SwarmClient {
    /// Build a client from an engine address. `tcp://` is accepted as an
    /// alias for `http://`; unix sockets are not supported — point
    /// `DOCKER_HOST` at an http(s) endpoint.
    pub fn new(host: &str) -> ScaleResult<Self> {
        let host = normalize_host(host)?;
        Ok(Self {
            client: reqwest::Client::new(),
            host,
        })
    }

    /// Build a client from the `DOCKER_HOST` environment variable.
    pub fn from_env() -> ScaleResult<Self> {
        let host = std::env::var("DOCKER_HOST").map_err(|_| {
            ScaleError::Configuration("DOCKER_HOST not set in environment".into())
        })?;
        Self::new(&host)
    }

    /// Resolve a replicated service by name within an optional stack.
    pub async fn resolve(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> ScaleResult<ReplicaTarget> {
        let full_name = match namespace {
            Some(stack) => format!("{stack}_{name}"),
            None => name.to_string(),
        };
        let filters = json!({"name": [full_name]}).to_string();

        let services: Vec<Value> = self
            .client
            .get(format!("{}/services", self.host))
            .query(&[("filters", filters.as_str())])
            .send()
            .await
            .map_err(|e| network(name, namespace, &self.host, e))?
            .json()
            .await
            .map_err(|e| network(name, namespace, &self.host, e))?;

        let service = services.first().ok_or_else(|| {
            ScaleError::Configuration(format!("unknown service to docker: {full_name}"))
        })?;
        let id = service
            .pointer("/ID")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ScaleError::Network(format!("service {full_name} has no id in engine response"))
            })?;
        let replicas = replicated_count(service, &full_name)?;

        debug!(service = %full_name, id = %id, replicas, "swarm service resolved");
        Ok(ReplicaTarget {
            id: id.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            kind: "service".to_string(),
            replicas,
        })
    }

    /// Update a service's replica count through a version-indexed spec
    /// update. The spec is re-read by id so the write never clobbers
    /// concurrent changes to other fields.
    pub async fn scale(&self, target: &ReplicaTarget, replicas: u32) -> ScaleResult<()> {
        let url = format!("{}/services/{}", self.host, target.id);
        let service: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| network(&target.name, target.namespace.as_deref(), &self.host, e))?
            .json()
            .await
            .map_err(|e| network(&target.name, target.namespace.as_deref(), &self.host, e))?;

        let version = service
            .pointer("/Version/Index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ScaleError::Network(format!(
                    "service {} has no version index in engine response",
                    target.name
                ))
            })?;
        let mut spec = service
            .pointer("/Spec")
            .cloned()
            .ok_or_else(|| {
                ScaleError::Network(format!(
                    "service {} has no spec in engine response",
                    target.name
                ))
            })?;
        spec["Mode"]["Replicated"]["Replicas"] = json!(replicas);

        let response = self
            .client
            .post(format!("{url}/update"))
            .query(&[("version", version)])
            .json(&spec)
            .send()
            .await
            .map_err(|e| network(&target.name, target.namespace.as_deref(), &self.host, e))?;

        if !response.status().is_success() {
            return Err(ScaleError::Network(format!(
                "could not scale service {} at {}: engine returned {}",
                target.name,
                self.host,
                response.status()
            )));
        }
        debug!(service = %target.name, replicas, "swarm service scaled");
        Ok(())
    }
}

/// Replica count of a replicated service; global-mode services have none.
fn replicated_count(service: &Value, full_name: &str) -> ScaleResult<u32> {
    match service.pointer("/Spec/Mode/Replicated") {
        Some(replicated) => replicated
            .get("Replicas")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .ok_or_else(|| {
                ScaleError::Network(format!(
                    "service {full_name} has no replica count in engine response"
                ))
            }),
        None => Err(ScaleError::Configuration(format!(
            "cannot replicate a global service: {full_name}"
        ))),
    }
}

fn normalize_host(host: &str) -> ScaleResult<String> {
    let host = host.trim_end_matches('/');
    if let Some(rest) = host.strip_prefix("tcp://") {
        Ok(format!("http://{rest}"))
    } else if host.starts_with("http://") || host.starts_with("https://") {
        Ok(host.to_string())
    } else {
        Err(ScaleError::Configuration(format!(
            "unsupported docker host {host}: expected an http://, https://, or tcp:// address"
        )))
    }
}

fn network(
    name: &str,
    namespace: Option<&str>,
    host: &str,
    e: reqwest::Error,
) -> ScaleError {
    let scope = match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    };
    ScaleError::Network(format!(
        "could not reach docker engine at {host} for service {scope}: {e}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicated_service(replicas: u64) -> Value {
        json!({
            "ID": "abc123",
            "Version": {"Index": 42},
            "Spec": {
                "Name": "prod_web",
                "Mode": {"Replicated": {"Replicas": replicas}}
            }
        })
    }

    #[test]
    fn reads_replicated_count() {
        let count = replicated_count(&replicated_service(5), "prod_web").unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn global_mode_is_configuration_error() {
        let service = json!({
            "ID": "abc123",
            "Spec": {"Name": "prod_agent", "Mode": {"Global": {}}}
        });
        let err = replicated_count(&service, "prod_agent").unwrap_err();
        assert!(matches!(err, ScaleError::Configuration(_)));
        assert!(err.to_string().contains("global service"));
        assert!(err.to_string().contains("prod_agent"));
    }

    #[test]
    fn tcp_host_becomes_http() {
        assert_eq!(
            normalize_host("tcp://10.0.0.2:2375").unwrap(),
            "http://10.0.0.2:2375"
        );
    }

    #[test]
    fn http_hosts_pass_through() {
        assert_eq!(
            normalize_host("https://swarm.local:2376/").unwrap(),
            "https://swarm.local:2376"
        );
    }

    #[test]
    fn unix_socket_host_rejected() {
        let err = normalize_host("unix:///var/run/docker.sock").unwrap_err();
        assert!(matches!(err, ScaleError::Configuration(_)));
    }
}
