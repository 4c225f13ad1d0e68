//! Kubernetes adapter, speaking the cluster API directly.
//!
//! The client is bootstrapped once per process, either from an explicit
//! kubeconfig file (`KUBECONFIG`) or from the in-cluster service-account
//! mount — the latter also supplies the default namespace. Resources of a
//! configurable kind are read with a GET and scaled with a JSON
//! merge-patch on `spec.replicas`.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use scaltainer_state::{ReplicaTarget, ScaleError, ScaleResult};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const DEFAULT_IN_CLUSTER_SERVER: &str = "https://kubernetes.default:443";

/// The resource kinds that carry a scalable `spec.replicas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Deployment,
    ReplicaSet,
    ReplicationController,
}

impl ResourceKind {
    /// Read the kind from `KUBERNETES_RESOURCE_KIND` (default: deployment).
    pub fn from_env() -> ScaleResult<Self> {
        match std::env::var("KUBERNETES_RESOURCE_KIND") {
            Ok(kind) => kind.parse(),
            Err(_) => Ok(ResourceKind::Deployment),
        }
    }

    /// API path for a named resource of this kind.
    fn path(&self, namespace: &str, name: &str) -> String {
        match self {
            ResourceKind::Deployment => {
                format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}")
            }
            ResourceKind::ReplicaSet => {
                format!("/apis/apps/v1/namespaces/{namespace}/replicasets/{name}")
            }
            ResourceKind::ReplicationController => {
                format!("/api/v1/namespaces/{namespace}/replicationcontrollers/{name}")
            }
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::ReplicaSet => "replicaset",
            ResourceKind::ReplicationController => "replicationcontroller",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = ScaleError;

    fn from_str(s: &str) -> ScaleResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" => Ok(ResourceKind::Deployment),
            "replicaset" => Ok(ResourceKind::ReplicaSet),
            "replicationcontroller" => Ok(ResourceKind::ReplicationController),
            other => Err(ScaleError::Configuration(format!(
                "unsupported kubernetes resource kind: {other}"
            ))),
        }
    }
}

/// Long-lived, authenticated Kubernetes API client.
#[derive(Debug)]
pub struct KubeClient {
    client: reqwest::Client,
    server: String,
    token: Option<String>,
    default_namespace: Option<String>,
    kind: ResourceKind,
}

impl KubeClient {
    /// Bootstrap from the environment: an explicit kubeconfig when
    /// `KUBECONFIG` is set, the in-cluster service account otherwise.
    pub fn from_env(kind: ResourceKind) -> ScaleResult<Self> {
        match std::env::var("KUBECONFIG") {
            Ok(path) => Self::from_kubeconfig(Path::new(&path), kind),
            Err(_) => Self::from_service_account(Path::new(SERVICE_ACCOUNT_DIR), kind),
        }
    }

    /// Bootstrap from a kubeconfig file's current context.
    pub fn from_kubeconfig(path: &Path, kind: ResourceKind) -> ScaleResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScaleError::Configuration(format!("cannot read kubeconfig {}: {e}", path.display()))
        })?;
        let kubeconfig = parse_kubeconfig(&raw)?;
        let (cluster, user, namespace) = select_context(&kubeconfig)?;

        let mut builder = reqwest::Client::builder();
        if cluster.insecure_skip_tls_verify || skip_ssl_verify_from_env() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca_pem) = cluster.ca_pem()? {
            let cert = reqwest::Certificate::from_pem(ca_pem.as_bytes())
                .map_err(|e| ScaleError::Configuration(format!("invalid cluster CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if let (Some(cert), Some(key)) = (user.client_cert_pem()?, user.client_key_pem()?) {
            let identity =
                reqwest::Identity::from_pkcs8_pem(cert.as_bytes(), key.as_bytes()).map_err(
                    |e| ScaleError::Configuration(format!("invalid client certificate: {e}")),
                )?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| ScaleError::Configuration(format!("cannot build https client: {e}")))?;

        Ok(Self {
            client,
            server: server_from_env().unwrap_or_else(|| cluster.server.clone()),
            token: user.token.clone(),
            default_namespace: namespace,
            kind,
        })
    }

    /// Bootstrap from an in-cluster service-account directory (`token`,
    /// `ca.crt`, `namespace`).
    pub fn from_service_account(dir: &Path, kind: ResourceKind) -> ScaleResult<Self> {
        let read = |file: &str| -> ScaleResult<String> {
            std::fs::read_to_string(dir.join(file)).map_err(|e| {
                ScaleError::Configuration(format!(
                    "cannot read service account secret {}/{file}: {e}",
                    dir.display()
                ))
            })
        };
        let token = read("token")?.trim().to_string();
        let namespace = read("namespace")?.trim().to_string();
        let ca = read("ca.crt")?;

        let mut builder = reqwest::Client::builder();
        if skip_ssl_verify_from_env() {
            builder = builder.danger_accept_invalid_certs(true);
        } else {
            let cert = reqwest::Certificate::from_pem(ca.as_bytes())
                .map_err(|e| ScaleError::Configuration(format!("invalid cluster CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ScaleError::Configuration(format!("cannot build https client: {e}")))?;

        Ok(Self {
            client,
            server: server_from_env().unwrap_or_else(|| DEFAULT_IN_CLUSTER_SERVER.to_string()),
            token: Some(token),
            default_namespace: Some(namespace),
            kind,
        })
    }

    /// Resolve a named resource and read its current replica count.
    pub async fn resolve(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> ScaleResult<ReplicaTarget> {
        let namespace = self.effective_namespace(namespace);
        let url = format!("{}{}", self.server, self.kind.path(&namespace, name));

        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| self.network(name, &namespace, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ScaleError::Configuration(format!(
                "unknown {} {namespace}/{name}",
                self.kind.as_str()
            )));
        }
        if !response.status().is_success() {
            return Err(ScaleError::Network(format!(
                "kubernetes API returned {} for {namespace}/{name}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.network(name, &namespace, e))?;

        let uid = body
            .pointer("/metadata/uid")
            .and_then(|v| v.as_str())
            .unwrap_or(name)
            .to_string();
        let replicas = body
            .pointer("/spec/replicas")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ScaleError::Network(format!(
                    "no replica count in API response for {namespace}/{name}"
                ))
            })? as u32;

        debug!(resource = %name, namespace = %namespace, replicas, "kubernetes resource resolved");
        Ok(ReplicaTarget {
            id: uid,
            name: name.to_string(),
            namespace: Some(namespace),
            kind: self.kind.as_str().to_string(),
            replicas,
        })
    }

    /// Scale a resolved resource with a merge-patch on `spec.replicas`.
    pub async fn scale(&self, target: &ReplicaTarget, replicas: u32) -> ScaleResult<()> {
        let namespace = self.effective_namespace(target.namespace.as_deref());
        let url = format!("{}{}", self.server, self.kind.path(&namespace, &target.name));

        let response = self
            .request(reqwest::Method::PATCH, &url)
            .header("content-type", "application/merge-patch+json")
            .json(&json!({"spec": {"replicas": replicas}}))
            .send()
            .await
            .map_err(|e| self.network(&target.name, &namespace, e))?;

        if !response.status().is_success() {
            return Err(ScaleError::Network(format!(
                "could not scale {namespace}/{}: kubernetes API returned {}",
                target.name,
                response.status()
            )));
        }
        debug!(resource = %target.name, namespace = %namespace, replicas, "kubernetes resource scaled");
        Ok(())
    }

    fn effective_namespace(&self, namespace: Option<&str>) -> String {
        namespace
            .map(str::to_string)
            .or_else(|| self.default_namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn network(&self, name: &str, namespace: &str, e: reqwest::Error) -> ScaleError {
        ScaleError::Network(format!(
            "could not reach kubernetes API at {} for {namespace}/{name}: {e}",
            self.server
        ))
    }
}

fn server_from_env() -> Option<String> {
    std::env::var("KUBERNETES_API_SERVER").ok()
}

fn skip_ssl_verify_from_env() -> bool {
    std::env::var("KUBERNETES_SKIP_SSL_VERIFY").is_ok()
}

// ── kubeconfig document ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct KubeConfig {
    #[serde(rename = "current-context")]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority")]
    certificate_authority: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

impl Cluster {
    fn ca_pem(&self) -> ScaleResult<Option<String>> {
        pem_from(
            self.certificate_authority_data.as_deref(),
            self.certificate_authority.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: User,
}

#[derive(Debug, Default, Deserialize)]
struct User {
    token: Option<String>,
    #[serde(rename = "client-certificate-data")]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-certificate")]
    client_certificate: Option<String>,
    #[serde(rename = "client-key-data")]
    client_key_data: Option<String>,
    #[serde(rename = "client-key")]
    client_key: Option<String>,
}

impl User {
    fn client_cert_pem(&self) -> ScaleResult<Option<String>> {
        pem_from(
            self.client_certificate_data.as_deref(),
            self.client_certificate.as_deref(),
        )
    }

    fn client_key_pem(&self) -> ScaleResult<Option<String>> {
        pem_from(self.client_key_data.as_deref(), self.client_key.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    user: String,
    namespace: Option<String>,
}

/// PEM material from either an inline base64 field or a file path field.
fn pem_from(data: Option<&str>, file: Option<&str>) -> ScaleResult<Option<String>> {
    if let Some(data) = data {
        let bytes = BASE64.decode(data.trim()).map_err(|e| {
            ScaleError::Configuration(format!("invalid base64 in kubeconfig: {e}"))
        })?;
        let pem = String::from_utf8(bytes).map_err(|e| {
            ScaleError::Configuration(format!("kubeconfig data is not valid PEM: {e}"))
        })?;
        return Ok(Some(pem));
    }
    if let Some(file) = file {
        let pem = std::fs::read_to_string(file).map_err(|e| {
            ScaleError::Configuration(format!("cannot read kubeconfig reference {file}: {e}"))
        })?;
        return Ok(Some(pem));
    }
    Ok(None)
}

fn parse_kubeconfig(raw: &str) -> ScaleResult<KubeConfig> {
    serde_yaml::from_str(raw)
        .map_err(|e| ScaleError::Configuration(format!("cannot parse kubeconfig: {e}")))
}

/// Pick the current (or only) context and join it to its cluster and user.
fn select_context(config: &KubeConfig) -> ScaleResult<(&Cluster, &User, Option<String>)> {
    let context = match &config.current_context {
        Some(current) => config
            .contexts
            .iter()
            .find(|c| &c.name == current)
            .ok_or_else(|| {
                ScaleError::Configuration(format!("kubeconfig context {current} not found"))
            })?,
        None => config.contexts.first().ok_or_else(|| {
            ScaleError::Configuration("kubeconfig contains no contexts".into())
        })?,
    };
    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == context.context.cluster)
        .map(|c| &c.cluster)
        .ok_or_else(|| {
            ScaleError::Configuration(format!(
                "kubeconfig cluster {} not found",
                context.context.cluster
            ))
        })?;
    let user = config
        .users
        .iter()
        .find(|u| u.name == context.context.user)
        .map(|u| &u.user)
        .ok_or_else(|| {
            ScaleError::Configuration(format!(
                "kubeconfig user {} not found",
                context.context.user
            ))
        })?;
    Ok((cluster, user, context.context.namespace.clone()))
}
