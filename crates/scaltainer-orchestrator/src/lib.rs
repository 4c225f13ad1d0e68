//! scaltainer-orchestrator — replica targets in a live orchestrator.
//!
//! One closed enum over the supported orchestrators. Both variants expose
//! the same two operations:
//!
//! - `resolve(name, namespace)` — look up the replica set and read its
//!   current replica count, *fresh, every tick*. Counts are never cached
//!   across ticks: replicas can change outside this controller (manual
//!   intervention, other controllers, failures) and a decision must never
//!   act on a stale count.
//! - `scale(target, replicas)` — write a new replica count.
//!
//! API clients are constructed once per process and reused across ticks;
//! re-authenticating per service per tick is explicitly avoided.

pub mod kubernetes;
pub mod swarm;

use scaltainer_state::{ReplicaTarget, ScaleResult};

pub use kubernetes::{KubeClient, ResourceKind};
pub use swarm::SwarmClient;

/// A handle to one concrete orchestrator.
pub enum Orchestrator {
    Swarm(SwarmClient),
    Kubernetes(KubeClient),
}

impl Orchestrator {
    /// Resolve a service to a live replica target within its
    /// stack/namespace scope.
    pub async fn resolve(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> ScaleResult<ReplicaTarget> {
        match self {
            Orchestrator::Swarm(client) => client.resolve(name, namespace).await,
            Orchestrator::Kubernetes(client) => client.resolve(name, namespace).await,
        }
    }

    /// Apply a new replica count to a previously resolved target.
    pub async fn scale(&self, target: &ReplicaTarget, replicas: u32) -> ScaleResult<()> {
        match self {
            Orchestrator::Swarm(client) => client.scale(target, replicas).await,
            Orchestrator::Kubernetes(client) => client.scale(target, replicas).await,
        }
    }
}
