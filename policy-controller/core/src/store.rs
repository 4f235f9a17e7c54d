use crate::k8s::{labels::Selector, policy::Server, Deployment, Namespace, Pod, Service};
use anyhow::Result;

/// Reads and writes the cluster objects handlers depend on.
///
/// Writes carry the object's resource version, so a write racing another
/// writer fails with a conflict rather than clobbering it.
#[async_trait::async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>>;

    async fn list_servers(&self, namespace: &str) -> Result<Vec<Server>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service>;

    async fn update_namespace(&self, ns: &Namespace) -> Result<()>;

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Submits the pod's ephemeral containers through the
    /// `ephemeralcontainers` subresource.
    async fn update_ephemeral_containers(&self, pod: &Pod) -> Result<()>;
}
