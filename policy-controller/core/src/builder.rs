use crate::{
    annotation::has_inject_enabled,
    authz::{policies_for, Reachability},
    k8s::{Deployment, ResourceExt},
    server, Desired, Store, INJECT_ANNOTATION, INJECT_ENABLED,
};
use anyhow::Result;

/// Image builder deployments are named with this prefix.
const BUILDER_PREFIX: &str = "bld";

/// Meshes image builders and restricts them to ingress traffic, so builders of
/// different projects cannot reach each other.
#[derive(Clone, Debug)]
pub struct Isolator<S> {
    store: S,
    ingress_namespace: String,
}

impl<S: Store> Isolator<S> {
    pub fn new(store: S, ingress_namespace: impl Into<String>) -> Self {
        Self {
            store,
            ingress_namespace: ingress_namespace.into(),
        }
    }

    /// Returns `None` for deployments that aren't builders, so that nothing
    /// is pruned on their behalf.
    pub async fn isolate(&self, deployment: &Deployment) -> Result<Option<Vec<Desired>>> {
        let name = deployment.name_any();
        let namespace = deployment.namespace().unwrap_or_default();
        if !name.starts_with(BUILDER_PREFIX) {
            tracing::debug!(%namespace, %name, "Not a builder");
            return Ok(None);
        }

        let injected = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
            .map_or(false, has_inject_enabled);
        if !injected {
            let mut deployment = deployment.clone();
            deployment
                .spec
                .get_or_insert_with(Default::default)
                .template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default)
                .insert(INJECT_ANNOTATION.to_string(), INJECT_ENABLED.to_string());
            self.store.update_deployment(&deployment).await?;
            tracing::info!(%namespace, %name, "Enabled mesh injection for builder");
        }

        let svc = self.store.get_service(&namespace, &name).await?;
        let mut desired = Vec::new();
        for srv in server::synthesize(&svc) {
            let policies = policies_for(&srv, &Reachability::IngressOnly, &self.ingress_namespace);
            desired.push(Desired::Server(srv));
            desired.extend(policies.into_iter().map(Desired::AuthorizationPolicy));
        }
        Ok(Some(desired))
    }
}
