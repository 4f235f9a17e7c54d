use crate::{
    k8s::{Namespace, ResourceExt},
    Store, INJECT_ANNOTATION, INJECT_ENABLED,
};
use anyhow::Result;

/// Marks project namespaces for mesh injection.
#[derive(Clone, Debug)]
pub struct Annotator<S> {
    store: S,
}

impl<S: Store> Annotator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Ensures the namespace carries the injection annotation, writing it at
    /// most once. Returns true if the namespace was updated.
    pub async fn annotate(&self, ns: &Namespace) -> Result<bool> {
        if has_inject_enabled(ns.annotations()) {
            tracing::debug!(namespace = %ns.name_any(), "Already annotated");
            return Ok(false);
        }

        let mut ns = ns.clone();
        ns.annotations_mut()
            .insert(INJECT_ANNOTATION.to_string(), INJECT_ENABLED.to_string());
        self.store.update_namespace(&ns).await?;
        tracing::info!(namespace = %ns.name_any(), "Enabled mesh injection");
        Ok(true)
    }
}

pub(crate) fn has_inject_enabled(annotations: &std::collections::BTreeMap<String, String>) -> bool {
    annotations.get(INJECT_ANNOTATION).map(String::as_str) == Some(INJECT_ENABLED)
}
