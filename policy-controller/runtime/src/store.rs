use crate::{
    core::Store,
    k8s::{
        labels::Selector, policy::Server, Api, Client, Deployment, ListParams, Namespace, Pod,
        PostParams, ResourceExt, Service,
    },
    with_timeout,
};
use anyhow::Result;
use std::time::Duration;

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub(crate) struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    pub(crate) fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>> {
        let api = Api::<Namespace>::all(self.client.clone());
        let params = ListParams::default().labels(&selector.to_string());
        let list = with_timeout(self.timeout, api.list(&params)).await?;
        Ok(list.items)
    }

    async fn list_servers(&self, namespace: &str) -> Result<Vec<Server>> {
        let api = Api::<Server>::namespaced(self.client.clone(), namespace);
        let list = with_timeout(self.timeout, api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        Ok(with_timeout(self.timeout, api.get(name)).await?)
    }

    async fn update_namespace(&self, ns: &Namespace) -> Result<()> {
        let api = Api::<Namespace>::all(self.client.clone());
        with_timeout(
            self.timeout,
            api.replace(&ns.name_any(), &PostParams::default(), ns),
        )
        .await?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let api = Api::<Deployment>::namespaced(
            self.client.clone(),
            &deployment.namespace().unwrap_or_default(),
        );
        with_timeout(
            self.timeout,
            api.replace(&deployment.name_any(), &PostParams::default(), deployment),
        )
        .await?;
        Ok(())
    }

    async fn update_ephemeral_containers(&self, pod: &Pod) -> Result<()> {
        let api = Api::<Pod>::namespaced(self.client.clone(), &pod.namespace().unwrap_or_default());
        with_timeout(
            self.timeout,
            api.replace_ephemeral_containers(&pod.name_any(), &PostParams::default(), pod),
        )
        .await?;
        Ok(())
    }
}
