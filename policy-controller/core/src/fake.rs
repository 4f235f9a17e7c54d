//! An in-memory `Store` for handler tests.

use crate::{
    k8s::{
        labels::Selector, policy::Server, Deployment, Labels, Namespace, Pod, Resource,
        ResourceExt, Service,
    },
    Store,
};
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeStore(Arc<Mutex<State>>);

#[derive(Debug, Default)]
struct State {
    namespaces: Vec<Namespace>,
    servers: Vec<Server>,
    services: Vec<Service>,
    deployments: Vec<Deployment>,
    pods: Vec<Pod>,
    calls: usize,
    writes: usize,
    fail_writes: bool,
}

impl FakeStore {
    pub(crate) fn with_namespace(self, ns: Namespace) -> Self {
        self.0.lock().namespaces.push(ns);
        self
    }

    pub(crate) fn with_server(self, srv: Server) -> Self {
        self.0.lock().servers.push(srv);
        self
    }

    pub(crate) fn with_service(self, svc: Service) -> Self {
        self.0.lock().services.push(svc);
        self
    }

    pub(crate) fn fail_writes(&self) {
        self.0.lock().fail_writes = true;
    }

    /// The number of store calls of any kind.
    pub(crate) fn calls(&self) -> usize {
        self.0.lock().calls
    }

    pub(crate) fn writes(&self) -> usize {
        self.0.lock().writes
    }

    pub(crate) fn namespace(&self, name: &str) -> Option<Namespace> {
        find(&self.0.lock().namespaces, None, name)
    }

    pub(crate) fn deployment(&self, ns: &str, name: &str) -> Option<Deployment> {
        find(&self.0.lock().deployments, Some(ns), name)
    }

    pub(crate) fn pod(&self, ns: &str, name: &str) -> Option<Pod> {
        find(&self.0.lock().pods, Some(ns), name)
    }

    fn write<T: Resource + Clone>(
        &self,
        f: impl FnOnce(&mut State) -> &mut Vec<T>,
        obj: &T,
    ) -> Result<()> {
        let mut state = self.0.lock();
        state.calls += 1;
        if state.fail_writes {
            bail!("the object has been modified; please apply your changes to the latest version");
        }
        state.writes += 1;
        let objs = f(&mut *state);
        objs.retain(|o| !(o.namespace() == obj.namespace() && o.name_any() == obj.name_any()));
        objs.push(obj.clone());
        Ok(())
    }
}

fn find<T: Resource + Clone>(objs: &[T], ns: Option<&str>, name: &str) -> Option<T> {
    objs.iter()
        .find(|o| o.namespace().as_deref() == ns && o.name_any() == name)
        .cloned()
}

#[async_trait::async_trait]
impl Store for FakeStore {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>> {
        let mut state = self.0.lock();
        state.calls += 1;
        Ok(state
            .namespaces
            .iter()
            .filter(|ns| selector.matches(&Labels::from(ns.metadata.labels.clone())))
            .cloned()
            .collect())
    }

    async fn list_servers(&self, namespace: &str) -> Result<Vec<Server>> {
        let mut state = self.0.lock();
        state.calls += 1;
        Ok(state
            .servers
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        let mut state = self.0.lock();
        state.calls += 1;
        find(&state.services, Some(namespace), name)
            .ok_or_else(|| anyhow!("services \"{name}\" not found"))
    }

    async fn update_namespace(&self, ns: &Namespace) -> Result<()> {
        self.write(|s| &mut s.namespaces, ns)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.write(|s| &mut s.deployments, deployment)
    }

    async fn update_ephemeral_containers(&self, pod: &Pod) -> Result<()> {
        self.write(|s| &mut s.pods, pod)
    }
}
