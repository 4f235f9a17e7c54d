use crate::{
    annotation::Annotator,
    authz::Compiler,
    builder::Isolator,
    ingress,
    k8s::{
        policy::{AuthorizationPolicy, MeshTLSAuthentication, NetworkAuthentication, Server},
        Deployment, Endpoints, Namespace, ObjectMeta, OwnerReference, Pod, Resource, Service,
    },
    reaper::Reaper,
    server, Store,
};
use anyhow::Result;
use std::{fmt, sync::Arc};

/// An object delivered to a route, tagged with the route it was delivered to.
#[derive(Clone, Debug)]
pub enum Trigger {
    ProjectAnnotation(Arc<Namespace>),
    ProjectPolicy(Arc<Namespace>),
    JobPod(Arc<Pod>),
    ManagedService(Arc<Service>),
    IngressEndpoints(Arc<Endpoints>),
    BuilderDeployment(Arc<Deployment>),
}

/// Names a (kind, selector) registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    ProjectAnnotation,
    ProjectPolicy,
    JobPod,
    ManagedService,
    IngressEndpoints,
    BuilderDeployment,
}

/// The kinds of objects handlers emit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Server,
    MeshTlsAuthentication,
    AuthorizationPolicy,
    NetworkAuthentication,
}

/// An object a handler wants to exist.
#[derive(Clone, Debug, PartialEq)]
pub enum Desired {
    Server(Server),
    MeshTls(MeshTLSAuthentication),
    AuthorizationPolicy(AuthorizationPolicy),
    NetworkAuthentication(NetworkAuthentication),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The image used to stop proxies of completed jobs.
    pub debug_image: String,
    pub cluster_domain: String,
    pub ingress_namespace: String,
}

/// Routes each trigger to the handler responsible for it.
#[derive(Clone, Debug)]
pub struct Handlers<S> {
    annotator: Annotator<S>,
    reaper: Reaper<S>,
    compiler: Compiler<S>,
    isolator: Isolator<S>,
}

// === impl Trigger ===

impl Trigger {
    pub fn route(&self) -> Route {
        match self {
            Self::ProjectAnnotation(_) => Route::ProjectAnnotation,
            Self::ProjectPolicy(_) => Route::ProjectPolicy,
            Self::JobPod(_) => Route::JobPod,
            Self::ManagedService(_) => Route::ManagedService,
            Self::IngressEndpoints(_) => Route::IngressEndpoints,
            Self::BuilderDeployment(_) => Route::BuilderDeployment,
        }
    }

    /// The triggering object's metadata.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::ProjectAnnotation(ns) | Self::ProjectPolicy(ns) => ns.meta(),
            Self::JobPod(pod) => pod.meta(),
            Self::ManagedService(svc) => svc.meta(),
            Self::IngressEndpoints(ep) => ep.meta(),
            Self::BuilderDeployment(deploy) => deploy.meta(),
        }
    }

    /// A non-controller reference to the triggering object, if it has been
    /// persisted.
    pub fn owner_ref(&self) -> Option<OwnerReference> {
        match self {
            Self::ProjectAnnotation(ns) | Self::ProjectPolicy(ns) => ns.owner_ref(&()),
            Self::JobPod(pod) => pod.owner_ref(&()),
            Self::ManagedService(svc) => svc.owner_ref(&()),
            Self::IngressEndpoints(ep) => ep.owner_ref(&()),
            Self::BuilderDeployment(deploy) => deploy.owner_ref(&()),
        }
    }
}

// === impl Route ===

impl Route {
    pub const ALL: [Route; 6] = [
        Route::ProjectAnnotation,
        Route::ProjectPolicy,
        Route::JobPod,
        Route::ManagedService,
        Route::IngressEndpoints,
        Route::BuilderDeployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectAnnotation => "project-annotation",
            Self::ProjectPolicy => "project-policy",
            Self::JobPod => "job-pod",
            Self::ManagedService => "managed-service",
            Self::IngressEndpoints => "ingress-endpoints",
            Self::BuilderDeployment => "builder-deployment",
        }
    }

    /// The kinds of children this route's handler may emit. Children of
    /// these kinds that are no longer emitted are pruned.
    pub fn emits(&self) -> &'static [Kind] {
        match self {
            Self::ProjectAnnotation | Self::JobPod => &[],
            Self::ProjectPolicy => &[Kind::MeshTlsAuthentication, Kind::AuthorizationPolicy],
            Self::ManagedService => &[Kind::Server],
            Self::IngressEndpoints => &[Kind::NetworkAuthentication],
            Self::BuilderDeployment => &[Kind::Server, Kind::AuthorizationPolicy],
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Kind ===

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::MeshTlsAuthentication => "MeshTLSAuthentication",
            Self::AuthorizationPolicy => "AuthorizationPolicy",
            Self::NetworkAuthentication => "NetworkAuthentication",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Desired ===

impl Desired {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Server(_) => Kind::Server,
            Self::MeshTls(_) => Kind::MeshTlsAuthentication,
            Self::AuthorizationPolicy(_) => Kind::AuthorizationPolicy,
            Self::NetworkAuthentication(_) => Kind::NetworkAuthentication,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Server(o) => o.meta(),
            Self::MeshTls(o) => o.meta(),
            Self::AuthorizationPolicy(o) => o.meta(),
            Self::NetworkAuthentication(o) => o.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Server(o) => o.meta_mut(),
            Self::MeshTls(o) => o.meta_mut(),
            Self::AuthorizationPolicy(o) => o.meta_mut(),
            Self::NetworkAuthentication(o) => o.meta_mut(),
        }
    }

    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        self.meta().namespace.clone()
    }
}

// === impl Handlers ===

impl<S: Store> Handlers<S> {
    pub fn new(store: S, config: Config) -> Self {
        let Config {
            debug_image,
            cluster_domain,
            ingress_namespace,
        } = config;
        Self {
            annotator: Annotator::new(store.clone()),
            reaper: Reaper::new(store.clone(), debug_image),
            compiler: Compiler::new(store.clone(), cluster_domain, ingress_namespace.clone()),
            isolator: Isolator::new(store, ingress_namespace),
        }
    }

    /// Invokes exactly one handler for the trigger, returning the children
    /// it wants to exist.
    ///
    /// `None` means the handler skipped the trigger (or emits nothing by
    /// nature), so no children should be pruned. `Some` is the complete set
    /// of children, even when empty.
    pub async fn handle(&self, trigger: &Trigger) -> Result<Option<Vec<Desired>>> {
        match trigger {
            Trigger::ProjectAnnotation(ns) => {
                self.annotator.annotate(ns).await?;
                Ok(None)
            }
            Trigger::ProjectPolicy(ns) => self.compiler.compile(ns).await.map(Some),
            Trigger::JobPod(pod) => {
                self.reaper.reap(pod).await?;
                Ok(None)
            }
            Trigger::ManagedService(svc) => Ok(Some(
                server::synthesize(svc)
                    .into_iter()
                    .map(Desired::Server)
                    .collect(),
            )),
            Trigger::IngressEndpoints(ep) => Ok(Some(vec![Desired::NetworkAuthentication(
                ingress::authenticate(ep),
            )])),
            Trigger::BuilderDeployment(deploy) => self.isolator.isolate(deploy).await,
        }
    }
}
