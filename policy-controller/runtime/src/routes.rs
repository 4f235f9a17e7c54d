use crate::{
    apply::Applier,
    core::{
        Handlers, Route, Store, Trigger, APP_NAMESPACE_LABEL, APP_NAME_LABEL, JOB_NAME_LABEL,
        MANAGED_LABEL, PROJECT_LABEL,
    },
    k8s::{
        labels::{Expression, Selector},
        policy::Server,
        Api, Client, Deployment, Endpoints, Namespace, Pod, Resource, ResourceExt, Service,
    },
    metrics::ReconcileMetrics,
    Error,
};
use futures::prelude::*;
use kube::runtime::{controller::Action, reflector::ObjectRef, watcher, Controller};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};
use tokio::{sync::oneshot, time::Duration};
use tracing::{info_span, Instrument};

/// Project policy is recomputed at least this often, even without changes.
const RESYNC_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How long a failed reconcile waits before it is retried.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Which objects each route is registered for. Computed once at startup.
#[derive(Clone, Debug)]
pub(crate) struct Selectors {
    pub(crate) project: Selector,
    pub(crate) managed: Selector,
    pub(crate) job: Selector,
    pub(crate) ingress_name: String,
    pub(crate) ingress_namespace: String,
    pub(crate) build_namespace: String,
}

/// Shared by every reconcile of every route.
pub(crate) struct Context<S> {
    handlers: Handlers<S>,
    applier: Applier,
    metrics: ReconcileMetrics,
}

// === impl Selectors ===

impl Selectors {
    pub(crate) fn new(
        ingress_name: impl Into<String>,
        ingress_namespace: impl Into<String>,
        build_namespace: impl Into<String>,
    ) -> Self {
        let project = Selector::from_iter(Some((PROJECT_LABEL, "true")));
        let managed = Selector::from_iter(Some((MANAGED_LABEL, "true")))
            .and(Expression::exists(APP_NAME_LABEL))
            .and(Expression::exists(APP_NAMESPACE_LABEL));
        let job = managed.clone().and(Expression::exists(JOB_NAME_LABEL));
        Self {
            project,
            managed,
            job,
            ingress_name: ingress_name.into(),
            ingress_namespace: ingress_namespace.into(),
            build_namespace: build_namespace.into(),
        }
    }

    pub(crate) fn watch_config(&self, route: Route) -> watcher::Config {
        let config = watcher::Config::default();
        match route {
            Route::ProjectAnnotation | Route::ProjectPolicy => {
                config.labels(&self.project.to_string())
            }
            Route::JobPod => config.labels(&self.job.to_string()),
            Route::ManagedService => config.labels(&self.managed.to_string()),
            Route::IngressEndpoints => config.fields(&format!("metadata.name={}", self.ingress_name)),
            Route::BuilderDeployment => config,
        }
    }
}

// === impl Context ===

impl<S: Store> Context<S> {
    pub(crate) fn new(handlers: Handlers<S>, applier: Applier, metrics: ReconcileMetrics) -> Self {
        Self {
            handlers,
            applier,
            metrics,
        }
    }
}

/// Spawns one controller per route. Each stops taking new work when the
/// runtime begins shutdown and completes once its in-flight reconciles have.
pub(crate) fn spawn<S: Store>(
    client: Client,
    selectors: &Selectors,
    ctx: Arc<Context<S>>,
    drain: kubert::shutdown::Watch,
) {
    let namespaces = Api::<Namespace>::all(client.clone());

    let ctrl = Controller::new(
        namespaces.clone(),
        selectors.watch_config(Route::ProjectAnnotation),
    );
    tokio::spawn(
        run(ctrl, Trigger::ProjectAnnotation, ctx.clone(), drain.clone())
            .instrument(info_span!("project-annotation")),
    );

    // Project policy also depends on the project's app namespaces and on the
    // servers within them.
    let ctrl = Controller::new(
        namespaces.clone(),
        selectors.watch_config(Route::ProjectPolicy),
    )
    .watches(
        namespaces,
        watcher::Config::default().labels(APP_NAMESPACE_LABEL),
        |ns: Namespace| project_ref(&ns),
    )
    .watches(
        Api::<Server>::all(client.clone()),
        watcher::Config::default().labels(APP_NAMESPACE_LABEL),
        |srv: Server| project_ref(&srv),
    );
    tokio::spawn(
        run(ctrl, Trigger::ProjectPolicy, ctx.clone(), drain.clone())
            .instrument(info_span!("project-policy")),
    );

    let ctrl = Controller::new(
        Api::<Pod>::all(client.clone()),
        selectors.watch_config(Route::JobPod),
    );
    tokio::spawn(
        run(ctrl, Trigger::JobPod, ctx.clone(), drain.clone()).instrument(info_span!("job-pod")),
    );

    let ctrl = Controller::new(
        Api::<Service>::all(client.clone()),
        selectors.watch_config(Route::ManagedService),
    );
    tokio::spawn(
        run(ctrl, Trigger::ManagedService, ctx.clone(), drain.clone())
            .instrument(info_span!("managed-service")),
    );

    let ctrl = Controller::new(
        Api::<Endpoints>::namespaced(client.clone(), &selectors.ingress_namespace),
        selectors.watch_config(Route::IngressEndpoints),
    );
    tokio::spawn(
        run(ctrl, Trigger::IngressEndpoints, ctx.clone(), drain.clone())
            .instrument(info_span!("ingress-endpoints")),
    );

    let ctrl = Controller::new(
        Api::<Deployment>::namespaced(client, &selectors.build_namespace),
        selectors.watch_config(Route::BuilderDeployment),
    );
    tokio::spawn(
        run(ctrl, Trigger::BuilderDeployment, ctx, drain)
            .instrument(info_span!("builder-deployment")),
    );
}

/// Maps an object labeled with a project onto that project's namespace.
fn project_ref<K: Resource>(obj: &K) -> Option<ObjectRef<Namespace>> {
    obj.labels()
        .get(APP_NAMESPACE_LABEL)
        .map(|project| ObjectRef::new(project))
}

async fn run<K, S>(
    ctrl: Controller<K>,
    trigger: fn(Arc<K>) -> Trigger,
    ctx: Arc<Context<S>>,
    drain: kubert::shutdown::Watch,
) where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    S: Store,
{
    let (close_tx, close_rx) = oneshot::channel::<()>();
    let ctrl = ctrl
        .graceful_shutdown_on(async move {
            let _ = close_rx.await;
        })
        .run(
            move |obj, ctx| reconcile(trigger(obj), ctx),
            move |obj, error, ctx| error_policy(trigger(obj), error, ctx),
            ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => tracing::trace!(%obj, "Reconciled"),
                Err(error) => tracing::debug!(%error, "Controller error"),
            }
        });
    tokio::pin!(ctrl);

    tokio::select! {
        _ = (&mut ctrl) => {}
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(ctrl).await;
        }
    }
    tracing::debug!("Controller stopped");
}

async fn reconcile<S: Store>(trigger: Trigger, ctx: Arc<Context<S>>) -> Result<Action, Error> {
    let route = trigger.route();
    ctx.metrics.reconcile(route);

    if let Some(desired) = ctx.handlers.handle(&trigger).await? {
        ctx.applier.reconcile(&trigger, desired).await?;
    }

    Ok(requeue(route))
}

/// Project policy is also resynced periodically, since an app namespace that
/// moves between projects only re-triggers its new project.
fn requeue(route: Route) -> Action {
    match route {
        Route::ProjectPolicy => Action::requeue(RESYNC_PERIOD),
        _ => Action::await_change(),
    }
}

fn error_policy<S: Store>(trigger: Trigger, error: &Error, ctx: Arc<Context<S>>) -> Action {
    let route = trigger.route();
    ctx.metrics.failure(route);
    let meta = trigger.meta();
    tracing::warn!(
        %route,
        namespace = meta.namespace.as_deref().unwrap_or_default(),
        name = meta.name.as_deref().unwrap_or_default(),
        %error,
        "Reconcile failed",
    );
    Action::requeue(ERROR_BACKOFF)
}
