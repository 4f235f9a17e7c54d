use crate::{
    apply::Applier,
    core::{Config, Handlers},
    metrics::ReconcileMetrics,
    routes::{self, Context, Selectors},
    store::KubeStore,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "project-policy",
    about = "Provisions mesh authorization policy for projects",
    version
)]
pub struct Args {
    #[clap(
        long,
        default_value = "project_policy=info,warn",
        env = "PROJECT_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The image of the ephemeral container that stops the proxy of a
    /// completed job. Must provide `curl`.
    #[clap(long, default_value = "ghcr.io/acorn-io/acorn-linkerd-plugin:main")]
    debug_image: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// The Endpoints object listing the ingress controller's pods.
    #[clap(long, default_value = "traefik")]
    ingress_endpoint_name: String,

    #[clap(long, default_value = "traefik")]
    ingress_endpoint_namespace: String,

    /// The namespace in which image builders are deployed.
    #[clap(long, default_value = "acorn-image-system")]
    build_namespace: String,

    #[clap(long, default_value = "5000")]
    request_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            debug_image,
            cluster_domain,
            ingress_endpoint_name,
            ingress_endpoint_namespace,
            build_namespace,
            request_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let timeout = Duration::from_millis(request_timeout_ms);
        let store = KubeStore::new(runtime.client(), timeout);
        let handlers = Handlers::new(
            store,
            Config {
                debug_image,
                cluster_domain,
                ingress_namespace: ingress_endpoint_namespace.clone(),
            },
        );
        let applier = Applier::new(runtime.client(), timeout, metrics.clone());
        let ctx = Arc::new(Context::new(handlers, applier, metrics));

        let selectors = Selectors::new(
            ingress_endpoint_name,
            ingress_endpoint_namespace,
            build_namespace,
        );
        info!(
            project = %selectors.project,
            managed = %selectors.managed,
            ingress = %selectors.ingress_name,
            "Starting controllers"
        );
        routes::spawn(runtime.client(), &selectors, ctx, runtime.shutdown_handle());

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the background tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
