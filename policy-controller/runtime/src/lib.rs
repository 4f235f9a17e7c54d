#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use project_policy_controller_core as core;
pub use project_policy_controller_k8s_api as k8s;

mod apply;
mod args;
mod metrics;
mod routes;
mod store;

pub use self::args::Args;

use std::time::Duration;

/// Fails a reconcile so that it is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Bounds an API request by `timeout`.
async fn with_timeout<T>(
    timeout: Duration,
    req: impl std::future::Future<Output = kube::Result<T>>,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, req).await {
        Ok(res) => res.map_err(Into::into),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}
