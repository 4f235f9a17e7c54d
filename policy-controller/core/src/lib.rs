#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotation;
pub mod authz;
pub mod builder;
mod dispatch;
pub mod ingress;
pub mod names;
pub mod reaper;
pub mod server;
mod store;

#[cfg(test)]
mod fake;

pub use self::{
    dispatch::{Config, Desired, Handlers, Kind, Route, Trigger},
    store::Store,
};
pub use project_policy_controller_k8s_api as k8s;

/// Marks a namespace as the root of a project.
pub const PROJECT_LABEL: &str = "acorn.io/project";

/// Marks workloads and services managed by the platform.
pub const MANAGED_LABEL: &str = "acorn.io/managed";

pub const APP_NAME_LABEL: &str = "acorn.io/app-name";

/// Names the project an app namespace (or managed object) belongs to.
pub const APP_NAMESPACE_LABEL: &str = "acorn.io/app-namespace";

/// Present on pods that run to completion.
pub const JOB_NAME_LABEL: &str = "acorn.io/job-name";

/// Set on every generated `Server` to name the service it was derived from.
pub const SERVICE_NAME_LABEL: &str = "acorn.io/service-name";

/// Set on every generated object to the UID of the object that caused it.
pub const OWNER_UID_LABEL: &str = "linkerd.acorn.io/owner-uid";

pub const INJECT_ANNOTATION: &str = "linkerd.io/inject";
pub const INJECT_ENABLED: &str = "enabled";

/// The name of the mesh sidecar container.
pub const PROXY_CONTAINER_NAME: &str = "linkerd-proxy";
