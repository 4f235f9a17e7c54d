use crate::{
    k8s::{EphemeralContainer, Pod, ResourceExt},
    Store, JOB_NAME_LABEL, PROXY_CONTAINER_NAME,
};
use anyhow::Result;

/// The name of the ephemeral container that stops the proxy.
pub const KILL_CONTAINER_NAME: &str = "shutdown-sidecar";

/// The proxy's admin endpoint that initiates a graceful shutdown.
const SHUTDOWN_URL: &str = "http://localhost:4191/shutdown";

/// The outcome of evaluating a pod against the reaper's state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The pod is not a job pod.
    Ignore,

    /// Some primary container has not yet terminated.
    Waiting,

    /// The pod has no proxy.
    NoSidecar,

    /// An ephemeral container has already been attached.
    AlreadyKilled,

    /// The proxy has already stopped on its own.
    SidecarStopped,

    /// The proxy must be stopped.
    Kill,
}

/// Stops the proxy of job pods once their primary containers have finished.
#[derive(Clone, Debug)]
pub struct Reaper<S> {
    store: S,
    debug_image: String,
}

// === impl Verdict ===

impl Verdict {
    /// Evaluates a pod. Checks are ordered so that pods that cannot be acted
    /// on yet are rejected before their ephemeral containers are inspected.
    pub fn evaluate(pod: &Pod) -> Self {
        if !pod.labels().contains_key(JOB_NAME_LABEL) {
            return Self::Ignore;
        }

        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default();

        let mut sidecar = None;
        for status in statuses {
            if status.name == PROXY_CONTAINER_NAME {
                sidecar = Some(status);
                continue;
            }
            let terminated = status
                .state
                .as_ref()
                .map_or(false, |s| s.terminated.is_some());
            if !terminated {
                return Self::Waiting;
            }
        }

        let Some(sidecar) = sidecar else {
            return Self::NoSidecar;
        };

        let has_ephemeral = pod
            .spec
            .as_ref()
            .and_then(|s| s.ephemeral_containers.as_ref())
            .map_or(false, |e| !e.is_empty());
        if has_ephemeral {
            return Self::AlreadyKilled;
        }

        let running = sidecar
            .state
            .as_ref()
            .map_or(false, |s| s.running.is_some());
        if !running {
            return Self::SidecarStopped;
        }

        Self::Kill
    }
}

// === impl Reaper ===

impl<S: Store> Reaper<S> {
    pub fn new(store: S, debug_image: impl Into<String>) -> Self {
        Self {
            store,
            debug_image: debug_image.into(),
        }
    }

    /// Attaches the shutdown container to the pod if, and only if, the pod
    /// evaluates to [`Verdict::Kill`].
    pub async fn reap(&self, pod: &Pod) -> Result<Verdict> {
        let verdict = Verdict::evaluate(pod);
        if verdict != Verdict::Kill {
            tracing::debug!(
                namespace = %pod.namespace().unwrap_or_default(),
                name = %pod.name_any(),
                ?verdict,
                "Skipping pod",
            );
            return Ok(verdict);
        }

        let mut pod = pod.clone();
        pod.spec
            .get_or_insert_with(Default::default)
            .ephemeral_containers
            .get_or_insert_with(Vec::new)
            .push(self.kill_container());
        self.store.update_ephemeral_containers(&pod).await?;
        tracing::info!(
            namespace = %pod.namespace().unwrap_or_default(),
            name = %pod.name_any(),
            "Stopping proxy",
        );
        Ok(verdict)
    }

    fn kill_container(&self) -> EphemeralContainer {
        EphemeralContainer {
            name: KILL_CONTAINER_NAME.to_string(),
            image: Some(self.debug_image.clone()),
            image_pull_policy: Some("Always".to_string()),
            command: Some(
                ["curl", "-X", "POST", SHUTDOWN_URL]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            target_container_name: Some(PROXY_CONTAINER_NAME.to_string()),
            ..Default::default()
        }
    }
}
