use crate::{
    core::{Desired, Kind, Trigger, OWNER_UID_LABEL},
    k8s::{
        policy::{AuthorizationPolicy, MeshTLSAuthentication, NetworkAuthentication, Server},
        Api, Client, DeleteParams, ListParams, NamespaceResourceScope, OwnerReference, Patch,
        PatchParams, Resource, ResourceExt,
    },
    metrics::ReconcileMetrics,
    with_timeout, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::HashSet, fmt::Debug, time::Duration};

/// The field manager that owns every applied field.
pub(crate) const FIELD_MANAGER: &str = "project-policy-controller";

/// Upserts the children emitted for a trigger and deletes the ones it no
/// longer emits.
#[derive(Clone)]
pub(crate) struct Applier {
    client: Client,
    timeout: Duration,
    metrics: ReconcileMetrics,
}

type ObjectKey = (String, String);

impl Applier {
    pub(crate) fn new(client: Client, timeout: Duration, metrics: ReconcileMetrics) -> Self {
        Self {
            client,
            timeout,
            metrics,
        }
    }

    /// Applies every desired child before pruning anything, so a failed
    /// apply leaves the previous children in place until the retry.
    pub(crate) async fn reconcile(
        &self,
        trigger: &Trigger,
        mut desired: Vec<Desired>,
    ) -> Result<(), Error> {
        let kinds = trigger.route().emits();
        if kinds.is_empty() {
            return Ok(());
        }

        let Some(owner) = trigger.owner_ref() else {
            tracing::warn!(
                route = %trigger.route(),
                name = trigger.meta().name.as_deref().unwrap_or_default(),
                "Trigger has no UID; skipping apply",
            );
            return Ok(());
        };

        for child in &mut desired {
            stamp(child, &owner);
        }

        for child in &desired {
            match child {
                Desired::Server(o) => self.apply(o).await?,
                Desired::MeshTls(o) => self.apply(o).await?,
                Desired::AuthorizationPolicy(o) => self.apply(o).await?,
                Desired::NetworkAuthentication(o) => self.apply(o).await?,
            }
            self.metrics.applied(child.kind());
            tracing::debug!(
                kind = %child.kind(),
                namespace = %child.namespace().unwrap_or_default(),
                name = %child.name(),
                "Applied",
            );
        }

        for &kind in kinds {
            let keep = keep_set(kind, &desired);
            let pruned = match kind {
                Kind::Server => self.prune::<Server>(&owner.uid, &keep).await?,
                Kind::MeshTlsAuthentication => {
                    self.prune::<MeshTLSAuthentication>(&owner.uid, &keep).await?
                }
                Kind::AuthorizationPolicy => {
                    self.prune::<AuthorizationPolicy>(&owner.uid, &keep).await?
                }
                Kind::NetworkAuthentication => {
                    self.prune::<NetworkAuthentication>(&owner.uid, &keep).await?
                }
            };
            self.metrics.pruned(kind, pruned as u64);
        }

        Ok(())
    }

    async fn apply<K>(&self, obj: &K) -> Result<(), Error>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
        K: Clone + Debug + DeserializeOwned + Serialize,
    {
        let api = Api::<K>::namespaced(self.client.clone(), &obj.namespace().unwrap_or_default());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        with_timeout(
            self.timeout,
            api.patch(&obj.name_any(), &params, &Patch::Apply(obj)),
        )
        .await?;
        Ok(())
    }

    /// Deletes objects of kind `K` owned by `uid` that are not in `keep`,
    /// returning the number deleted.
    async fn prune<K>(&self, uid: &str, keep: &HashSet<ObjectKey>) -> Result<usize, Error>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
        K: Clone + Debug + DeserializeOwned,
    {
        let params = ListParams::default().labels(&owner_selector(uid));
        let owned = with_timeout(self.timeout, Api::<K>::all(self.client.clone()).list(&params))
            .await?
            .items
            .iter()
            .map(|o| (o.namespace().unwrap_or_default(), o.name_any()))
            .collect::<Vec<_>>();

        let mut pruned = 0;
        for (namespace, name) in stale(owned, keep) {
            let api = Api::<K>::namespaced(self.client.clone(), &namespace);
            match with_timeout(self.timeout, api.delete(&name, &DeleteParams::default())).await {
                Ok(_) => {}
                // Already gone.
                Err(Error::Kube(kube::Error::Api(e))) if e.code == 404 => continue,
                Err(error) => return Err(error),
            }
            tracing::info!(kind = %K::kind(&()), %namespace, %name, "Deleted stale object");
            pruned += 1;
        }
        Ok(pruned)
    }
}

/// Marks a child as owned by the trigger, both for garbage collection and so
/// that it can be found again for pruning.
pub(crate) fn stamp(child: &mut Desired, owner: &OwnerReference) {
    let meta = child.meta_mut();
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(OWNER_UID_LABEL.to_string(), owner.uid.clone());
    meta.owner_references = Some(vec![owner.clone()]);
}

pub(crate) fn owner_selector(uid: &str) -> String {
    format!("{OWNER_UID_LABEL}={uid}")
}

fn keep_set(kind: Kind, desired: &[Desired]) -> HashSet<ObjectKey> {
    desired
        .iter()
        .filter(|d| d.kind() == kind)
        .map(|d| (d.namespace().unwrap_or_default(), d.name()))
        .collect()
}

fn stale(owned: Vec<ObjectKey>, keep: &HashSet<ObjectKey>) -> Vec<ObjectKey> {
    owned.into_iter().filter(|k| !keep.contains(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{
        policy::{
            server::{Port, Selector},
            NetworkAuthenticationSpec, ServerSpec,
        },
        Namespace, ObjectMeta, Service,
    };
    use http::{Method, Request, Response, StatusCode};
    use kube::client::Body;
    use maplit::{btreemap, convert_args};
    use pretty_assertions::assert_eq;
    use prometheus_client::registry::Registry;
    use serde_json::json;
    use std::{num::NonZeroU16, sync::Arc};
    use tokio::time;

    type ApiServer = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    const SERVERS: &str = "/apis/policy.linkerd.io/v1beta2/servers";

    fn project() -> Arc<Namespace> {
        Arc::new(Namespace {
            metadata: ObjectMeta {
                name: Some("acme".to_string()),
                uid: Some("0c7a2f9e".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn service(uid: Option<&str>) -> Trigger {
        Trigger::ManagedService(Arc::new(Service {
            metadata: ObjectMeta {
                namespace: Some("app".to_string()),
                name: Some("web".to_string()),
                uid: uid.map(Into::into),
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    fn authn(ns: &str, name: &str) -> Desired {
        Desired::NetworkAuthentication(NetworkAuthentication {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                labels: Some(convert_args!(btreemap!("app" => "ingress"))),
                ..Default::default()
            },
            spec: NetworkAuthenticationSpec::default(),
        })
    }

    fn server(name: &str) -> Server {
        Server {
            metadata: ObjectMeta {
                namespace: Some("app".to_string()),
                name: Some(name.to_string()),
                labels: Some(convert_args!(btreemap!(OWNER_UID_LABEL => "5d1e"))),
                ..Default::default()
            },
            spec: ServerSpec {
                selector: Selector::Pod(Default::default()),
                port: Port::Number(NonZeroU16::new(80).unwrap()),
            },
        }
    }

    fn mock_applier() -> (Applier, ApiServer, Registry) {
        let (svc, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(svc, "default");
        let mut prom = Registry::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let applier = Applier::new(client, time::Duration::from_secs(5), metrics);
        (applier, handle, prom)
    }

    fn status(code: StatusCode) -> serde_json::Value {
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": if code.is_success() { "Success" } else { "Failure" },
            "message": code.to_string(),
            "reason": code.canonical_reason().unwrap_or_default(),
            "code": code.as_u16(),
        })
    }

    /// Answers the next request, which must match `method` and `path`.
    async fn respond(
        api: &mut ApiServer,
        method: Method,
        path: &str,
        code: StatusCode,
        body: serde_json::Value,
    ) {
        let (req, send) = api.next_request().await.expect("a request must be issued");
        assert_eq!(*req.method(), method);
        assert_eq!(req.uri().path(), path);
        let rsp = Response::builder()
            .status(code)
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send.send_response(rsp);
    }

    /// Asserts that no further request reaches the API server.
    async fn idle(mut api: ApiServer) {
        let next = time::timeout(time::Duration::from_millis(100), api.next_request()).await;
        assert!(
            matches!(next, Err(_) | Ok(None)),
            "unexpected request: {:?}",
            next.ok().flatten().map(|(req, _)| req.uri().clone())
        );
    }

    fn encode(prom: &Registry) -> String {
        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, prom).unwrap();
        out
    }

    #[test]
    fn stamps_owner() {
        let owner = Trigger::ProjectPolicy(project())
            .owner_ref()
            .expect("namespace has a uid");
        assert_eq!(owner.api_version, "v1");
        assert_eq!(owner.kind, "Namespace");
        assert_eq!(owner.controller, None);

        let mut child = authn("traefik", "acorn-ingress-network-authentication");
        stamp(&mut child, &owner);
        assert_eq!(
            child.meta().labels,
            Some(convert_args!(btreemap!(
                "app" => "ingress",
                "linkerd.acorn.io/owner-uid" => "0c7a2f9e"
            )))
        );
        assert_eq!(child.meta().owner_references, Some(vec![owner.clone()]));

        // Stamping is idempotent.
        let once = child.clone();
        stamp(&mut child, &owner);
        assert_eq!(child, once);
    }

    #[test]
    fn selects_stale_children() {
        let name = "acorn-ingress-network-authentication";
        let mut srv = server(name);
        srv.metadata.namespace = Some("traefik".to_string());
        let desired = vec![authn("traefik", name), Desired::Server(srv)];
        let keep = keep_set(Kind::NetworkAuthentication, &desired);
        assert_eq!(keep.len(), 1);

        let owned = vec![
            ("traefik".to_string(), name.to_string()),
            ("traefik".to_string(), "old-authn".to_string()),
            ("other".to_string(), name.to_string()),
        ];
        assert_eq!(
            stale(owned, &keep),
            vec![
                ("traefik".to_string(), "old-authn".to_string()),
                ("other".to_string(), name.to_string()),
            ]
        );

        // A Server of the same name doesn't protect an authentication.
        let servers = keep_set(Kind::Server, &desired);
        assert!(servers.contains(&("traefik".to_string(), name.to_string())));
    }

    #[test]
    fn owner_label_query() {
        assert_eq!(owner_selector("0c7a2f9e"), "linkerd.acorn.io/owner-uid=0c7a2f9e");
    }

    #[tokio::test]
    async fn failed_apply_skips_prune() {
        let (applier, mut api, prom) = mock_applier();
        let server_task = tokio::spawn(async move {
            respond(
                &mut api,
                Method::PATCH,
                "/apis/policy.linkerd.io/v1beta2/namespaces/app/servers/web-http",
                StatusCode::INTERNAL_SERVER_ERROR,
                status(StatusCode::INTERNAL_SERVER_ERROR),
            )
            .await;
            api
        });

        let res = applier
            .reconcile(&service(Some("5d1e")), vec![Desired::Server(server("web-http"))])
            .await;
        assert!(
            matches!(res, Err(Error::Kube(kube::Error::Api(ref e))) if e.code == 500),
            "{res:?}"
        );

        let api = server_task.await.expect("api server must not panic");
        drop(applier);
        idle(api).await;
        assert!(!encode(&prom).contains("reconcile_applied_total{"));
    }

    #[tokio::test]
    async fn prunes_after_applying() {
        let (applier, mut api, prom) = mock_applier();
        let server_task = tokio::spawn(async move {
            respond(
                &mut api,
                Method::PATCH,
                "/apis/policy.linkerd.io/v1beta2/namespaces/app/servers/web-http",
                StatusCode::OK,
                serde_json::to_value(server("web-http")).unwrap(),
            )
            .await;
            respond(
                &mut api,
                Method::GET,
                SERVERS,
                StatusCode::OK,
                json!({
                    "apiVersion": "policy.linkerd.io/v1beta2",
                    "kind": "ServerList",
                    "metadata": { "resourceVersion": "7" },
                    "items": [
                        serde_json::to_value(server("web-http")).unwrap(),
                        serde_json::to_value(server("web-grpc")).unwrap(),
                        serde_json::to_value(server("web-admin")).unwrap(),
                    ],
                }),
            )
            .await;
            respond(
                &mut api,
                Method::DELETE,
                "/apis/policy.linkerd.io/v1beta2/namespaces/app/servers/web-grpc",
                StatusCode::OK,
                status(StatusCode::OK),
            )
            .await;
            // Deleted concurrently by someone else.
            respond(
                &mut api,
                Method::DELETE,
                "/apis/policy.linkerd.io/v1beta2/namespaces/app/servers/web-admin",
                StatusCode::NOT_FOUND,
                status(StatusCode::NOT_FOUND),
            )
            .await;
            api
        });

        applier
            .reconcile(&service(Some("5d1e")), vec![Desired::Server(server("web-http"))])
            .await
            .expect("a missing stale object is already gone");

        let api = server_task.await.expect("api server must not panic");
        drop(applier);
        idle(api).await;

        let metrics = encode(&prom);
        assert!(metrics.contains("reconcile_applied_total{kind=\"Server\"} 1"), "{metrics}");
        assert!(metrics.contains("reconcile_pruned_total{kind=\"Server\"} 1"), "{metrics}");
    }

    #[tokio::test]
    async fn triggers_without_uid_are_not_applied() {
        let (applier, api, _prom) = mock_applier();
        applier
            .reconcile(&service(None), vec![Desired::Server(server("web-http"))])
            .await
            .expect("skipped");
        drop(applier);
        idle(api).await;
    }

    #[tokio::test]
    async fn routes_without_children_are_not_applied() {
        let (applier, api, _prom) = mock_applier();
        applier
            .reconcile(&Trigger::ProjectAnnotation(project()), vec![])
            .await
            .expect("nothing to apply");
        drop(applier);
        idle(api).await;
    }
}
