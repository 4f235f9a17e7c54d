use crate::{
    k8s::{
        labels::Selector,
        policy::{
            AuthorizationPolicy, AuthorizationPolicySpec, LocalTargetRef, MeshTLSAuthentication,
            MeshTLSAuthenticationSpec, NamespacedTargetRef, NetworkAuthentication, Server,
        },
        Namespace, ObjectMeta, ResourceExt,
    },
    names::safe_concat_name,
    Desired, Store, APP_NAMESPACE_LABEL,
};
use anyhow::Result;

/// The name of the single `NetworkAuthentication` describing ingress pods.
pub const INGRESS_NETWORK_AUTHN_NAME: &str = "acorn-ingress-network-authentication";

/// Describes which clients may reach a `Server`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reachability {
    /// Workloads of the named project and the ingress.
    Project(String),

    /// Only the ingress.
    IngressOnly,
}

/// Compiles the mesh identities and authorization policies of a project.
#[derive(Clone, Debug)]
pub struct Compiler<S> {
    store: S,
    cluster_domain: String,
    ingress_namespace: String,
}

/// Returns the name of a project's `MeshTLSAuthentication`.
pub fn mesh_authn_name(project: &str) -> String {
    safe_concat_name(&["mesh-authn-profile", project])
}

/// Returns the identity glob matching every service account of a namespace.
pub fn identity_glob(namespace: &str, cluster_domain: &str) -> String {
    format!("*.{namespace}.serviceaccount.identity.linkerd.{cluster_domain}")
}

/// Builds the authorization policies that admit `reachability`'s clients to
/// `server`.
pub fn policies_for(
    server: &Server,
    reachability: &Reachability,
    ingress_namespace: &str,
) -> Vec<AuthorizationPolicy> {
    let server_name = server.name_any();
    let mut policies = Vec::with_capacity(2);

    if let Reachability::Project(project) = reachability {
        policies.push(policy(
            server,
            safe_concat_name(&["authz-profile", project, &server_name]),
            NamespacedTargetRef::to_kind::<MeshTLSAuthentication>(
                mesh_authn_name(project),
                project.clone(),
            ),
        ));
    }

    policies.push(policy(
        server,
        safe_concat_name(&["authz-profile-ingress", &server_name]),
        NamespacedTargetRef::to_kind::<NetworkAuthentication>(
            INGRESS_NETWORK_AUTHN_NAME,
            ingress_namespace,
        ),
    ));

    policies
}

fn policy(server: &Server, name: String, authn: NamespacedTargetRef) -> AuthorizationPolicy {
    AuthorizationPolicy {
        metadata: ObjectMeta {
            namespace: server.namespace(),
            name: Some(name),
            ..Default::default()
        },
        spec: AuthorizationPolicySpec {
            target_ref: LocalTargetRef::from_resource(server),
            required_authentication_refs: vec![authn],
        },
    }
}

// === impl Compiler ===

impl<S: Store> Compiler<S> {
    pub fn new(
        store: S,
        cluster_domain: impl Into<String>,
        ingress_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cluster_domain: cluster_domain.into(),
            ingress_namespace: ingress_namespace.into(),
        }
    }

    /// Computes the desired policy objects of a project namespace.
    ///
    /// A project without app namespaces has nobody to authorize, so nothing
    /// is emitted for it.
    pub async fn compile(&self, project: &Namespace) -> Result<Vec<Desired>> {
        let project = project.name_any();

        let selector = Selector::from_iter(Some((
            APP_NAMESPACE_LABEL.to_string(),
            project.clone(),
        )));
        let mut app_namespaces = self
            .store
            .list_namespaces(&selector)
            .await?
            .into_iter()
            .map(|ns| ns.name_any())
            .collect::<Vec<_>>();
        app_namespaces.sort();
        app_namespaces.dedup();

        if app_namespaces.is_empty() {
            tracing::debug!(%project, "Project has no app namespaces");
            return Ok(vec![]);
        }

        let identities = app_namespaces
            .iter()
            .map(|ns| identity_glob(ns, &self.cluster_domain))
            .collect();
        let authn = MeshTLSAuthentication {
            metadata: ObjectMeta {
                namespace: Some(project.clone()),
                name: Some(mesh_authn_name(&project)),
                ..Default::default()
            },
            spec: MeshTLSAuthenticationSpec {
                identities: Some(identities),
                identity_refs: None,
            },
        };

        let mut servers = Vec::new();
        for ns in &app_namespaces {
            servers.extend(self.store.list_servers(ns).await?);
        }
        servers.sort_by_key(|s| (s.namespace(), s.name_any()));

        let reachability = Reachability::Project(project.clone());
        let mut desired = vec![Desired::MeshTls(authn)];
        for server in &servers {
            desired.extend(
                policies_for(server, &reachability, &self.ingress_namespace)
                    .into_iter()
                    .map(Desired::AuthorizationPolicy),
            );
        }

        tracing::debug!(
            %project,
            namespaces = app_namespaces.len(),
            servers = servers.len(),
            "Compiled project policy",
        );
        Ok(desired)
    }
}
