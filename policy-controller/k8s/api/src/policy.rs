pub mod authorization_policy;
pub mod meshtls_authentication;
pub mod network_authentication;
pub mod server;
pub mod target_ref;

pub use self::{
    authorization_policy::{AuthorizationPolicy, AuthorizationPolicySpec},
    meshtls_authentication::{MeshTLSAuthentication, MeshTLSAuthenticationSpec},
    network_authentication::{Network, NetworkAuthentication, NetworkAuthenticationSpec},
    server::{Server, ServerSpec},
    target_ref::{LocalTargetRef, NamespacedTargetRef},
};

/// The API group of all Linkerd policy resources.
pub const POLICY_API_GROUP: &str = "policy.linkerd.io";

fn targets_kind<T>(group: Option<&str>, kind: &str) -> bool
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();

    let mut t_group = &*T::group(&dt);
    if t_group.is_empty() {
        t_group = "core";
    }

    group.unwrap_or("core").eq_ignore_ascii_case(t_group)
        && kind.eq_ignore_ascii_case(&T::kind(&dt))
}
