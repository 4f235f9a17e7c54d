use super::{LocalTargetRef, NamespacedTargetRef};

/// Authorizes clients that satisfy all of the required authentications to
/// reach the target resource.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "policy.linkerd.io",
    version = "v1alpha1",
    kind = "AuthorizationPolicy",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicySpec {
    pub target_ref: LocalTargetRef,
    pub required_authentication_refs: Vec<NamespacedTargetRef>,
}
