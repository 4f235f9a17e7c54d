use std::net::IpAddr;

/// Authenticates clients by their source network.
#[derive(
    Clone,
    Debug,
    Default,
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
    kind = "NetworkAuthentication",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAuthenticationSpec {
    pub networks: Vec<Network>,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct Network {
    pub cidr: ipnet::IpNet,
}

// === impl Network ===

impl Network {
    /// A network containing exactly one host.
    pub fn host(addr: IpAddr) -> Self {
        Self {
            cidr: ipnet::IpNet::from(addr),
        }
    }
}
