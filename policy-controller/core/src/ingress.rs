use crate::{
    authz::INGRESS_NETWORK_AUTHN_NAME,
    k8s::{
        policy::{Network, NetworkAuthentication, NetworkAuthenticationSpec},
        Endpoints, ObjectMeta, ResourceExt,
    },
};
use std::net::IpAddr;

/// Describes every ingress pod as a single-host network.
///
/// The result replaces any previously applied network list wholesale, so
/// addresses that have left the endpoints are dropped.
pub fn authenticate(endpoints: &Endpoints) -> NetworkAuthentication {
    let networks = endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .filter_map(|addr| match addr.ip.parse::<IpAddr>() {
            Ok(ip) => Some(Network::host(ip)),
            Err(error) => {
                tracing::warn!(ip = %addr.ip, %error, "Ignoring invalid ingress address");
                None
            }
        })
        .collect();

    NetworkAuthentication {
        metadata: ObjectMeta {
            namespace: endpoints.namespace(),
            name: Some(INGRESS_NETWORK_AUTHN_NAME.to_string()),
            ..Default::default()
        },
        spec: NetworkAuthenticationSpec { networks },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{EndpointAddress, EndpointSubset};
    use pretty_assertions::assert_eq;

    fn endpoints(ips: &[&[&str]]) -> Endpoints {
        Endpoints {
            metadata: ObjectMeta {
                namespace: Some("traefik".to_string()),
                name: Some("traefik".to_string()),
                ..Default::default()
            },
            subsets: Some(
                ips.iter()
                    .map(|ips| EndpointSubset {
                        addresses: Some(
                            ips.iter()
                                .map(|ip| EndpointAddress {
                                    ip: ip.to_string(),
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }
    }

    fn cidrs(authn: &NetworkAuthentication) -> Vec<String> {
        authn
            .spec
            .networks
            .iter()
            .map(|n| n.cidr.to_string())
            .collect()
    }

    #[test]
    fn one_network_per_address() {
        let authn = authenticate(&endpoints(&[&["10.42.0.7", "10.42.1.9"]]));
        assert_eq!(authn.namespace().as_deref(), Some("traefik"));
        assert_eq!(authn.name_any(), "acorn-ingress-network-authentication");
        assert_eq!(cidrs(&authn), vec!["10.42.0.7/32", "10.42.1.9/32"]);
    }

    #[test]
    fn addresses_are_replaced() {
        let first = authenticate(&endpoints(&[&["10.42.0.7"], &["fd00::7"]]));
        assert_eq!(cidrs(&first), vec!["10.42.0.7/32", "fd00::7/128"]);

        let second = authenticate(&endpoints(&[&["10.42.3.3"]]));
        assert_eq!(cidrs(&second), vec!["10.42.3.3/32"]);
        assert_eq!(first.metadata, second.metadata);
    }

    #[test]
    fn invalid_addresses_are_skipped() {
        let authn = authenticate(&endpoints(&[&["not-an-ip", "10.42.0.7"]]));
        assert_eq!(cidrs(&authn), vec!["10.42.0.7/32"]);

        let authn = authenticate(&endpoints(&[]));
        assert!(authn.spec.networks.is_empty());
    }
}
