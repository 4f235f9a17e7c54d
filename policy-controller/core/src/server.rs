use crate::{
    k8s::{
        labels,
        policy::{
            server::{Port, Selector},
            Server, ServerSpec,
        },
        ObjectMeta, ResourceExt, Service, ServicePort,
    },
    APP_NAMESPACE_LABEL, SERVICE_NAME_LABEL,
};
use std::{collections::BTreeMap, num::NonZeroU16};

/// Derives one `Server` per port of a selecting service.
///
/// Services without a selector don't front pods that could carry a proxy, so
/// they produce nothing.
pub fn synthesize(svc: &Service) -> Vec<Server> {
    let Some(spec) = svc.spec.as_ref() else {
        return vec![];
    };
    let selector = match spec.selector.as_ref() {
        Some(selector) if !selector.is_empty() => selector,
        _ => {
            tracing::debug!(
                namespace = %svc.namespace().unwrap_or_default(),
                name = %svc.name_any(),
                "Service has no selector",
            );
            return vec![];
        }
    };

    let svc_name = svc.name_any();
    let mut server_labels = BTreeMap::new();
    server_labels.insert(SERVICE_NAME_LABEL.to_string(), svc_name.clone());
    if let Some(project) = svc.labels().get(APP_NAMESPACE_LABEL) {
        server_labels.insert(APP_NAMESPACE_LABEL.to_string(), project.clone());
    }

    spec.ports
        .iter()
        .flatten()
        .filter_map(|port| {
            let Some(number) = port_number(port) else {
                tracing::debug!(service = %svc_name, port = port.port, "Skipping invalid port");
                return None;
            };
            let suffix = match port.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => number.to_string(),
            };
            Some(Server {
                metadata: ObjectMeta {
                    namespace: svc.namespace(),
                    name: Some(format!("{svc_name}-{suffix}")),
                    labels: Some(server_labels.clone()),
                    ..Default::default()
                },
                spec: ServerSpec {
                    selector: Selector::Pod(labels::Selector::from_map(selector.clone())),
                    port: Port::Number(number),
                },
            })
        })
        .collect()
}

fn port_number(port: &ServicePort) -> Option<NonZeroU16> {
    u16::try_from(port.port).ok().and_then(NonZeroU16::new)
}
