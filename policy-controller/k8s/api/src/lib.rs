#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod policy;

pub use self::labels::Labels;
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerState, ContainerStatus, EndpointAddress, EndpointSubset,
            Endpoints, EphemeralContainer, Namespace, Pod, PodSpec, PodStatus,
            PodTemplateSpec, Service, ServicePort, ServiceSpec,
        },
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
    NamespaceResourceScope,
};
pub use kube::{
    api::{
        Api, DeleteParams, ListParams, ObjectList, ObjectMeta, Patch, PatchParams, PostParams,
        ResourceExt,
    },
    Client, Error, Resource,
};
