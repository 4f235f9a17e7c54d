use super::targets_kind;

/// References a resource in the same namespace as the referring resource.
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct LocalTargetRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
}

/// References a resource, optionally in another namespace.
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct NamespacedTargetRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl LocalTargetRef {
    pub fn from_resource<T>(resource: &T) -> Self
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        Self {
            group: group(&T::group(&dt)),
            kind: T::kind(&dt).to_string(),
            name: resource.meta().name.clone().unwrap_or_default(),
        }
    }

    /// Checks whether the target references the given resource type
    pub fn targets_kind<T>(&self) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        targets_kind::<T>(self.group.as_deref(), &self.kind)
    }
}

impl NamespacedTargetRef {
    /// Builds a reference to a resource of type `T` by name, without needing
    /// the resource itself.
    pub fn to_kind<T>(name: impl Into<String>, namespace: impl Into<String>) -> Self
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        Self {
            group: group(&T::group(&dt)),
            kind: T::kind(&dt).to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Checks whether the target references the given resource type
    pub fn targets_kind<T>(&self) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        targets_kind::<T>(self.group.as_deref(), &self.kind)
    }
}

fn group(g: &str) -> Option<String> {
    if g.is_empty() {
        None
    } else {
        Some(g.to_string())
    }
}
