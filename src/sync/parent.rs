//! The parent object a sync pass works for.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use crate::error::ApplyError;
use crate::naming::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, PARENT_KIND_LABEL, PARENT_NAME_LABEL};
use crate::store::LabelSelector;

/// Identity of a parent, as far as its children are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// API version of the parent kind.
    pub api_version: String,
    /// Parent kind, e.g. `ScyllaCluster`.
    pub kind: String,
    /// Parent name.
    pub name: String,
    /// Parent namespace; `None` for cluster-scoped parents.
    pub namespace: Option<String>,
    /// Parent UID.
    pub uid: String,
    /// Parent generation.
    pub generation: i64,
}

impl ParentRef {
    /// Reads the identity of a typed parent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidObject` if the parent has no name or UID yet.
    pub fn from_resource<P: Resource<DynamicType = ()>>(parent: &P) -> Result<Self, ApplyError> {
        let meta = parent.meta();
        let invalid = |message: &str| ApplyError::InvalidObject {
            object: format!(
                "{}, Kind={} \"{}\"",
                P::api_version(&()),
                P::kind(&()),
                meta.name.as_deref().unwrap_or_default()
            ),
            message: message.to_string(),
        };

        Ok(Self {
            api_version: P::api_version(&()).into_owned(),
            kind: P::kind(&()).into_owned(),
            name: meta.name.clone().ok_or_else(|| invalid("name must be set"))?,
            namespace: meta.namespace.clone(),
            uid: meta.uid.clone().ok_or_else(|| invalid("uid must be set"))?,
            generation: meta.generation.unwrap_or_default(),
        })
    }

    /// Controller owner reference pointing at this parent.
    #[must_use]
    pub fn controller_ref(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Labels every child of this parent carries.
    #[must_use]
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (PARENT_NAME_LABEL.to_string(), self.name.clone()),
            (PARENT_KIND_LABEL.to_string(), self.kind.to_lowercase()),
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        ])
    }

    /// Selector matching the children of this parent.
    #[must_use]
    pub fn selector(&self) -> LabelSelector {
        LabelSelector::from_labels(self.selector_labels())
    }

    /// Returns `<namespace>/<name>` or `<name>`.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_parent_from_resource() {
        let parent = ConfigMap {
            metadata: ObjectMeta {
                name: Some(String::from("basic")),
                namespace: Some(String::from("scylla")),
                uid: Some(String::from("abcdefgh")),
                generation: Some(4),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };

        let parent = ParentRef::from_resource(&parent).unwrap();
        assert_eq!(parent.key(), "scylla/basic");
        assert_eq!(parent.generation, 4);

        let owner = parent.controller_ref();
        assert_eq!(owner.kind, "ConfigMap");
        assert_eq!(owner.controller, Some(true));

        let labels = parent.selector_labels();
        assert_eq!(labels.get(PARENT_KIND_LABEL).map(String::as_str), Some("configmap"));
        assert!(parent.selector().matches(Some(&labels)));
    }

    #[test]
    fn test_parent_without_uid_is_invalid() {
        let parent = ConfigMap {
            metadata: ObjectMeta {
                name: Some(String::from("basic")),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };

        let err = ParentRef::from_resource(&parent).unwrap_err();
        assert_eq!(
            err.to_string(),
            "v1, Kind=ConfigMap \"basic\" is invalid: uid must be set"
        );
    }
}
