//! Resource inspection seam.
//!
//! The routing core never talks to a cluster. It asks a [`ResourceInspector`]
//! for the observed state of each resource a variant references and derives
//! availability, weight overrides and signatures from the answers.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use splitway_core::ResourceRef;

/// Annotation on a variant's first resource that overrides its weight.
pub const WEIGHT_ANNOTATION: &str = "splitway.dev/weight";

/// Observed state of one deployed resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStatus {
    /// Deletion has been requested.
    pub deleting: bool,
    /// Status conditions report the resource as ready.
    pub ready: bool,
    pub annotations: BTreeMap<String, String>,
    /// Deployed spec; hashed into the variant signature.
    pub spec: serde_json::Value,
}

impl ResourceStatus {
    /// A ready, undeleted resource with the given spec.
    pub fn ready(spec: serde_json::Value) -> Self {
        Self {
            ready: true,
            spec,
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.ready && !self.deleting
    }
}

/// Source of observed resource state.
pub trait ResourceInspector: Send + Sync {
    /// State of `resource` in `namespace`, or `None` if it does not exist.
    fn inspect(&self, namespace: &str, resource: &ResourceRef) -> Option<ResourceStatus>;
}

type ResourceId = (String, String, String);

fn resource_id(namespace: &str, resource: &ResourceRef) -> ResourceId {
    (
        namespace.to_string(),
        resource.kind.clone(),
        resource.name.clone(),
    )
}

/// Inspector fed by explicit updates, e.g. from a watch loop or a test.
#[derive(Default)]
pub struct StaticInspector {
    resources: RwLock<HashMap<ResourceId, ResourceStatus>>,
}

impl StaticInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, namespace: &str, resource: &ResourceRef, status: ResourceStatus) {
        self.resources
            .write()
            .insert(resource_id(namespace, resource), status);
    }

    pub fn remove(&self, namespace: &str, resource: &ResourceRef) -> Option<ResourceStatus> {
        self.resources.write().remove(&resource_id(namespace, resource))
    }
}

impl ResourceInspector for StaticInspector {
    fn inspect(&self, namespace: &str, resource: &ResourceRef) -> Option<ResourceStatus> {
        self.resources
            .read()
            .get(&resource_id(namespace, resource))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn static_inspector_set_and_remove() {
        let inspector = StaticInspector::new();
        let deploy = ResourceRef::new("deploy", "backend");
        assert!(inspector.inspect("shop", &deploy).is_none());

        inspector.set("shop", &deploy, ResourceStatus::ready(json!({"image": "v1"})));
        let status = inspector.inspect("shop", &deploy).unwrap();
        assert!(status.is_available());
        assert!(inspector.inspect("other", &deploy).is_none());

        assert!(inspector.remove("shop", &deploy).is_some());
        assert!(inspector.inspect("shop", &deploy).is_none());
    }

    #[test]
    fn deleting_resource_is_unavailable() {
        let mut status = ResourceStatus::ready(json!({}));
        status.deleting = true;
        assert!(!status.is_available());
        assert!(!ResourceStatus::default().is_available());
    }
}
