//! Routemaps: registry of every application's routemap.
//!
//! The map lock is taken only to insert, remove, or clone out a handle.
//! Lookups and reconciles then work on the routemap's own lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use splitway_core::{ApplicationKey, ResourceRef, RoutemapSpec};
use tracing::{debug, info};

use crate::error::RoutingResult;
use crate::routemap::{Routemap, validate};

type ByName = HashMap<String, Arc<Routemap>>;

/// All known routemaps, keyed by namespace then name.
pub struct Routemaps {
    inner: RwLock<HashMap<String, ByName>>,
}

impl Routemaps {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a routemap, or apply the configuration to the existing one.
    pub fn upsert(&self, spec: RoutemapSpec, cluster_scoped: bool) -> RoutingResult<Arc<Routemap>> {
        validate(&spec, cluster_scoped)?;
        let key = spec.key();

        if let Some(existing) = self.get(&key) {
            existing.extend(spec, cluster_scoped)?;
            return Ok(existing);
        }

        let created = Arc::new(Routemap::new(spec.clone(), cluster_scoped)?);
        let mut inner = self.inner.write();
        let by_name = inner.entry(key.namespace.clone()).or_default();
        if let Some(existing) = by_name.get(&key.name).cloned() {
            // Lost a race with another upsert.
            drop(inner);
            existing.extend(spec, cluster_scoped)?;
            return Ok(existing);
        }
        by_name.insert(key.name.clone(), Arc::clone(&created));
        info!(application = %key, "routemap registered");
        Ok(created)
    }

    /// Remove a routemap. Empty namespaces are dropped with it.
    pub fn remove(&self, key: &ApplicationKey) -> Option<Arc<Routemap>> {
        let mut inner = self.inner.write();
        let by_name = inner.get_mut(&key.namespace)?;
        let removed = by_name.remove(&key.name);
        if by_name.is_empty() {
            inner.remove(&key.namespace);
        }
        if removed.is_some() {
            info!(application = %key, "routemap removed");
        }
        removed
    }

    pub fn get(&self, key: &ApplicationKey) -> Option<Arc<Routemap>> {
        self.inner
            .read()
            .get(&key.namespace)
            .and_then(|by_name| by_name.get(&key.name))
            .cloned()
    }

    /// Routemaps with a variant referencing `resource` in `namespace`.
    pub fn find_by_resource(&self, namespace: &str, resource: &ResourceRef) -> Vec<Arc<Routemap>> {
        let found: Vec<Arc<Routemap>> = self
            .list()
            .into_iter()
            .filter(|rm| rm.references(namespace, resource))
            .collect();
        debug!(namespace, %resource, count = found.len(), "routemaps referencing resource");
        found
    }

    /// Every routemap, sorted by application key.
    pub fn list(&self) -> Vec<Arc<Routemap>> {
        let mut all: Vec<Arc<Routemap>> = self
            .inner
            .read()
            .values()
            .flat_map(|by_name| by_name.values().cloned())
            .collect();
        all.sort_by(|a, b| a.key().cmp(b.key()));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Routemaps {
    fn default() -> Self {
        Self::new()
    }
}
