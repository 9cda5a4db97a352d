/*!
 * Resource Registry
 * Ownership, owner-managed flag and canonical scopes of protected resources
 */

use crate::core::errors::StoreResult;
use crate::core::types::{ResourceId, UserId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Protected resource as registered by a resource server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub owner: UserId,
    #[serde(default)]
    pub owner_managed_access: bool,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            owner: UserId::new(owner),
            owner_managed_access: false,
            scopes: BTreeSet::new(),
        }
    }

    pub fn owner_managed(mut self, enabled: bool) -> Self {
        self.owner_managed_access = enabled;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Resource lookups the engine depends on
pub trait ResourceRegistry: Send + Sync {
    fn resource(&self, id: &ResourceId) -> StoreResult<Option<Resource>>;
}

/// In-memory resource registry for embedding and tests
#[derive(Clone, Default)]
pub struct InMemoryResourceRegistry {
    resources: Arc<DashMap<ResourceId, Resource>>,
}

impl InMemoryResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a resource
    pub fn register(&self, resource: Resource) -> ResourceId {
        let id = resource.id;
        self.resources.insert(id, resource);
        id
    }

    pub fn remove(&self, id: &ResourceId) -> Option<Resource> {
        self.resources.remove(id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceRegistry for InMemoryResourceRegistry {
    fn resource(&self, id: &ResourceId) -> StoreResult<Option<Resource>> {
        Ok(self.resources.get(id).map(|r| r.clone()))
    }
}
