/*!
 * Policy Store
 * Persistence of permission aggregates and their child policies
 */

use super::types::{ChildPolicy, ChildPolicyKind, PermissionRecord};
use crate::core::errors::{StoreError, StoreResult};
use crate::core::types::{PermissionId, PolicyId, ResourceId};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Storage backend for permissions and child policies
///
/// Every write is visible to the next read on the same store.
pub trait PolicyStore: Send + Sync {
    /// Insert a new aggregate; the store assigns `seq`
    fn insert_permission(&self, record: PermissionRecord) -> StoreResult<PermissionRecord>;

    /// Overwrite the scalar fields of an existing aggregate
    ///
    /// The associated policy set is owned by the store and left untouched.
    fn put_permission(&self, record: PermissionRecord) -> StoreResult<()>;

    /// Remove an aggregate together with all of its child policies
    fn remove_permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>>;

    fn permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>>;

    /// Aggregates attached to a resource, in insertion order
    fn permissions_by_resource(&self, resource: &ResourceId) -> StoreResult<Vec<PermissionRecord>>;

    /// Insert a child policy and associate it with its parent aggregate
    fn insert_policy(&self, policy: ChildPolicy) -> StoreResult<()>;

    /// Replace the stored value of a child policy in place
    fn replace_policy(&self, id: &PolicyId, kind: ChildPolicyKind) -> StoreResult<()>;

    /// Remove a child policy and detach it from its parent
    fn remove_policy(&self, id: &PolicyId) -> StoreResult<()>;

    /// Child policies currently associated with an aggregate
    fn policies_of(&self, permission: &PermissionId) -> StoreResult<Vec<ChildPolicy>>;
}

/// In-memory policy store backed by DashMap
#[derive(Clone)]
pub struct InMemoryPolicyStore {
    permissions: Arc<DashMap<PermissionId, PermissionRecord, RandomState>>,
    policies: Arc<DashMap<PolicyId, ChildPolicy, RandomState>>,
    next_seq: Arc<AtomicU64>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self {
            permissions: Arc::new(DashMap::with_hasher(RandomState::new())),
            policies: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn insert_permission(&self, mut record: PermissionRecord) -> StoreResult<PermissionRecord> {
        if self.permissions.contains_key(&record.id) {
            return Err(StoreError::Duplicate(format!("permission {}", record.id)));
        }

        record.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        record.policies.clear();
        self.permissions.insert(record.id, record.clone());
        Ok(record)
    }

    fn put_permission(&self, record: PermissionRecord) -> StoreResult<()> {
        match self.permissions.get_mut(&record.id) {
            Some(mut entry) => {
                let stored = entry.value_mut();
                let policies = std::mem::take(&mut stored.policies);
                let seq = stored.seq;
                *stored = PermissionRecord {
                    policies,
                    seq,
                    ..record
                };
                Ok(())
            }
            None => Err(StoreError::Missing(format!("permission {}", record.id))),
        }
    }

    fn remove_permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>> {
        let Some((_, record)) = self.permissions.remove(id) else {
            return Ok(None);
        };

        for policy_id in &record.policies {
            self.policies.remove(policy_id);
        }
        Ok(Some(record))
    }

    fn permission(&self, id: &PermissionId) -> StoreResult<Option<PermissionRecord>> {
        Ok(self.permissions.get(id).map(|r| r.clone()))
    }

    fn permissions_by_resource(&self, resource: &ResourceId) -> StoreResult<Vec<PermissionRecord>> {
        let mut records: Vec<PermissionRecord> = self
            .permissions
            .iter()
            .filter(|entry| entry.resource_id == *resource)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    fn insert_policy(&self, policy: ChildPolicy) -> StoreResult<()> {
        if self.policies.contains_key(&policy.id) {
            return Err(StoreError::Duplicate(format!("policy {}", policy.id)));
        }

        match self.permissions.get_mut(&policy.parent) {
            Some(mut parent) => {
                parent.policies.insert(policy.id);
            }
            None => {
                return Err(StoreError::Missing(format!(
                    "parent permission {} of policy {}",
                    policy.parent, policy.id
                )))
            }
        }

        self.policies.insert(policy.id, policy);
        Ok(())
    }

    fn replace_policy(&self, id: &PolicyId, kind: ChildPolicyKind) -> StoreResult<()> {
        match self.policies.get_mut(id) {
            Some(mut entry) => {
                entry.kind = kind;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("policy {}", id))),
        }
    }

    fn remove_policy(&self, id: &PolicyId) -> StoreResult<()> {
        let Some((_, policy)) = self.policies.remove(id) else {
            return Err(StoreError::Missing(format!("policy {}", id)));
        };

        if let Some(mut parent) = self.permissions.get_mut(&policy.parent) {
            parent.policies.remove(id);
        }
        Ok(())
    }

    fn policies_of(&self, permission: &PermissionId) -> StoreResult<Vec<ChildPolicy>> {
        let ids = match self.permissions.get(permission) {
            Some(record) => record.policies.clone(),
            None => return Ok(Vec::new()),
        };

        let mut policies: Vec<ChildPolicy> = ids
            .iter()
            .filter_map(|id| self.policies.get(id).map(|p| p.clone()))
            .collect();
        policies.sort_by_key(|p| p.dimension());
        Ok(policies)
    }
}
