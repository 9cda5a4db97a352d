/*!
 * Permission Aggregate Manager
 * Lifecycle of user-managed permissions and their child policy sets
 */

use super::types::{PermissionQuery, PermissionSpec, UmaPermission, UpdateOutcome};
use crate::audit::{AuditAction, AuditLogger};
use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::core::errors::{StoreError, UmaError, UmaResult};
use crate::core::limits::MAX_PERMISSION_NAME_LENGTH;
use crate::core::types::{ClientId, GroupPath, PermissionId, PolicyId, ResourceId, UserId};
use crate::guard;
use crate::policy::{resync, ChildPolicy, Dimensions, PermissionRecord, PolicyChange, PolicyStore};
use crate::registry::{Directory, Resource, ResourceRegistry};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validated form of a `PermissionSpec`
struct Validated {
    name: String,
    description: Option<String>,
    scopes: BTreeSet<String>,
    dims: Dimensions,
}

/// Inverse of an applied `PolicyChange`
enum Undo {
    Remove(PolicyId),
    Replace(ChildPolicy),
    Restore(ChildPolicy),
}

/// Owner-facing management of user-managed permissions
///
/// Every mutation writes through to the policy store before returning.
/// Updates of the same permission are serialised by a per-permission lock.
#[derive(Clone)]
pub struct PermissionManager {
    store: Arc<dyn PolicyStore>,
    resources: Arc<dyn ResourceRegistry>,
    directory: Arc<dyn Directory>,
    conditions: Arc<dyn ConditionEvaluator>,
    audit: Arc<AuditLogger>,
    config: Arc<EngineConfig>,
    locks: Arc<DashMap<PermissionId, Arc<Mutex<()>>, RandomState>>,
}

impl PermissionManager {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        resources: Arc<dyn ResourceRegistry>,
        directory: Arc<dyn Directory>,
        conditions: Arc<dyn ConditionEvaluator>,
        audit: Arc<AuditLogger>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            resources,
            directory,
            conditions,
            audit,
            config,
            locks: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Create a permission on a resource owned by `caller`
    pub fn create(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        spec: PermissionSpec,
    ) -> UmaResult<UmaPermission> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;

        let validated = self.validate(&resource, &spec)?;
        if validated.dims.is_empty() {
            return Err(UmaError::InvalidRequest(
                "permission must delegate at least one of roles, groups, clients or condition".into(),
            ));
        }

        let record = self.store.insert_permission(PermissionRecord::new(
            resource.id,
            resource.owner.clone(),
            validated.name,
            validated.description,
            validated.scopes,
        ))?;

        for kind in validated.dims.kinds() {
            if let Err(e) = self.store.insert_policy(ChildPolicy::new(record.id, kind)) {
                warn!(permission = %record.id, error = %e, "Rolling back partially created permission");
                self.store.remove_permission(&record.id)?;
                return Err(e.into());
            }
        }

        info!(
            resource = %resource.id,
            permission = %record.id,
            dimensions = validated.dims.non_empty_count(),
            "Created user-managed permission"
        );
        self.audit.record(
            caller,
            AuditAction::PermissionCreated {
                resource_id: resource.id,
                permission_id: record.id,
            },
        );

        self.view(record)
    }

    /// Apply a new declared state to an existing permission
    ///
    /// Each dimension is resynchronised against its child policy. A stale
    /// `expected_version` is a conflict unless the spec matches current state.
    /// When every dimension ends up empty the permission is deleted.
    pub fn update(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        permission_id: &PermissionId,
        spec: PermissionSpec,
    ) -> UmaResult<UpdateOutcome> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;

        // Unknown ids never get a lock entry
        self.load_permission(&resource, permission_id)?;
        let lock = self.lock_for(permission_id);
        let _held = lock.lock();

        let mut record = self.reload_locked(&resource, permission_id)?;
        let validated = self.validate(&resource, &spec)?;

        let current = self.store.policies_of(&record.id)?;
        let changes = resync(&current, &validated.dims);
        let scalar_changed = record.name != validated.name
            || record.description != validated.description
            || record.scopes != validated.scopes;

        if changes.is_empty() && !scalar_changed {
            debug!(permission = %record.id, "Update matches current state");
            return Ok(UpdateOutcome::Updated(UmaPermission::from_parts(record, &current)));
        }

        if let Some(expected) = spec.expected_version {
            if expected != record.version {
                return Err(UmaError::Conflict(format!(
                    "permission {} is at version {}, update was based on version {}",
                    record.id, record.version, expected
                )));
            }
        }

        // Additions first, so a failure part way never strands the permission
        // without child policies
        let mut ordered: Vec<&PolicyChange> = changes.iter().collect();
        ordered.sort_by_key(|change| matches!(change, PolicyChange::Remove { .. }));

        let mut undo = Vec::with_capacity(ordered.len());
        for change in ordered {
            match self.apply_change(&record.id, change, &current) {
                Ok(inverse) => undo.push(inverse),
                Err(e) => {
                    warn!(permission = %record.id, error = %e, "Rolling back partially applied update");
                    self.roll_back(&record.id, undo);
                    return Err(e);
                }
            }
        }

        // No permission may outlive its last dimension
        let remaining = match self.store.policies_of(&record.id) {
            Ok(remaining) => remaining,
            Err(e) => {
                self.roll_back(&record.id, undo);
                return Err(e.into());
            }
        };
        if remaining.is_empty() {
            if let Err(e) = self.store.remove_permission(&record.id) {
                self.roll_back(&record.id, undo);
                return Err(e.into());
            }
            self.locks.remove(&record.id);
            info!(
                resource = %resource.id,
                permission = %record.id,
                "Deleted user-managed permission with no remaining dimensions"
            );
            self.audit.record(
                caller,
                AuditAction::PermissionAutoDeleted {
                    resource_id: resource.id,
                    permission_id: record.id,
                },
            );
            return Ok(UpdateOutcome::Removed(record.id));
        }

        record.name = validated.name;
        record.description = validated.description;
        record.scopes = validated.scopes;
        record.version += 1;
        if let Err(e) = self.store.put_permission(record.clone()) {
            warn!(permission = %record.id, error = %e, "Rolling back update of child policies");
            self.roll_back(&record.id, undo);
            return Err(e.into());
        }

        info!(
            resource = %resource.id,
            permission = %record.id,
            version = record.version,
            changes = changes.len(),
            "Updated user-managed permission"
        );
        self.audit.record(
            caller,
            AuditAction::PermissionUpdated {
                resource_id: resource.id,
                permission_id: record.id,
                version: record.version,
            },
        );

        Ok(UpdateOutcome::Updated(UmaPermission::from_parts(record, &remaining)))
    }

    pub fn find_by_id(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        permission_id: &PermissionId,
    ) -> UmaResult<UmaPermission> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;
        let record = self.load_permission(&resource, permission_id)?;
        self.view(record)
    }

    /// Permissions of a resource, filtered, in creation order, then paginated
    pub fn find(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        query: &PermissionQuery,
    ) -> UmaResult<Vec<UmaPermission>> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;

        let limit = query.limit(self.config.default_max_results);
        self.store
            .permissions_by_resource(&resource.id)?
            .into_iter()
            .filter(|record| query.matches(record))
            .skip(query.offset())
            .take(limit)
            .map(|record| self.view(record))
            .collect()
    }

    pub fn delete(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        permission_id: &PermissionId,
    ) -> UmaResult<()> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;

        self.load_permission(&resource, permission_id)?;
        let lock = self.lock_for(permission_id);
        let _held = lock.lock();

        let record = self.reload_locked(&resource, permission_id)?;
        self.store.remove_permission(&record.id)?;
        self.locks.remove(&record.id);

        info!(resource = %resource.id, permission = %record.id, "Deleted user-managed permission");
        self.audit.record(
            caller,
            AuditAction::PermissionDeleted {
                resource_id: resource.id,
                permission_id: record.id,
            },
        );
        Ok(())
    }

    /// Child policies currently backing a permission
    pub fn associated_policies(
        &self,
        caller: &UserId,
        resource_id: &ResourceId,
        permission_id: &PermissionId,
    ) -> UmaResult<Vec<ChildPolicy>> {
        let resource = self.load_resource(resource_id)?;
        guard::require_policy_management(caller, &resource)?;
        let record = self.load_permission(&resource, permission_id)?;
        Ok(self.store.policies_of(&record.id)?)
    }

    /// Drop every permission of a resource; returns how many were removed
    pub fn purge_resource(&self, resource_id: &ResourceId) -> UmaResult<usize> {
        let records = self.store.permissions_by_resource(resource_id)?;
        for record in &records {
            self.store.remove_permission(&record.id)?;
            self.locks.remove(&record.id);
        }
        if !records.is_empty() {
            info!(resource = %resource_id, count = records.len(), "Purged permissions of removed resource");
        }
        Ok(records.len())
    }

    /// Apply one change; returns the change that undoes it
    fn apply_change(
        &self,
        permission: &PermissionId,
        change: &PolicyChange,
        current: &[ChildPolicy],
    ) -> UmaResult<Undo> {
        let previous = |id: &PolicyId| {
            current
                .iter()
                .find(|p| p.id == *id)
                .cloned()
                .ok_or_else(|| UmaError::Store(StoreError::Missing(format!("policy {}", id))))
        };

        match change {
            PolicyChange::Create(kind) => {
                let policy = ChildPolicy::new(*permission, kind.clone());
                let id = policy.id;
                self.store.insert_policy(policy)?;
                Ok(Undo::Remove(id))
            }
            PolicyChange::Replace { id, kind } => {
                let before = previous(id)?;
                self.store.replace_policy(id, kind.clone())?;
                Ok(Undo::Replace(before))
            }
            PolicyChange::Remove { id, .. } => {
                let before = previous(id)?;
                self.store.remove_policy(id)?;
                Ok(Undo::Restore(before))
            }
        }
    }

    /// Undo applied changes, newest first
    fn roll_back(&self, permission: &PermissionId, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let result = match step {
                Undo::Remove(id) => self.store.remove_policy(&id),
                Undo::Replace(policy) => self.store.replace_policy(&policy.id, policy.kind),
                Undo::Restore(policy) => self.store.insert_policy(policy),
            };
            if let Err(e) = result {
                warn!(permission = %permission, error = %e, "Failed to roll back child policy change");
            }
        }
    }

    /// Load under the permission lock; a vanished permission drops its lock entry
    fn reload_locked(&self, resource: &Resource, id: &PermissionId) -> UmaResult<PermissionRecord> {
        match self.load_permission(resource, id) {
            Ok(record) => Ok(record),
            Err(e) => {
                self.locks.remove(id);
                Err(e)
            }
        }
    }

    fn lock_for(&self, id: &PermissionId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn load_resource(&self, id: &ResourceId) -> UmaResult<Resource> {
        self.resources
            .resource(id)?
            .ok_or_else(|| UmaError::resource_not_found(id))
    }

    fn load_permission(&self, resource: &Resource, id: &PermissionId) -> UmaResult<PermissionRecord> {
        match self.store.permission(id)? {
            Some(record) if record.resource_id == resource.id => Ok(record),
            _ => Err(UmaError::permission_not_found(id)),
        }
    }

    fn view(&self, record: PermissionRecord) -> UmaResult<UmaPermission> {
        let policies = self.store.policies_of(&record.id)?;
        Ok(UmaPermission::from_parts(record, &policies))
    }

    fn validate(&self, resource: &Resource, spec: &PermissionSpec) -> UmaResult<Validated> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(UmaError::InvalidRequest("permission name is required".into()));
        }
        if name.len() > MAX_PERMISSION_NAME_LENGTH {
            return Err(UmaError::InvalidRequest(format!(
                "permission name exceeds {} bytes",
                MAX_PERMISSION_NAME_LENGTH
            )));
        }

        let scopes = if spec.scopes.is_empty() {
            resource.scopes.clone()
        } else {
            if let Some(unknown) = spec.scopes.iter().find(|s| !resource.has_scope(s)) {
                return Err(UmaError::InvalidRequest(format!(
                    "scope '{}' is not a scope of resource {}",
                    unknown, resource.id
                )));
            }
            spec.scopes.clone()
        };

        for role in &spec.roles {
            if !self.directory.role_exists(role)? {
                return Err(UmaError::InvalidRequest(format!("role '{}' does not exist", role)));
            }
        }

        let mut groups = BTreeSet::new();
        for raw in &spec.groups {
            let group = GroupPath::parse(raw)?;
            if !self.directory.group_exists(&group)? {
                return Err(UmaError::InvalidRequest(format!("group '{}' does not exist", group)));
            }
            groups.insert(group);
        }

        let mut clients = BTreeSet::new();
        for raw in &spec.clients {
            let client = ClientId::new(raw.as_str());
            if !self.directory.client_exists(&client)? {
                return Err(UmaError::InvalidRequest(format!("client '{}' does not exist", client)));
            }
            clients.insert(client);
        }

        let condition = spec
            .condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if let Some(expression) = &condition {
            self.conditions
                .validate(expression)
                .map_err(|e| UmaError::InvalidRequest(format!("invalid condition: {}", e)))?;
        }

        Ok(Validated {
            name: name.to_string(),
            description: spec.description.clone(),
            scopes,
            dims: Dimensions {
                roles: spec.roles.clone(),
                groups,
                clients,
                condition,
            },
        })
    }
}
