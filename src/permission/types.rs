/*!
 * Permission Types
 * Caller-facing view of a user-managed permission, its input spec and queries
 */

use crate::core::types::{ClientId, GroupPath, PermissionId, ResourceId, UserId};
use crate::policy::{ChildPolicy, Dimensions, PermissionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User-managed permission as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UmaPermission {
    pub id: PermissionId,
    pub resource_id: ResourceId,
    pub owner: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<GroupPath>,
    #[serde(default)]
    pub clients: BTreeSet<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub version: u64,
}

impl UmaPermission {
    pub(crate) fn from_parts(record: PermissionRecord, policies: &[ChildPolicy]) -> Self {
        let dims = Dimensions::from_policies(policies);
        Self {
            id: record.id,
            resource_id: record.resource_id,
            owner: record.owner,
            name: record.name,
            description: record.description,
            scopes: record.scopes,
            roles: dims.roles,
            groups: dims.groups,
            clients: dims.clients,
            condition: dims.condition,
            version: record.version,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            roles: self.roles.clone(),
            groups: self.groups.clone(),
            clients: self.clients.clone(),
            condition: self.condition.clone(),
        }
    }

    /// Editable spec carrying the current state and version
    ///
    /// The usual read-modify-write: fetch, adjust the spec, pass it to update.
    pub fn to_spec(&self) -> PermissionSpec {
        PermissionSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            scopes: self.scopes.clone(),
            roles: self.roles.clone(),
            groups: self.groups.iter().map(|g| g.as_str().to_string()).collect(),
            clients: self.clients.iter().map(|c| c.as_str().to_string()).collect(),
            condition: self.condition.clone(),
            expected_version: Some(self.version),
        }
    }
}

/// Declared state of a permission, as submitted on create and update
///
/// References are raw strings and are validated against the resource and the
/// directory before anything is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PermissionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Empty means every scope of the resource
    pub scopes: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    pub clients: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Optimistic concurrency stamp checked on update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl PermissionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.clients.insert(client.into());
        self
    }

    pub fn condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = Some(expression.into());
        self
    }

    pub fn expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn add_role(&mut self, role: &str) -> &mut Self {
        self.roles.insert(role.to_string());
        self
    }

    pub fn remove_role(&mut self, role: &str) -> &mut Self {
        self.roles.remove(role);
        self
    }

    pub fn add_group(&mut self, group: &str) -> &mut Self {
        self.groups.insert(group.to_string());
        self
    }

    pub fn remove_group(&mut self, group: &str) -> &mut Self {
        self.groups.remove(group);
        self
    }

    pub fn add_client(&mut self, client: &str) -> &mut Self {
        self.clients.insert(client.to_string());
        self
    }

    pub fn remove_client(&mut self, client: &str) -> &mut Self {
        self.clients.remove(client);
        self
    }

    pub fn set_condition(&mut self, expression: &str) -> &mut Self {
        self.condition = Some(expression.to_string());
        self
    }

    pub fn clear_condition(&mut self) -> &mut Self {
        self.condition = None;
        self
    }

    /// Clear all four delegation dimensions
    pub fn clear_dimensions(&mut self) -> &mut Self {
        self.roles.clear();
        self.groups.clear();
        self.clients.clear();
        self.condition = None;
        self
    }
}

/// Filters and pagination for permission lookups on one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PermissionQuery {
    /// Case-insensitive substring of the permission name
    pub name: Option<String>,
    /// Permissions whose scope set contains this scope
    pub scope: Option<String>,
    /// Negative values start at 0
    pub first_result: Option<i64>,
    /// Absent or negative values use the configured default page size
    pub max_result: Option<i64>,
}

impl PermissionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn page(mut self, first_result: i64, max_result: i64) -> Self {
        self.first_result = Some(first_result);
        self.max_result = Some(max_result);
        self
    }

    pub(crate) fn offset(&self) -> usize {
        self.first_result
            .filter(|first| *first > 0)
            .map(|first| first as usize)
            .unwrap_or(0)
    }

    pub(crate) fn limit(&self, default: usize) -> usize {
        self.max_result
            .filter(|max| *max >= 0)
            .map(|max| max as usize)
            .unwrap_or(default)
    }

    pub(crate) fn matches(&self, record: &PermissionRecord) -> bool {
        let name_ok = self.name.as_ref().map_or(true, |needle| {
            record.name.to_lowercase().contains(&needle.to_lowercase())
        });
        let scope_ok = self
            .scope
            .as_ref()
            .map_or(true, |scope| record.covers_scope(scope));
        name_ok && scope_ok
    }
}

/// Result of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(UmaPermission),
    /// Every dimension was cleared, so the permission was deleted
    Removed(PermissionId),
}

impl UpdateOutcome {
    pub fn permission(&self) -> Option<&UmaPermission> {
        match self {
            UpdateOutcome::Updated(permission) => Some(permission),
            UpdateOutcome::Removed(_) => None,
        }
    }

    pub fn into_permission(self) -> Option<UmaPermission> {
        match self {
            UpdateOutcome::Updated(permission) => Some(permission),
            UpdateOutcome::Removed(_) => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, UpdateOutcome::Removed(_))
    }
}
