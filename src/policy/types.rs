/*!
 * Policy Types
 * Child policies and the stored permission aggregate
 */

use crate::core::types::{ClientId, GroupPath, PermissionId, PolicyId, ResourceId, UserId};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

/// Constraint dimension a child policy covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Role,
    Group,
    Client,
    Condition,
}

impl Dimension {
    /// Every dimension, in resync order
    pub const ALL: [Dimension; 4] = [
        Dimension::Role,
        Dimension::Group,
        Dimension::Client,
        Dimension::Condition,
    ];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Role => "role",
            Dimension::Group => "group",
            Dimension::Client => "client",
            Dimension::Condition => "condition",
        };
        f.write_str(name)
    }
}

/// Value held by a child policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ChildPolicyKind {
    Role(BTreeSet<String>),
    Group(BTreeSet<GroupPath>),
    Client(BTreeSet<ClientId>),
    Condition(String),
}

impl ChildPolicyKind {
    pub fn dimension(&self) -> Dimension {
        match self {
            ChildPolicyKind::Role(_) => Dimension::Role,
            ChildPolicyKind::Group(_) => Dimension::Group,
            ChildPolicyKind::Client(_) => Dimension::Client,
            ChildPolicyKind::Condition(_) => Dimension::Condition,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChildPolicyKind::Role(set) => set.is_empty(),
            ChildPolicyKind::Group(set) => set.is_empty(),
            ChildPolicyKind::Client(set) => set.is_empty(),
            ChildPolicyKind::Condition(expr) => expr.trim().is_empty(),
        }
    }
}

/// Atomic policy backing one dimension of a permission
///
/// Created, replaced and removed only as a side effect of permission updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChildPolicy {
    pub id: PolicyId,
    /// Back-reference to the owning permission
    pub parent: PermissionId,
    pub kind: ChildPolicyKind,
}

impl ChildPolicy {
    pub fn new(parent: PermissionId, kind: ChildPolicyKind) -> Self {
        Self {
            id: PolicyId::new(),
            parent,
            kind,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.kind.dimension()
    }
}

/// Declared constraints of a permission, one slot per dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Dimensions {
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<GroupPath>,
    #[serde(default)]
    pub clients: BTreeSet<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Dimensions {
    /// Child policy value for a dimension, `None` when the dimension is empty
    pub fn kind(&self, dimension: Dimension) -> Option<ChildPolicyKind> {
        let kind = match dimension {
            Dimension::Role => ChildPolicyKind::Role(self.roles.clone()),
            Dimension::Group => ChildPolicyKind::Group(self.groups.clone()),
            Dimension::Client => ChildPolicyKind::Client(self.clients.clone()),
            Dimension::Condition => ChildPolicyKind::Condition(self.condition.clone()?),
        };
        (!kind.is_empty()).then_some(kind)
    }

    /// Child policy values for every non-empty dimension
    pub fn kinds(&self) -> Vec<ChildPolicyKind> {
        Dimension::ALL.iter().filter_map(|d| self.kind(*d)).collect()
    }

    pub fn non_empty_count(&self) -> usize {
        Dimension::ALL
            .iter()
            .filter(|d| self.kind(**d).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.non_empty_count() == 0
    }

    /// Rebuild the declared constraints from stored child policies
    pub fn from_policies(policies: &[ChildPolicy]) -> Self {
        let mut dims = Dimensions::default();
        for policy in policies {
            match &policy.kind {
                ChildPolicyKind::Role(set) => dims.roles.extend(set.iter().cloned()),
                ChildPolicyKind::Group(set) => dims.groups.extend(set.iter().cloned()),
                ChildPolicyKind::Client(set) => dims.clients.extend(set.iter().cloned()),
                ChildPolicyKind::Condition(expr) => dims.condition = Some(expr.clone()),
            }
        }
        dims
    }
}

/// Stored permission aggregate
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub resource_id: ResourceId,
    pub owner: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scopes: BTreeSet<String>,
    /// Associated child policies, maintained by the store
    #[serde(default)]
    pub policies: BTreeSet<PolicyId>,
    /// Bumped on every effective update
    pub version: u64,
    /// Insertion order, assigned by the store
    #[serde(default)]
    pub seq: u64,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub created_at: SystemTime,
}

impl PermissionRecord {
    pub fn new(
        resource_id: ResourceId,
        owner: UserId,
        name: String,
        description: Option<String>,
        scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            id: PermissionId::new(),
            resource_id,
            owner,
            name,
            description,
            scopes,
            policies: BTreeSet::new(),
            version: 1,
            seq: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn covers_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
