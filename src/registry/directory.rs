/*!
 * Directory Service
 * Role, group and client lookups consumed by the decision engine
 */

use crate::core::errors::{DirectoryError, DirectoryResult};
use crate::core::types::{ClientId, GroupPath, UserId};
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Directory lookups the engine depends on
pub trait Directory: Send + Sync {
    /// Realm roles directly granted to a user
    fn roles_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<String>>;

    /// Groups a user is a direct member of
    fn groups_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<GroupPath>>;

    fn role_exists(&self, role: &str) -> DirectoryResult<bool>;

    fn group_exists(&self, group: &GroupPath) -> DirectoryResult<bool>;

    fn client_exists(&self, client: &ClientId) -> DirectoryResult<bool>;
}

#[derive(Debug, Clone, Default)]
struct Membership {
    roles: BTreeSet<String>,
    groups: BTreeSet<GroupPath>,
}

/// In-memory directory for embedding and tests
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    users: Arc<DashMap<UserId, Membership>>,
    roles: Arc<DashSet<String>>,
    groups: Arc<DashSet<GroupPath>>,
    clients: Arc<DashSet<ClientId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&self, role: impl Into<String>) -> &Self {
        self.roles.insert(role.into());
        self
    }

    /// Register a group; missing ancestors are created too
    pub fn add_group(&self, group: GroupPath) -> &Self {
        let mut current = Some(group);
        while let Some(path) = current {
            current = path.parent();
            self.groups.insert(path);
        }
        self
    }

    pub fn add_client(&self, client: impl Into<String>) -> &Self {
        self.clients.insert(ClientId::new(client));
        self
    }

    pub fn add_user(&self, user: impl Into<String>) -> &Self {
        self.users.entry(UserId::new(user)).or_default();
        self
    }

    pub fn assign_role(&self, user: &UserId, role: &str) -> DirectoryResult<()> {
        if !self.roles.contains(role) {
            return Err(DirectoryError::LookupFailed(format!("role '{}' does not exist", role)));
        }
        self.member_mut(user, |m| {
            m.roles.insert(role.to_string());
        })
    }

    pub fn revoke_role(&self, user: &UserId, role: &str) -> DirectoryResult<()> {
        self.member_mut(user, |m| {
            m.roles.remove(role);
        })
    }

    pub fn join_group(&self, user: &UserId, group: &GroupPath) -> DirectoryResult<()> {
        if !self.groups.contains(group) {
            return Err(DirectoryError::LookupFailed(format!("group '{}' does not exist", group)));
        }
        self.member_mut(user, |m| {
            m.groups.insert(group.clone());
        })
    }

    pub fn leave_group(&self, user: &UserId, group: &GroupPath) -> DirectoryResult<()> {
        self.member_mut(user, |m| {
            m.groups.remove(group);
        })
    }

    fn member_mut<F>(&self, user: &UserId, f: F) -> DirectoryResult<()>
    where
        F: FnOnce(&mut Membership),
    {
        match self.users.get_mut(user) {
            Some(mut entry) => {
                f(entry.value_mut());
                Ok(())
            }
            None => Err(DirectoryError::LookupFailed(format!("user '{}' does not exist", user))),
        }
    }
}

impl Directory for InMemoryDirectory {
    fn roles_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<String>> {
        Ok(self
            .users
            .get(user)
            .map(|m| m.roles.clone())
            .unwrap_or_default())
    }

    fn groups_of(&self, user: &UserId) -> DirectoryResult<BTreeSet<GroupPath>> {
        Ok(self
            .users
            .get(user)
            .map(|m| m.groups.clone())
            .unwrap_or_default())
    }

    fn role_exists(&self, role: &str) -> DirectoryResult<bool> {
        Ok(self.roles.contains(role))
    }

    fn group_exists(&self, group: &GroupPath) -> DirectoryResult<bool> {
        Ok(self.groups.contains(group))
    }

    fn client_exists(&self, client: &ClientId) -> DirectoryResult<bool> {
        Ok(self.clients.contains(client))
    }
}
