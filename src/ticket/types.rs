/*!
 * Ticket Types
 */

use crate::core::types::{ResourceId, TicketId, UserId};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::time::SystemTime;

/// Owner decision on a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Raised, not yet decided by the owner
    Pending,
    Granted,
    /// Explicitly not granted; kept for inspection and re-granting
    Denied,
}

/// Scope-level access request against a resource
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ticket {
    pub id: TicketId,
    pub resource_id: ResourceId,
    /// Owner of the resource, the only identity allowed to decide
    pub owner: UserId,
    pub scope: String,
    /// Absent until the ticket is first presented by a requester
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<UserId>,
    pub status: TicketStatus,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub created_at: SystemTime,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<SystemTime>,
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Ticket {
    pub(crate) fn new(
        resource_id: ResourceId,
        owner: UserId,
        scope: String,
        requester: Option<UserId>,
        seq: u64,
    ) -> Self {
        Self {
            id: TicketId::new(),
            resource_id,
            owner,
            scope,
            requester,
            status: TicketStatus::Pending,
            created_at: SystemTime::now(),
            granted_at: None,
            seq,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.status == TicketStatus::Granted
    }

    pub fn is_claimed(&self) -> bool {
        self.requester.is_some()
    }

    pub(crate) fn key(&self) -> TicketKey {
        TicketKey {
            resource_id: self.resource_id,
            scope: self.scope.clone(),
            requester: self.requester.clone(),
        }
    }
}

/// Uniqueness key of a ticket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TicketKey {
    pub resource_id: ResourceId,
    pub scope: String,
    pub requester: Option<UserId>,
}

/// Owner decision applied through `TicketLedger::update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TicketUpdate {
    pub granted: bool,
}

impl TicketUpdate {
    pub fn grant() -> Self {
        Self { granted: true }
    }

    pub fn revoke() -> Self {
        Self { granted: false }
    }
}

/// Ticket search criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TicketFilter {
    pub resource_id: Option<ResourceId>,
    pub scope: Option<String>,
    pub requester: Option<UserId>,
    pub granted: Option<bool>,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(UserId::new(requester));
        self
    }

    pub fn granted(mut self, granted: bool) -> Self {
        self.granted = Some(granted);
        self
    }

    pub(crate) fn matches(&self, ticket: &Ticket) -> bool {
        self.resource_id.map_or(true, |r| r == ticket.resource_id)
            && self.scope.as_ref().map_or(true, |s| *s == ticket.scope)
            && self
                .requester
                .as_ref()
                .map_or(true, |u| ticket.requester.as_ref() == Some(u))
            && self.granted.map_or(true, |g| g == ticket.is_granted())
    }
}
