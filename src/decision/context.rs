/*!
 * Authorization Request
 * Ephemeral decision input; never persisted
 */

use crate::core::types::{ResourceId, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scopes requested on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourcePermission {
    pub resource_id: ResourceId,
    /// Empty means every scope of the resource
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl ResourcePermission {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            scopes: BTreeSet::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }
}

/// What a requester asks to be granted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AuthorizationRequest {
    pub permissions: Vec<ResourcePermission>,
    /// Ticket presented by the requester; resolves to its resource and scope
    pub ticket: Option<TicketId>,
    /// Raise tickets for denied scopes of explicit requests too
    pub submit_request: bool,
}

impl AuthorizationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request for a ticket previously raised on the requester's behalf
    pub fn for_ticket(ticket: TicketId) -> Self {
        Self {
            ticket: Some(ticket),
            ..Default::default()
        }
    }

    /// Every scope of a resource
    pub fn resource(mut self, resource_id: ResourceId) -> Self {
        self.permissions.push(ResourcePermission::new(resource_id));
        self
    }

    pub fn permission<I, S>(mut self, resource_id: ResourceId, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.push(ResourcePermission {
            resource_id,
            scopes: scopes.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_ticket(mut self, ticket: TicketId) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn submit_request(mut self, enabled: bool) -> Self {
        self.submit_request = enabled;
        self
    }

    /// Whether denied scopes are turned into pending tickets
    pub(crate) fn raises_tickets(&self) -> bool {
        self.ticket.is_some() || self.submit_request
    }
}
