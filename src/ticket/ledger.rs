/*!
 * Ticket Ledger
 * Scope-level access requests and their owner decisions
 */

use super::types::{Ticket, TicketFilter, TicketKey, TicketStatus, TicketUpdate};
use crate::audit::{AuditAction, AuditLogger};
use crate::core::errors::{UmaError, UmaResult};
use crate::core::types::{ResourceId, TicketId, UserId};
use crate::guard;
use crate::registry::{Resource, ResourceRegistry};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Ledger of permission tickets
///
/// At most one ticket exists per (resource, scope, requester). Tickets live
/// independently of owner-authored permissions.
#[derive(Clone)]
pub struct TicketLedger {
    tickets: Arc<DashMap<TicketId, Ticket, RandomState>>,
    /// Uniqueness index; also serialises ticket creation and claiming
    index: Arc<Mutex<HashMap<TicketKey, TicketId, RandomState>>>,
    next_seq: Arc<AtomicU64>,
    resources: Arc<dyn ResourceRegistry>,
    audit: Arc<AuditLogger>,
}

impl TicketLedger {
    pub fn new(resources: Arc<dyn ResourceRegistry>, audit: Arc<AuditLogger>) -> Self {
        Self {
            tickets: Arc::new(DashMap::with_hasher(RandomState::new())),
            index: Arc::new(Mutex::new(HashMap::with_hasher(RandomState::new()))),
            next_seq: Arc::new(AtomicU64::new(1)),
            resources,
            audit,
        }
    }

    /// Raise a ticket for `scope` of a resource
    ///
    /// `requester` is absent when a resource server raises the ticket on behalf
    /// of a requester yet to present it. Re-raising returns the existing ticket.
    pub fn create(
        &self,
        requester: Option<&UserId>,
        resource_id: &ResourceId,
        scope: &str,
    ) -> UmaResult<Ticket> {
        let resource = self.load_resource(resource_id)?;
        if !resource.has_scope(scope) {
            return Err(UmaError::InvalidRequest(format!(
                "scope '{}' is not a scope of resource {}",
                scope, resource.id
            )));
        }
        if requester == Some(&resource.owner) {
            return Err(UmaError::Forbidden(format!(
                "Resource owner cannot request access to own resource {}",
                resource.id
            )));
        }

        Ok(self.raise(&resource, scope, requester.cloned()))
    }

    fn raise(&self, resource: &Resource, scope: &str, requester: Option<UserId>) -> Ticket {
        let key = TicketKey {
            resource_id: resource.id,
            scope: scope.to_string(),
            requester,
        };

        let mut index = self.index.lock();
        if let Some(existing) = index.get(&key).and_then(|id| self.tickets.get(id)) {
            debug!(ticket = %existing.id, "Ticket already raised");
            return existing.clone();
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let ticket = Ticket::new(
            resource.id,
            resource.owner.clone(),
            key.scope.clone(),
            key.requester.clone(),
            seq,
        );
        index.insert(key, ticket.id);
        self.tickets.insert(ticket.id, ticket.clone());
        drop(index);

        info!(
            ticket = %ticket.id,
            resource = %ticket.resource_id,
            scope = %ticket.scope,
            claimed = ticket.is_claimed(),
            "Raised permission ticket"
        );
        if let Some(requester) = &ticket.requester {
            self.audit.record(
                requester,
                AuditAction::TicketRaised {
                    ticket_id: ticket.id,
                    resource_id: ticket.resource_id,
                    scope: ticket.scope.clone(),
                },
            );
        }
        ticket
    }

    pub fn get(&self, id: &TicketId) -> UmaResult<Ticket> {
        self.tickets
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| UmaError::ticket_not_found(id))
    }

    /// Bind a presented ticket to the requester presenting it
    ///
    /// An unclaimed ticket is claimed by its first presenter. A ticket claimed
    /// by someone else resolves to the presenter's own ticket for the same
    /// resource and scope, raised if necessary.
    pub fn claim(&self, id: &TicketId, requester: &UserId) -> UmaResult<Ticket> {
        let presented = self.get(id)?;
        if *requester == presented.owner {
            return Err(UmaError::Forbidden(format!(
                "Resource owner cannot request access to own resource {}",
                presented.resource_id
            )));
        }

        match &presented.requester {
            Some(claimed_by) if claimed_by == requester => return Ok(presented),
            Some(_) => {
                let resource = self.load_resource(&presented.resource_id)?;
                return Ok(self.raise(&resource, &presented.scope, Some(requester.clone())));
            }
            None => {}
        }

        let own_key = TicketKey {
            resource_id: presented.resource_id,
            scope: presented.scope.clone(),
            requester: Some(requester.clone()),
        };

        let mut index = self.index.lock();
        if let Some(own) = index.get(&own_key).and_then(|id| self.tickets.get(id)) {
            return Ok(own.clone());
        }

        let claimed = {
            let mut entry = self
                .tickets
                .get_mut(id)
                .ok_or_else(|| UmaError::ticket_not_found(id))?;
            if entry.requester.is_some() {
                // Lost a race against another claim
                None
            } else {
                index.remove(&entry.value().key());
                entry.requester = Some(requester.clone());
                index.insert(own_key, entry.id);
                Some(entry.clone())
            }
        };
        drop(index);

        match claimed {
            Some(ticket) => {
                info!(ticket = %ticket.id, requester = %requester, "Claimed permission ticket");
                self.audit.record(
                    requester,
                    AuditAction::TicketRaised {
                        ticket_id: ticket.id,
                        resource_id: ticket.resource_id,
                        scope: ticket.scope.clone(),
                    },
                );
                Ok(ticket)
            }
            None => self.claim(id, requester),
        }
    }

    /// Tickets of a resource, oldest first; owner only
    pub fn find_by_resource(&self, caller: &UserId, resource_id: &ResourceId) -> UmaResult<Vec<Ticket>> {
        let resource = self.load_resource(resource_id)?;
        guard::require_owner(caller, &resource)?;
        Ok(self.collect(|t| t.resource_id == resource.id))
    }

    /// Tickets on resources owned by `caller` matching `filter`, oldest first
    pub fn find(&self, caller: &UserId, filter: &TicketFilter) -> UmaResult<Vec<Ticket>> {
        if let Some(resource_id) = &filter.resource_id {
            let resource = self.load_resource(resource_id)?;
            guard::require_owner(caller, &resource)?;
        }
        Ok(self.collect(|t| t.owner == *caller && filter.matches(t)))
    }

    /// Grant or revoke a ticket; owner only
    pub fn update(&self, caller: &UserId, id: &TicketId, update: TicketUpdate) -> UmaResult<Ticket> {
        let current = self.get(id)?;
        let resource = self.load_resource(&current.resource_id)?;
        guard::require_owner(caller, &resource)?;

        if !current.is_claimed() {
            return Err(UmaError::InvalidRequest(format!(
                "ticket {} has not been claimed by a requester yet",
                id
            )));
        }

        let updated = {
            let mut entry = self
                .tickets
                .get_mut(id)
                .ok_or_else(|| UmaError::ticket_not_found(id))?;
            if update.granted {
                entry.status = TicketStatus::Granted;
                entry.granted_at = Some(SystemTime::now());
            } else {
                entry.status = TicketStatus::Denied;
                entry.granted_at = None;
            }
            entry.clone()
        };

        info!(ticket = %id, granted = update.granted, "Updated permission ticket");
        let action = if update.granted {
            AuditAction::TicketGranted { ticket_id: *id }
        } else {
            AuditAction::TicketRevoked { ticket_id: *id }
        };
        self.audit.record(caller, action);
        Ok(updated)
    }

    /// Remove a ticket; owner only
    pub fn delete(&self, caller: &UserId, id: &TicketId) -> UmaResult<()> {
        let current = self.get(id)?;
        let resource = self.load_resource(&current.resource_id)?;
        guard::require_owner(caller, &resource)?;

        let mut index = self.index.lock();
        if let Some((_, removed)) = self.tickets.remove(id) {
            index.remove(&removed.key());
        }
        drop(index);

        info!(ticket = %id, "Deleted permission ticket");
        self.audit.record(caller, AuditAction::TicketDeleted { ticket_id: *id });
        Ok(())
    }

    /// Ticket held by `requester` for a resource scope, if any
    pub fn lookup(&self, resource_id: &ResourceId, scope: &str, requester: &UserId) -> Option<Ticket> {
        let key = TicketKey {
            resource_id: *resource_id,
            scope: scope.to_string(),
            requester: Some(requester.clone()),
        };
        let id = *self.index.lock().get(&key)?;
        self.tickets.get(&id).map(|t| t.clone())
    }

    /// True if the owner granted `requester` this scope via a ticket
    pub fn is_granted(&self, resource_id: &ResourceId, scope: &str, requester: &UserId) -> bool {
        self.lookup(resource_id, scope, requester)
            .is_some_and(|t| t.is_granted())
    }

    /// Drop every ticket of a resource; returns how many were removed
    pub fn purge_resource(&self, resource_id: &ResourceId) -> usize {
        let mut index = self.index.lock();
        let doomed: Vec<TicketId> = self
            .tickets
            .iter()
            .filter(|t| t.resource_id == *resource_id)
            .map(|t| t.id)
            .collect();

        for id in &doomed {
            if let Some((_, removed)) = self.tickets.remove(id) {
                index.remove(&removed.key());
            }
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    fn collect<F>(&self, predicate: F) -> Vec<Ticket>
    where
        F: Fn(&Ticket) -> bool,
    {
        let mut found: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|t| predicate(t.value()))
            .map(|t| t.value().clone())
            .collect();
        found.sort_by_key(|t| t.seq);
        found
    }

    fn load_resource(&self, id: &ResourceId) -> UmaResult<Resource> {
        self.resources
            .resource(id)?
            .ok_or_else(|| UmaError::resource_not_found(id))
    }
}
