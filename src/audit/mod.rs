/*!
 * Audit Trail
 * Records authorization decisions and permission management for review
 */

use crate::core::limits::{MAX_AUDIT_EVENTS, MAX_AUDIT_EVENTS_PER_USER};
use crate::core::types::{PermissionId, ResourceId, TicketId, UserId};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

/// Audit event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AuditAction {
    Decision {
        granted: bool,
        request_submitted: bool,
        /// `(resource, scope)` pairs left unmet, empty when granted
        denied: Vec<(ResourceId, String)>,
    },
    PermissionCreated {
        resource_id: ResourceId,
        permission_id: PermissionId,
    },
    PermissionUpdated {
        resource_id: ResourceId,
        permission_id: PermissionId,
        version: u64,
    },
    PermissionDeleted {
        resource_id: ResourceId,
        permission_id: PermissionId,
    },
    /// Update left every dimension empty
    PermissionAutoDeleted {
        resource_id: ResourceId,
        permission_id: PermissionId,
    },
    TicketRaised {
        ticket_id: TicketId,
        resource_id: ResourceId,
        scope: String,
    },
    TicketGranted {
        ticket_id: TicketId,
    },
    TicketRevoked {
        ticket_id: TicketId,
    },
    TicketDeleted {
        ticket_id: TicketId,
    },
    /// Resource deletion purged its permissions and tickets
    ResourcePurged {
        resource_id: ResourceId,
        permissions: usize,
        tickets: usize,
    },
}

impl AuditAction {
    pub fn denied_decision(denied: Vec<(ResourceId, String)>, request_submitted: bool) -> Self {
        AuditAction::Decision {
            granted: false,
            request_submitted,
            denied,
        }
    }

    fn is_denial(&self) -> bool {
        matches!(self, AuditAction::Decision { granted: false, .. })
    }
}

/// Audit event
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditEvent {
    /// User the event is attributed to
    pub actor: UserId,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub logged_at: SystemTime,
}

impl AuditEvent {
    pub fn new(actor: UserId, action: AuditAction) -> Self {
        let severity = match &action {
            AuditAction::Decision { granted: false, .. } => AuditSeverity::Warning,
            AuditAction::PermissionDeleted { .. }
            | AuditAction::PermissionAutoDeleted { .. }
            | AuditAction::TicketRevoked { .. }
            | AuditAction::ResourcePurged { .. } => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        };

        Self {
            actor,
            action,
            severity,
            trace_id: None,
            logged_at: SystemTime::now(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Bounded in-memory audit log
pub struct AuditLogger {
    capacity: usize,
    /// Global event log (ring buffer)
    events: RwLock<VecDeque<AuditEvent>>,
    /// Per-user event logs
    user_events: Arc<DashMap<UserId, VecDeque<AuditEvent>, RandomState>>,
    /// Denied decisions per user
    denial_counts: Arc<DashMap<UserId, u64, RandomState>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_AUDIT_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity.min(MAX_AUDIT_EVENTS))),
            user_events: Arc::new(DashMap::with_hasher(RandomState::new())),
            denial_counts: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    pub fn log(&self, event: AuditEvent) {
        let actor = event.actor.clone();
        let is_denied = event.action.is_denial();

        {
            let mut events = self.events.write();
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        {
            let mut entry = self
                .user_events
                .entry(actor.clone())
                .or_insert_with(VecDeque::new);
            entry.push_back(event);
            if entry.len() > MAX_AUDIT_EVENTS_PER_USER {
                entry.pop_front();
            }
        }

        if is_denied {
            self.denial_counts
                .entry(actor)
                .and_modify(|count| *count += 1)
                .or_insert(1);
        }
    }

    /// Shorthand for `log(AuditEvent::new(..))`
    pub fn record(&self, actor: &UserId, action: AuditAction) {
        self.log(AuditEvent::new(actor.clone(), action));
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.read();
        events.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent events attributed to a user, newest first
    pub fn for_user(&self, user: &UserId, limit: usize) -> Vec<AuditEvent> {
        self.user_events
            .get(user)
            .map(|entry| entry.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn denial_count(&self, user: &UserId) -> u64 {
        self.denial_counts.get(user).map(|e| *e).unwrap_or(0)
    }

    /// Users with at least one denied decision
    pub fn users_with_denials(&self) -> BTreeSet<(UserId, u64)> {
        self.denial_counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn clear_user(&self, user: &UserId) {
        self.user_events.remove(user);
        self.denial_counts.remove(user);
    }

    pub fn clear_all(&self) {
        self.events.write().clear();
        self.user_events.clear();
        self.denial_counts.clear();
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            total_events: self.events.read().len(),
            total_denials: self.denial_counts.iter().map(|e| *e.value()).sum(),
            users_tracked: self.user_events.len(),
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_events: usize,
    pub total_denials: u64,
    pub users_tracked: usize,
}
