/*!
 * UMA Authorization Library
 * User-managed permissions, permission tickets and access decisions
 */

pub mod audit;
pub mod condition;
pub mod config;
pub mod core;
pub mod decision;
pub mod guard;
pub mod monitoring;
pub mod permission;
pub mod policy;
pub mod registry;
pub mod service;
pub mod ticket;

// Re-exports
pub use crate::core::errors::{DirectoryError, StoreError, UmaError, UmaResult};
pub use crate::core::types::{ClientId, GroupPath, PermissionId, PolicyId, Requester, ResourceId, TicketId, UserId};
pub use audit::{AuditAction, AuditEvent, AuditLogger, AuditSeverity, AuditStats};
pub use condition::{BoundedEvaluator, ConditionContext, ConditionError, ConditionEvaluator, ExpressionEvaluator};
pub use config::{EngineConfig, GroupMatching};
pub use decision::{AuthorizationRequest, Decision, DecisionEngine, Denial, GrantToken, ResourcePermission, TokenSigner};
pub use monitoring::init_tracing;
pub use permission::{PermissionManager, PermissionQuery, PermissionSpec, UmaPermission, UpdateOutcome};
pub use policy::{ChildPolicy, ChildPolicyKind, Dimension, InMemoryPolicyStore, PolicyStore};
pub use registry::{Directory, InMemoryDirectory, InMemoryResourceRegistry, Resource, ResourceRegistry};
pub use service::{PurgeSummary, UmaService, UmaServiceBuilder};
pub use ticket::{Ticket, TicketFilter, TicketLedger, TicketStatus, TicketUpdate};
