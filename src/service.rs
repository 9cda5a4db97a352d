/*!
 * UMA Service
 * Wires the engine components behind one handle for the web-service layer
 */

use crate::audit::{AuditAction, AuditLogger};
use crate::condition::{BoundedEvaluator, ConditionEvaluator, ExpressionEvaluator};
use crate::config::EngineConfig;
use crate::core::errors::UmaResult;
use crate::core::types::{ResourceId, UserId};
use crate::decision::{DecisionEngine, TokenSigner};
use crate::permission::PermissionManager;
use crate::policy::{InMemoryPolicyStore, PolicyStore};
use crate::registry::{Directory, InMemoryDirectory, InMemoryResourceRegistry, ResourceRegistry};
use crate::ticket::TicketLedger;
use std::sync::Arc;
use tracing::info;

/// Counts removed by `UmaService::resource_removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSummary {
    pub permissions: usize,
    pub tickets: usize,
}

/// Fully wired engine
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct UmaService {
    permissions: PermissionManager,
    tickets: TicketLedger,
    decisions: DecisionEngine,
    audit: Arc<AuditLogger>,
    config: Arc<EngineConfig>,
}

impl UmaService {
    pub fn builder() -> UmaServiceBuilder {
        UmaServiceBuilder::default()
    }

    /// Permission Aggregate Manager
    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    /// Ticket Ledger
    pub fn tickets(&self) -> &TicketLedger {
        &self.tickets
    }

    /// Decision Engine
    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cascade the deletion of a resource to its permissions and tickets
    ///
    /// Called by the resource registry after it removed the resource.
    pub fn resource_removed(&self, resource_id: &ResourceId, removed_by: &UserId) -> UmaResult<PurgeSummary> {
        let summary = PurgeSummary {
            permissions: self.permissions.purge_resource(resource_id)?,
            tickets: self.tickets.purge_resource(resource_id),
        };

        info!(
            resource = %resource_id,
            permissions = summary.permissions,
            tickets = summary.tickets,
            "Resource removed"
        );
        self.audit.record(
            removed_by,
            AuditAction::ResourcePurged {
                resource_id: *resource_id,
                permissions: summary.permissions,
                tickets: summary.tickets,
            },
        );
        Ok(summary)
    }
}

/// Builder for `UmaService`; unset collaborators default to in-memory ones
#[derive(Default)]
pub struct UmaServiceBuilder {
    config: Option<EngineConfig>,
    store: Option<Arc<dyn PolicyStore>>,
    resources: Option<Arc<dyn ResourceRegistry>>,
    directory: Option<Arc<dyn Directory>>,
    conditions: Option<Arc<dyn ConditionEvaluator>>,
}

impl UmaServiceBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Replace the built-in expression language
    ///
    /// The evaluator is always wrapped in a `BoundedEvaluator`.
    pub fn with_condition_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.conditions = Some(evaluator);
        self
    }

    pub fn build(self) -> UmaResult<UmaService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let signer = match config.token_key_bytes()? {
            Some(key) => TokenSigner::new(key, config.token_ttl),
            None => TokenSigner::random(config.token_ttl),
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPolicyStore::new()));
        let resources = self
            .resources
            .unwrap_or_else(|| Arc::new(InMemoryResourceRegistry::new()));
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(InMemoryDirectory::new()));
        let inner = self
            .conditions
            .unwrap_or_else(|| Arc::new(ExpressionEvaluator::new()));
        let conditions: Arc<dyn ConditionEvaluator> =
            Arc::new(BoundedEvaluator::new(inner, config.condition_timeout));

        let audit = Arc::new(AuditLogger::with_capacity(config.audit_capacity));
        let config = Arc::new(config);

        let tickets = TicketLedger::new(Arc::clone(&resources), Arc::clone(&audit));
        let permissions = PermissionManager::new(
            Arc::clone(&store),
            Arc::clone(&resources),
            Arc::clone(&directory),
            Arc::clone(&conditions),
            Arc::clone(&audit),
            Arc::clone(&config),
        );
        let decisions = DecisionEngine::new(
            store,
            resources,
            directory,
            conditions,
            tickets.clone(),
            Arc::new(signer),
            Arc::clone(&audit),
            Arc::clone(&config),
        );

        info!(
            group_matching = ?config.group_matching,
            owner_implicit_access = config.owner_implicit_access,
            condition_timeout_ms = config.condition_timeout.as_millis() as u64,
            "UMA service initialized"
        );

        Ok(UmaService {
            permissions,
            tickets,
            decisions,
            audit,
            config,
        })
    }
}
