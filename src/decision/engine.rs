/*!
 * Decision Engine
 * Grants or denies requested scopes from owner-authored permissions and tickets
 */

use super::context::AuthorizationRequest;
use super::policy::{EvaluationContext, PolicyEvaluator, Subject};
use super::token::{GrantToken, GrantedPermission, TokenSigner};
use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::core::errors::{UmaError, UmaResult};
use crate::core::types::{Requester, ResourceId};
use crate::monitoring::DecisionSpan;
use crate::policy::{ChildPolicy, PermissionRecord, PolicyStore};
use crate::registry::{Directory, Resource, ResourceRegistry};
use crate::ticket::TicketLedger;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A requested scope that no grant source satisfied
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnmetScope {
    pub resource_id: ResourceId,
    pub scope: String,
}

/// Negative decision outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Denial {
    pub unmet: Vec<UnmetScope>,
    /// A ticket awaits the owner's decision for at least one unmet scope
    pub request_submitted: bool,
    pub trace_id: String,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "access_denied")?;
        if self.request_submitted {
            write!(f, " (request_submitted)")?;
        }
        write!(f, ": ")?;
        for (i, unmet) in self.unmet.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}#{}", unmet.resource_id, unmet.scope)?;
        }
        Ok(())
    }
}

/// Outcome of an authorization request
///
/// A denial is a regular result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted(GrantToken),
    Denied(Denial),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }

    pub fn token(&self) -> Option<&GrantToken> {
        match self {
            Decision::Granted(token) => Some(token),
            Decision::Denied(_) => None,
        }
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Granted(_) => None,
            Decision::Denied(denial) => Some(denial),
        }
    }

    pub fn request_submitted(&self) -> bool {
        self.denial().is_some_and(|d| d.request_submitted)
    }
}

/// Resource under evaluation with the scopes requested on it
struct Target {
    resource: Resource,
    scopes: BTreeSet<String>,
}

/// Stateless between calls; every request is evaluated against current
/// store and ledger contents
#[derive(Clone)]
pub struct DecisionEngine {
    store: Arc<dyn PolicyStore>,
    resources: Arc<dyn ResourceRegistry>,
    directory: Arc<dyn Directory>,
    conditions: Arc<dyn ConditionEvaluator>,
    tickets: TicketLedger,
    signer: Arc<TokenSigner>,
    audit: Arc<AuditLogger>,
    config: Arc<EngineConfig>,
}

impl DecisionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        resources: Arc<dyn ResourceRegistry>,
        directory: Arc<dyn Directory>,
        conditions: Arc<dyn ConditionEvaluator>,
        tickets: TicketLedger,
        signer: Arc<TokenSigner>,
        audit: Arc<AuditLogger>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            resources,
            directory,
            conditions,
            tickets,
            signer,
            audit,
            config,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Decide every requested scope; succeed only if all are granted
    ///
    /// A scope is granted by owner implicit access, by any applicable
    /// permission with a matching child policy, or by a granted ticket.
    /// When the request presents a ticket or sets `submit_request`, each
    /// denied scope leaves a pending ticket and the denial is marked
    /// `request_submitted`.
    pub fn authorize(&self, requester: &Requester, request: &AuthorizationRequest) -> UmaResult<Decision> {
        let span = DecisionSpan::new(requester.user.as_str(), request.ticket.is_some());
        let _entered = span.enter();

        let targets = self.resolve_targets(requester, request)?;
        span.record_scopes(targets.values().map(|t| t.scopes.len()).sum());

        let mut subject: Option<Subject> = None;
        let mut granted = Vec::new();
        let mut unmet = Vec::new();

        for target in targets.values() {
            let resource = &target.resource;
            let is_owner = requester.user == resource.owner;

            if is_owner && self.config.owner_implicit_access {
                debug!(resource = %resource.id, "Owner has implicit access");
                granted.push(GrantedPermission {
                    resource_id: resource.id,
                    scopes: target.scopes.clone(),
                });
                continue;
            }

            let permissions = self.store.permissions_by_resource(&resource.id)?;
            let mut policies: BTreeMap<usize, Vec<ChildPolicy>> = BTreeMap::new();
            let mut scopes_granted = BTreeSet::new();

            for scope in &target.scopes {
                let by_permission = self.permission_grants(
                    requester,
                    &mut subject,
                    resource,
                    scope,
                    &permissions,
                    &mut policies,
                )?;
                let by_ticket = !by_permission && self.tickets.is_granted(&resource.id, scope, &requester.user);

                if by_permission || by_ticket {
                    debug!(resource = %resource.id, scope = %scope, by_ticket, "Scope granted");
                    scopes_granted.insert(scope.clone());
                } else {
                    debug!(resource = %resource.id, scope = %scope, "Scope denied");
                    unmet.push(UnmetScope {
                        resource_id: resource.id,
                        scope: scope.clone(),
                    });
                }
            }

            if !scopes_granted.is_empty() {
                granted.push(GrantedPermission {
                    resource_id: resource.id,
                    scopes: scopes_granted,
                });
            }
        }

        if unmet.is_empty() {
            span.record_outcome(true);
            let token = self
                .signer
                .sign(requester.user.clone(), requester.client.clone(), granted)?;
            info!(requester = %requester.user, token = %token.claims.jti, "Authorization granted");
            self.audit.log(
                AuditEvent::new(
                    requester.user.clone(),
                    AuditAction::Decision {
                        granted: true,
                        request_submitted: false,
                        denied: Vec::new(),
                    },
                )
                .with_trace_id(span.trace_id()),
            );
            return Ok(Decision::Granted(token));
        }

        let mut request_submitted = false;
        if request.raises_tickets() {
            for scope in &unmet {
                let owner = targets
                    .get(&scope.resource_id)
                    .is_some_and(|t| t.resource.owner == requester.user);
                if owner {
                    continue;
                }
                let ticket = self
                    .tickets
                    .create(Some(&requester.user), &scope.resource_id, &scope.scope)?;
                request_submitted |= !ticket.is_granted();
            }
        }

        span.record_outcome(false);
        let denial = Denial {
            unmet,
            request_submitted,
            trace_id: span.trace_id().to_string(),
        };
        info!(requester = %requester.user, request_submitted, "Authorization denied: {}", denial);
        self.audit.log(
            AuditEvent::new(
                requester.user.clone(),
                AuditAction::denied_decision(
                    denial
                        .unmet
                        .iter()
                        .map(|u| (u.resource_id, u.scope.clone()))
                        .collect(),
                    request_submitted,
                ),
            )
            .with_trace_id(span.trace_id()),
        );
        Ok(Decision::Denied(denial))
    }

    /// Authorize several independent requests for the same requester
    pub fn authorize_all(
        &self,
        requester: &Requester,
        requests: &[AuthorizationRequest],
    ) -> UmaResult<Vec<Decision>> {
        requests
            .iter()
            .map(|request| self.authorize(requester, request))
            .collect()
    }

    /// Merge explicit permissions and the presented ticket, per resource
    fn resolve_targets(
        &self,
        requester: &Requester,
        request: &AuthorizationRequest,
    ) -> UmaResult<BTreeMap<ResourceId, Target>> {
        let mut targets: BTreeMap<ResourceId, Target> = BTreeMap::new();

        if let Some(ticket_id) = &request.ticket {
            let presented = self.tickets.get(ticket_id)?;
            let resource = self.load_resource(&presented.resource_id)?;
            // The owner presenting a ticket for their own resource needs no ticket
            let scope = if requester.user == resource.owner {
                presented.scope
            } else {
                self.tickets.claim(ticket_id, &requester.user)?.scope
            };
            targets
                .entry(resource.id)
                .or_insert_with(|| Target {
                    resource,
                    scopes: BTreeSet::new(),
                })
                .scopes
                .insert(scope);
        }

        for permission in &request.permissions {
            let resource = self.load_resource(&permission.resource_id)?;
            let scopes = if permission.scopes.is_empty() {
                resource.scopes.clone()
            } else {
                if let Some(unknown) = permission.scopes.iter().find(|s| !resource.has_scope(s)) {
                    return Err(UmaError::InvalidRequest(format!(
                        "scope '{}' is not a scope of resource {}",
                        unknown, resource.id
                    )));
                }
                permission.scopes.clone()
            };

            targets
                .entry(resource.id)
                .or_insert_with(|| Target {
                    resource,
                    scopes: BTreeSet::new(),
                })
                .scopes
                .extend(scopes);
        }

        if targets.values().all(|t| t.scopes.is_empty()) {
            return Err(UmaError::InvalidRequest(
                "authorization request names no resource scopes".into(),
            ));
        }
        Ok(targets)
    }

    /// OR across every permission on the resource that covers `scope`
    fn permission_grants(
        &self,
        requester: &Requester,
        subject: &mut Option<Subject>,
        resource: &Resource,
        scope: &str,
        permissions: &[PermissionRecord],
        policies: &mut BTreeMap<usize, Vec<ChildPolicy>>,
    ) -> UmaResult<bool> {
        let evaluator = PolicyEvaluator::new(self.conditions.as_ref());

        for (idx, permission) in permissions.iter().enumerate() {
            if !permission.covers_scope(scope) {
                continue;
            }

            let children = match policies.entry(idx) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.store.policies_of(&permission.id)?),
            };
            let subject: &Subject = match subject {
                Some(resolved) => resolved,
                None => subject.insert(self.resolve_subject(requester)?),
            };

            let ctx = EvaluationContext {
                subject,
                resource,
                scope,
                group_matching: self.config.group_matching,
            };
            if evaluator
                .evaluate_permission(&permission.id, children.as_slice(), &ctx)
                .is_permit()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_subject(&self, requester: &Requester) -> UmaResult<Subject> {
        Ok(Subject {
            requester: requester.clone(),
            roles: self.directory.roles_of(&requester.user)?,
            groups: self.directory.groups_of(&requester.user)?,
        })
    }

    fn load_resource(&self, id: &ResourceId) -> UmaResult<Resource> {
        self.resources
            .resource(id)?
            .ok_or_else(|| UmaError::resource_not_found(id))
    }
}
