/*!
 * Policy Evaluation
 * Matches a requester against the child policies of one permission
 */

use crate::condition::{group_matches, ConditionContext, ConditionEvaluator};
use crate::config::GroupMatching;
use crate::core::types::{GroupPath, PermissionId, Requester};
use crate::policy::{ChildPolicy, ChildPolicyKind};
use crate::registry::Resource;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Permit,
    Deny,
}

impl PolicyDecision {
    pub fn is_permit(self) -> bool {
        self == PolicyDecision::Permit
    }
}

impl From<bool> for PolicyDecision {
    fn from(permit: bool) -> Self {
        if permit {
            PolicyDecision::Permit
        } else {
            PolicyDecision::Deny
        }
    }
}

/// Requester with directory memberships resolved once per decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub requester: Requester,
    pub roles: BTreeSet<String>,
    pub groups: BTreeSet<GroupPath>,
}

/// Everything needed to evaluate one permission for one scope
pub struct EvaluationContext<'a> {
    pub subject: &'a Subject,
    pub resource: &'a Resource,
    pub scope: &'a str,
    pub group_matching: GroupMatching,
}

impl EvaluationContext<'_> {
    fn condition_context(&self) -> ConditionContext {
        ConditionContext {
            requester: self.subject.requester.clone(),
            roles: self.subject.roles.clone(),
            groups: self.subject.groups.clone(),
            resource_id: self.resource.id,
            resource_owner: self.resource.owner.clone(),
            scope: self.scope.to_string(),
            group_matching: self.group_matching,
        }
    }
}

/// Evaluates child policies; conditions go through the injected evaluator
pub struct PolicyEvaluator<'a> {
    conditions: &'a dyn ConditionEvaluator,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(conditions: &'a dyn ConditionEvaluator) -> Self {
        Self { conditions }
    }

    /// Evaluate a single child policy
    ///
    /// A failing condition is logged and counts as not matching.
    pub fn evaluate(&self, policy: &ChildPolicy, ctx: &EvaluationContext<'_>) -> PolicyDecision {
        let subject = ctx.subject;
        let matched = match &policy.kind {
            ChildPolicyKind::Role(roles) => roles.iter().any(|r| subject.roles.contains(r)),
            ChildPolicyKind::Group(groups) => groups
                .iter()
                .any(|g| group_matches(g, &subject.groups, ctx.group_matching)),
            ChildPolicyKind::Client(clients) => subject
                .requester
                .client
                .as_ref()
                .is_some_and(|c| clients.contains(c)),
            ChildPolicyKind::Condition(expression) => {
                match self.conditions.evaluate(expression, &ctx.condition_context()) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            policy = %policy.id,
                            permission = %policy.parent,
                            error = %e,
                            "Condition evaluation failed, treating as false"
                        );
                        false
                    }
                }
            }
        };
        PolicyDecision::from(matched)
    }

    /// A permission permits when any one of its child policies matches
    pub fn evaluate_permission(
        &self,
        permission: &PermissionId,
        policies: &[ChildPolicy],
        ctx: &EvaluationContext<'_>,
    ) -> PolicyDecision {
        let decision = PolicyDecision::from(
            policies
                .iter()
                .any(|policy| self.evaluate(policy, ctx).is_permit()),
        );
        debug!(
            permission = %permission,
            scope = ctx.scope,
            decision = ?decision,
            "Evaluated permission"
        );
        decision
    }
}
