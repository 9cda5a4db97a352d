/*!
 * Condition Module
 * Pluggable evaluation of scripted permission conditions
 *
 * The decision engine never depends on a specific expression runtime: any
 * `ConditionEvaluator` can be injected. `ExpressionEvaluator` is the built-in
 * language, `BoundedEvaluator` enforces a time budget around any evaluator.
 */

mod bounded;
mod expr;

pub use bounded::BoundedEvaluator;
pub use expr::ExpressionEvaluator;

use crate::config::GroupMatching;
use crate::core::types::{GroupPath, Requester, ResourceId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Condition evaluation failures
///
/// Never surfaced to callers of a decision: the condition counts as false.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ConditionError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("evaluation exceeded {0:?}")]
    Timeout(Duration),

    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// Everything a condition may inspect about the request being decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionContext {
    pub requester: Requester,
    pub roles: BTreeSet<String>,
    pub groups: BTreeSet<GroupPath>,
    pub resource_id: ResourceId,
    pub resource_owner: UserId,
    /// Scope under evaluation
    pub scope: String,
    pub group_matching: GroupMatching,
}

impl ConditionContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Membership test honouring the configured group matching mode
    pub fn in_group(&self, group: &GroupPath) -> bool {
        group_matches(group, &self.groups, self.group_matching)
    }

    pub fn is_client(&self, client: &str) -> bool {
        self.requester
            .client
            .as_ref()
            .is_some_and(|c| c.as_str() == client)
    }

    pub fn is_owner(&self) -> bool {
        self.requester.user == self.resource_owner
    }
}

/// True if a member of `memberships` satisfies the permission group `group`
pub fn group_matches(
    group: &GroupPath,
    memberships: &BTreeSet<GroupPath>,
    mode: GroupMatching,
) -> bool {
    memberships.iter().any(|member| {
        member == group || (mode == GroupMatching::IncludeSubgroups && group.is_ancestor_of(member))
    })
}

/// Boolean condition runtime
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate an expression; must not have side effects
    fn evaluate(&self, expression: &str, context: &ConditionContext) -> Result<bool, ConditionError>;

    /// Static check run when a permission is created or updated
    fn validate(&self, expression: &str) -> Result<(), ConditionError> {
        let _ = expression;
        Ok(())
    }

    /// Whether evaluation cost is already bounded by the implementation
    ///
    /// Bounded evaluators run inline under `BoundedEvaluator`.
    fn is_bounded(&self) -> bool {
        false
    }
}
