/*!
 * Child Policy Resync
 * Pure diff between the stored child policies and the declared dimensions
 */

use super::types::{ChildPolicy, ChildPolicyKind, Dimension, Dimensions};
use crate::core::types::PolicyId;

/// One store mutation needed to bring child policies in line with a permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyChange {
    /// Dimension became non-empty
    Create(ChildPolicyKind),
    /// Dimension value changed; the child policy keeps its id
    Replace { id: PolicyId, kind: ChildPolicyKind },
    /// Dimension was cleared, or a duplicate child policy exists for it
    Remove { id: PolicyId, dimension: Dimension },
}

/// Compute the changes turning `current` into exactly one child policy per
/// non-empty dimension of `desired`
///
/// Returns no changes when `current` already matches, so applying the same
/// dimensions twice is a no-op.
pub fn resync(current: &[ChildPolicy], desired: &Dimensions) -> Vec<PolicyChange> {
    let mut changes = Vec::new();

    for dimension in Dimension::ALL {
        let mut existing = current.iter().filter(|p| p.dimension() == dimension);
        let canonical = existing.next();

        for duplicate in existing {
            changes.push(PolicyChange::Remove {
                id: duplicate.id,
                dimension,
            });
        }

        match (canonical, desired.kind(dimension)) {
            (None, None) => {}
            (None, Some(kind)) => changes.push(PolicyChange::Create(kind)),
            (Some(policy), Some(kind)) if policy.kind != kind => {
                changes.push(PolicyChange::Replace { id: policy.id, kind })
            }
            (Some(_), Some(_)) => {}
            (Some(policy), None) => changes.push(PolicyChange::Remove {
                id: policy.id,
                dimension,
            }),
        }
    }

    changes
}
