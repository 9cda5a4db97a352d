/*!
 * Ownership & Eligibility Guard
 * Predicates gating who may manage policies and tickets of a resource
 */

use crate::core::errors::{UmaError, UmaResult};
use crate::core::types::UserId;
use crate::registry::Resource;
use tracing::warn;

/// Only the owner of a resource may manage its policies
#[inline]
pub fn can_manage_policies(identity: &UserId, resource: &Resource) -> bool {
    *identity == resource.owner
}

/// Only owner-managed resources may carry user-managed permissions
#[inline]
pub fn eligible_for_policies(resource: &Resource) -> bool {
    resource.owner_managed_access
}

/// Require ownership; used for ticket management
pub fn require_owner(identity: &UserId, resource: &Resource) -> UmaResult<()> {
    if can_manage_policies(identity, resource) {
        return Ok(());
    }

    warn!(
        identity = %identity,
        resource = %resource.id,
        "non-owner attempted to manage resource"
    );
    Err(UmaError::Forbidden(format!(
        "Only resource owner can access policies for resource {}",
        resource.id
    )))
}

/// Require ownership and owner-managed access; used for permission management
pub fn require_policy_management(identity: &UserId, resource: &Resource) -> UmaResult<()> {
    require_owner(identity, resource)?;

    if !eligible_for_policies(resource) {
        warn!(resource = %resource.id, "policy management on resource without owner managed access");
        return Err(UmaError::Forbidden(format!(
            "Only resources with owner managed accessed can have policies (resource {})",
            resource.id
        )));
    }

    Ok(())
}
