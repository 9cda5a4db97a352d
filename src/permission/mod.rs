/*!
 * Permission Module
 * Owner-authored, user-managed permissions over protected resources
 */

mod manager;
mod types;

pub use manager::PermissionManager;
pub use types::{PermissionQuery, PermissionSpec, UmaPermission, UpdateOutcome};
