/*!
 * Policy Module
 * Child policies, the permission aggregate record, resync diff and store
 */

mod diff;
mod store;
mod types;

pub use diff::{resync, PolicyChange};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use types::{ChildPolicy, ChildPolicyKind, Dimension, Dimensions, PermissionRecord};
