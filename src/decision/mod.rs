/*!
 * Decision Module
 * Request-time evaluation of permissions and tickets
 */

mod context;
mod engine;
mod policy;
mod token;

pub use context::{AuthorizationRequest, ResourcePermission};
pub use engine::{Decision, DecisionEngine, Denial, UnmetScope};
pub use policy::{EvaluationContext, PolicyDecision, PolicyEvaluator, Subject};
pub use token::{GrantClaims, GrantToken, GrantedPermission, TokenSigner};
