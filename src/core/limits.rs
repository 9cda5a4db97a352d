/*!
 * Engine Limits and Constants
 *
 * Centralized location for defaults, thresholds, and bounds.
 * Organized by component.
 */

use std::time::Duration;

// =============================================================================
// CONDITION EVALUATION
// =============================================================================

/// Default time budget for one condition evaluation (250ms)
/// Conditions run synchronously inside every decision
pub const DEFAULT_CONDITION_TIMEOUT: Duration = Duration::from_millis(250);

/// Upper bound accepted for the condition time budget (10s)
pub const MAX_CONDITION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum accepted condition expression length (4KB)
/// [SECURITY] Bounds parser work per evaluation
pub const MAX_CONDITION_LENGTH: usize = 4 * 1024;

/// Maximum nesting depth of a condition expression
/// [SECURITY] Prevents stack exhaustion in the recursive-descent parser
pub const MAX_CONDITION_DEPTH: usize = 32;

// =============================================================================
// PERMISSION QUERIES
// =============================================================================

/// Default page size when `max_result` is absent or negative
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Maximum permission name length
pub const MAX_PERMISSION_NAME_LENGTH: usize = 255;

// =============================================================================
// GRANT TOKENS
// =============================================================================

/// Default grant token lifetime (5 minutes)
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Longest grant token lifetime accepted from configuration (1 day)
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Signing key length in bytes (blake3 keyed hash)
pub const TOKEN_KEY_LEN: usize = 32;

// =============================================================================
// AUDIT
// =============================================================================

/// Maximum audit events kept in memory
pub const MAX_AUDIT_EVENTS: usize = 10_000;

/// Maximum audit events kept per requester
pub const MAX_AUDIT_EVENTS_PER_USER: usize = 1_000;
