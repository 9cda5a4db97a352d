/*!
 * Engine Configuration
 *
 * Defaults come from `core::limits`; every field can be overridden through
 * `UMA_*` environment variables.
 *
 * Environment variables:
 * - UMA_CONDITION_TIMEOUT_MS: condition evaluation budget (default: 250)
 * - UMA_GROUP_MATCHING: `exact` or `include_subgroups` (default: include_subgroups)
 * - UMA_OWNER_IMPLICIT_ACCESS: owner always granted on own resources (default: true)
 * - UMA_TOKEN_TTL_SECS: grant token lifetime (default: 300)
 * - UMA_TOKEN_KEY: 64 hex chars signing key (default: random per process)
 * - UMA_DEFAULT_MAX_RESULTS: page size for permission queries (default: 100)
 * - UMA_AUDIT_CAPACITY: audit ring size (default: 10000)
 */

use crate::core::errors::{UmaError, UmaResult};
use crate::core::limits::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::time::Duration;

/// How permission group paths match a requester's group memberships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMatching {
    /// Only the exact group path matches
    Exact,
    /// Members of any sub-group of a permission group also match
    IncludeSubgroups,
}

impl std::str::FromStr for GroupMatching {
    type Err = UmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(GroupMatching::Exact),
            "include_subgroups" | "subgroups" => Ok(GroupMatching::IncludeSubgroups),
            other => Err(UmaError::InvalidConfig(format!(
                "unknown group matching mode '{}'",
                other
            ))),
        }
    }
}

/// Engine configuration
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Time budget for a single condition evaluation
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub condition_timeout: Duration,
    pub group_matching: GroupMatching,
    /// Resource owner is granted every scope of their own resources
    pub owner_implicit_access: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub token_ttl: Duration,
    /// Hex-encoded 32 byte signing key
    #[serde(skip_serializing)]
    pub token_key: Option<String>,
    pub default_max_results: usize,
    pub audit_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            condition_timeout: DEFAULT_CONDITION_TIMEOUT,
            group_matching: GroupMatching::IncludeSubgroups,
            owner_implicit_access: true,
            token_ttl: DEFAULT_TOKEN_TTL,
            token_key: None,
            default_max_results: DEFAULT_MAX_RESULTS,
            audit_capacity: MAX_AUDIT_EVENTS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> UmaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> UmaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = lookup("UMA_CONDITION_TIMEOUT_MS") {
            config.condition_timeout = Duration::from_millis(parse_number("UMA_CONDITION_TIMEOUT_MS", &ms)?);
        }
        if let Some(mode) = lookup("UMA_GROUP_MATCHING") {
            config.group_matching = mode.parse()?;
        }
        if let Some(flag) = lookup("UMA_OWNER_IMPLICIT_ACCESS") {
            config.owner_implicit_access = parse_bool("UMA_OWNER_IMPLICIT_ACCESS", &flag)?;
        }
        if let Some(secs) = lookup("UMA_TOKEN_TTL_SECS") {
            config.token_ttl = Duration::from_secs(parse_number("UMA_TOKEN_TTL_SECS", &secs)?);
        }
        if let Some(key) = lookup("UMA_TOKEN_KEY") {
            config.token_key = Some(key.trim().to_string());
        }
        if let Some(max) = lookup("UMA_DEFAULT_MAX_RESULTS") {
            config.default_max_results = parse_number("UMA_DEFAULT_MAX_RESULTS", &max)? as usize;
        }
        if let Some(cap) = lookup("UMA_AUDIT_CAPACITY") {
            config.audit_capacity = parse_number("UMA_AUDIT_CAPACITY", &cap)? as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> UmaResult<()> {
        if self.condition_timeout.is_zero() || self.condition_timeout > MAX_CONDITION_TIMEOUT {
            return Err(UmaError::InvalidConfig(format!(
                "condition timeout must be within (0, {:?}], got {:?}",
                MAX_CONDITION_TIMEOUT, self.condition_timeout
            )));
        }
        if self.token_ttl.is_zero() || self.token_ttl > MAX_TOKEN_TTL {
            return Err(UmaError::InvalidConfig(format!(
                "token ttl must be within (0, {:?}], got {:?}",
                MAX_TOKEN_TTL, self.token_ttl
            )));
        }
        if self.default_max_results == 0 {
            return Err(UmaError::InvalidConfig(
                "default max results must be positive".into(),
            ));
        }
        if self.audit_capacity == 0 {
            return Err(UmaError::InvalidConfig("audit capacity must be positive".into()));
        }
        self.token_key_bytes()?;
        Ok(())
    }

    /// Decoded signing key, if one is configured
    pub fn token_key_bytes(&self) -> UmaResult<Option<[u8; TOKEN_KEY_LEN]>> {
        let Some(encoded) = &self.token_key else {
            return Ok(None);
        };

        let bytes = hex::decode(encoded)
            .map_err(|e| UmaError::InvalidConfig(format!("token key is not hex: {}", e)))?;
        let key: [u8; TOKEN_KEY_LEN] = bytes.try_into().map_err(|_| {
            UmaError::InvalidConfig(format!("token key must be {} bytes", TOKEN_KEY_LEN))
        })?;
        Ok(Some(key))
    }

    pub fn with_condition_timeout(mut self, timeout: Duration) -> Self {
        self.condition_timeout = timeout;
        self
    }

    pub fn with_group_matching(mut self, mode: GroupMatching) -> Self {
        self.group_matching = mode;
        self
    }

    pub fn with_owner_implicit_access(mut self, enabled: bool) -> Self {
        self.owner_implicit_access = enabled;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_token_key(mut self, key: [u8; TOKEN_KEY_LEN]) -> Self {
        self.token_key = Some(hex::encode(key));
        self
    }
}

fn parse_number(key: &str, raw: &str) -> UmaResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| UmaError::InvalidConfig(format!("{}='{}': {}", key, raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> UmaResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(UmaError::InvalidConfig(format!(
            "{}='{}' is not a boolean",
            key, raw
        ))),
    }
}
