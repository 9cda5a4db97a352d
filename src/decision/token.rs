/*!
 * Grant Token
 * Signed record of the scopes a requester was granted
 *
 * Signature: blake3 keyed hash over the bincode encoding of the claims,
 * carried as lowercase hex. Timestamps are whole seconds so a token
 * survives a JSON round trip with its signature intact.
 */

use crate::core::errors::{UmaError, UmaResult};
use crate::core::limits::TOKEN_KEY_LEN;
use crate::core::types::{ClientId, ResourceId, UserId};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Scopes granted on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GrantedPermission {
    pub resource_id: ResourceId,
    pub scopes: BTreeSet<String>,
}

/// Token claims
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GrantClaims {
    /// Token id
    pub jti: Uuid,
    /// Requesting user
    pub sub: UserId,
    /// Client the user acted through
    #[serde(default)]
    pub azp: Option<ClientId>,
    pub permissions: Vec<GrantedPermission>,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub issued_at: SystemTime,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub expires_at: SystemTime,
}

/// Positive outcome of an authorization request (RPT)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GrantToken {
    pub claims: GrantClaims,
    pub signature: String,
}

impl GrantToken {
    /// Whether the token covers `scope` on `resource_id`
    pub fn allows(&self, resource_id: &ResourceId, scope: &str) -> bool {
        self.claims
            .permissions
            .iter()
            .any(|p| p.resource_id == *resource_id && p.scopes.contains(scope))
    }

    pub fn scopes_for(&self, resource_id: &ResourceId) -> BTreeSet<String> {
        self.claims
            .permissions
            .iter()
            .filter(|p| p.resource_id == *resource_id)
            .flat_map(|p| p.scopes.iter().cloned())
            .collect()
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.claims.expires_at
    }

    pub fn encode(&self) -> UmaResult<String> {
        serde_json::to_string(self)
            .map_err(|e| UmaError::InvalidRequest(format!("failed to encode grant token: {}", e)))
    }

    pub fn decode(raw: &str) -> UmaResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| UmaError::InvalidRequest(format!("malformed grant token: {}", e)))
    }
}

/// Issues and verifies grant tokens
pub struct TokenSigner {
    key: [u8; TOKEN_KEY_LEN],
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(key: [u8; TOKEN_KEY_LEN], ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Signer with a key that lives only as long as the process
    pub fn random(ttl: Duration) -> Self {
        let mut key = [0u8; TOKEN_KEY_LEN];
        key[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        key[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self::new(key, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(
        &self,
        subject: UserId,
        client: Option<ClientId>,
        permissions: Vec<GrantedPermission>,
    ) -> UmaResult<GrantToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| UmaError::InvalidConfig(format!("system clock before epoch: {}", e)))?;
        let issued_at = UNIX_EPOCH + Duration::from_secs(now.as_secs());
        let expires_at = issued_at
            .checked_add(self.ttl)
            .ok_or_else(|| UmaError::InvalidConfig(format!("token ttl {:?} overflows the clock", self.ttl)))?;

        let claims = GrantClaims {
            jti: Uuid::new_v4(),
            sub: subject,
            azp: client,
            permissions,
            issued_at,
            expires_at,
        };
        let signature = self.mac(&claims)?.to_hex().to_string();
        Ok(GrantToken { claims, signature })
    }

    /// Check signature and expiry
    pub fn verify(&self, token: &GrantToken) -> UmaResult<()> {
        self.verify_at(token, SystemTime::now())
    }

    pub fn verify_at(&self, token: &GrantToken, now: SystemTime) -> UmaResult<()> {
        let presented: [u8; blake3::OUT_LEN] = hex::decode(&token.signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| UmaError::Forbidden("grant token signature is malformed".into()))?;

        // blake3::Hash equality is constant time
        if blake3::Hash::from(presented) != self.mac(&token.claims)? {
            return Err(UmaError::Forbidden("grant token signature mismatch".into()));
        }
        if token.is_expired_at(now) {
            return Err(UmaError::Forbidden(format!("grant token {} expired", token.claims.jti)));
        }
        Ok(())
    }

    fn mac(&self, claims: &GrantClaims) -> UmaResult<blake3::Hash> {
        let payload = bincode::serialize(claims)
            .map_err(|e| UmaError::InvalidRequest(format!("failed to encode grant claims: {}", e)))?;
        Ok(blake3::keyed_hash(&self.key, &payload))
    }
}
