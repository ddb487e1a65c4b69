//! Signed credential claims and codec.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

mod codec;

pub use codec::TokenCodec;

/// Credential kind. Access and refresh tokens are JWT-shaped but signed
/// with independent secrets, so the kinds are not interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by a signed credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Subject role at issuance
    pub role: String,
    /// Credential kind ("access" or "refresh")
    pub kind: TokenKind,
    /// Unique per-issuance identifier; the revocation key. Never reused.
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp); always `iat + TTL(kind)`
    pub exp: i64,
}

impl Claims {
    /// Build a fresh claim set issued now, expiring after `ttl`.
    pub fn new(sub: Uuid, role: &str, kind: TokenKind, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub,
            role: role.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        }
    }

    /// Remaining lifetime from now, or `None` once expired.
    ///
    /// Revocation records take this as their expiry so that they never
    /// outlive the credential they shadow.
    pub fn remaining_lifetime(&self) -> Option<Duration> {
        let remaining = self.exp - Utc::now().timestamp();
        if remaining > 0 {
            Some(Duration::from_secs(remaining as u64))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_claims_have_unique_jti() {
        let sub = Uuid::new_v4();
        let a = Claims::new(sub, "student", TokenKind::Access, Duration::from_secs(900));
        let b = Claims::new(sub, "student", TokenKind::Access, Duration::from_secs(900));
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn expiry_follows_ttl() {
        let claims = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Refresh,
            Duration::from_secs(3600),
        );
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn remaining_lifetime_none_after_expiry() {
        let mut claims = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Access,
            Duration::from_secs(900),
        );
        claims.exp = claims.iat - 1;
        assert!(claims.remaining_lifetime().is_none());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TokenKind::Access).unwrap(),
            "\"access\""
        );
        assert_eq!(
            serde_json::to_string(&TokenKind::Refresh).unwrap(),
            "\"refresh\""
        );
    }
}
