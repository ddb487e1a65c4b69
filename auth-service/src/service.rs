//! Credential service: pair issuance, validation, logout and refresh.
//!
//! A credential is valid from the moment it is issued and becomes unusable
//! either at natural expiry (checked lazily at decode time) or once its
//! `jti` is recorded in the revocation store. Both end states are terminal.

use crate::config::JwtSettings;
use crate::db::SubjectDirectory;
use crate::error::{AuthError, Result};
use crate::revocation::RevocationStore;
use crate::token::{Claims, TokenCodec, TokenKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// A freshly issued refresh/access credential pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub refresh_token: String,
    pub access_token: String,
}

pub struct CredentialService {
    codec: TokenCodec,
    revocation: Arc<dyn RevocationStore>,
    directory: Arc<dyn SubjectDirectory>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialService {
    pub fn new(
        settings: &JwtSettings,
        revocation: Arc<dyn RevocationStore>,
        directory: Arc<dyn SubjectDirectory>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(settings),
            revocation,
            directory,
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
        }
    }

    /// Issue a refresh/access pair for a subject.
    ///
    /// The two credentials share subject and role but carry independent
    /// `jti`s and lifetimes. If either encode fails, no pair is returned.
    pub async fn issue_pair(&self, subject: Uuid, role: &str) -> Result<TokenPair> {
        let refresh_claims = Claims::new(subject, role, TokenKind::Refresh, self.refresh_ttl);
        let access_claims = Claims::new(subject, role, TokenKind::Access, self.access_ttl);

        let refresh_token = self.codec.encode(&refresh_claims)?;
        let access_token = self.codec.encode(&access_claims)?;

        info!(subject = %subject, "credential pair issued");
        Ok(TokenPair {
            refresh_token,
            access_token,
        })
    }

    /// Validate a presented credential of the given kind and return its
    /// claims. Surfaces `CredentialExpired`, `CredentialInvalid`,
    /// `Malformed` or `CredentialRevoked`; never retries.
    pub async fn validate(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let claims = self.codec.decode(token, kind)?;

        let revoked = match kind {
            TokenKind::Access => self.revocation.is_blacklisted(&claims.jti).await?,
            TokenKind::Refresh => self.revocation.is_logged_out(&claims.jti).await?,
        };
        if revoked {
            return Err(AuthError::CredentialRevoked);
        }

        Ok(claims)
    }

    /// Revoke a credential pair: blacklist the access `jti` and mark the
    /// refresh `jti`'s session logged out, each for the remainder of its
    /// own lifetime.
    ///
    /// Both writes are attempted even if one fails; a revocation that was
    /// recorded is never undone. Already-revoked tokens are accepted, so
    /// repeating a logout is a no-op rather than an error.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        // Decode without the revocation check: signature and expiry
        // failures still propagate, a prior revocation does not.
        let access = self.codec.decode(access_token, TokenKind::Access)?;
        let refresh = self.codec.decode(refresh_token, TokenKind::Refresh)?;

        let access_marked = match access.remaining_lifetime() {
            Some(ttl) => self.revocation.mark_blacklisted(&access.jti, ttl).await,
            None => Ok(()),
        };
        if let Err(err) = &access_marked {
            error!(jti = %access.jti, error = %err, "failed to blacklist access credential");
        }

        let refresh_marked = match refresh.remaining_lifetime() {
            Some(ttl) => self.revocation.mark_logged_out(&refresh.jti, ttl).await,
            None => Ok(()),
        };
        if let Err(err) = &refresh_marked {
            error!(jti = %refresh.jti, error = %err, "failed to log out session");
        }

        access_marked.and(refresh_marked)?;
        info!(subject = %access.sub, "session logged out");
        Ok(())
    }

    /// Exchange a valid refresh credential for a new pair.
    ///
    /// The presented refresh credential stays usable afterwards; this core
    /// does not rotate-invalidate on refresh.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.validate(refresh_token, TokenKind::Refresh).await?;

        let subject = self
            .directory
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::SubjectNotFound)?;

        self.issue_pair(subject.id, &subject.role).await
    }
}
