use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors produced by the credential core.
///
/// Every variant maps to exactly one transport status category via
/// [`AuthError::to_status`]; storage-level details are logged, not echoed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is not decodable as a credential at all
    #[error("malformed credential")]
    Malformed,

    /// Signature mismatch: wrong secret, wrong kind, or tampering
    #[error("invalid credential signature")]
    CredentialInvalid,

    /// Natural expiry, detected at decode time
    #[error("credential expired")]
    CredentialExpired,

    /// Credential identifier is blacklisted or its session is logged out
    #[error("credential revoked")]
    CredentialRevoked,

    /// Signing failure while issuing a pair; internal fault
    #[error("credential issuance failed: {0}")]
    Issuance(String),

    /// Subject referenced by a refresh credential no longer exists
    #[error("subject not found")]
    SubjectNotFound,

    /// Revocation store (Redis) fault
    #[error("revocation store error: {0}")]
    Revocation(String),

    /// Subject directory (Postgres) fault
    #[error("database error: {0}")]
    Database(String),
}

impl AuthError {
    /// Convert to gRPC Status for the surrounding RPC layer
    pub fn to_status(&self) -> Status {
        match self {
            AuthError::Malformed
            | AuthError::CredentialInvalid
            | AuthError::CredentialExpired
            | AuthError::CredentialRevoked => Status::new(Code::Unauthenticated, self.to_string()),
            AuthError::SubjectNotFound => Status::new(Code::NotFound, self.to_string()),
            AuthError::Issuance(_) | AuthError::Revocation(_) | AuthError::Database(_) => {
                Status::new(Code::Internal, "internal server error")
            }
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::SubjectNotFound,
            other => AuthError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::Revocation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_map_to_unauthenticated() {
        for err in [
            AuthError::Malformed,
            AuthError::CredentialInvalid,
            AuthError::CredentialExpired,
            AuthError::CredentialRevoked,
        ] {
            assert_eq!(err.to_status().code(), Code::Unauthenticated);
        }
    }

    #[test]
    fn internal_faults_are_opaque() {
        let status = AuthError::Revocation("connection refused".into()).to_status();
        assert_eq!(status.code(), Code::Internal);
        assert!(!status.message().contains("connection refused"));
    }

    #[test]
    fn subject_not_found_maps_to_not_found() {
        assert_eq!(AuthError::SubjectNotFound.to_status().code(), Code::NotFound);
    }
}
