//! Pure encode/decode of signed credentials. No I/O.

use super::{Claims, TokenKind};
use crate::config::JwtSettings;
use crate::error::{AuthError, Result};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Clock skew tolerance applied at decode time.
const DECODE_LEEWAY_SECS: u64 = 30;

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KindKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HMAC-SHA256 credential codec with one secret per credential kind.
///
/// A token produced for one kind fails signature verification when decoded
/// as the other kind; that mismatch is what keeps access and refresh
/// credentials non-interchangeable.
pub struct TokenCodec {
    access: KindKeys,
    refresh: KindKeys,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            access: KindKeys::from_secret(&settings.access_secret),
            refresh: KindKeys::from_secret(&settings.refresh_secret),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign a claim set with the secret matching its kind.
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.kind).encoding,
        )
        .map_err(|e| AuthError::Issuance(e.to_string()))
    }

    /// Verify and decode a token presented as `kind`.
    ///
    /// Expiry is checked here, lazily; nothing scans for expired tokens
    /// proactively.
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = DECODE_LEEWAY_SECS;

        let data = jsonwebtoken::decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::CredentialExpired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::CredentialInvalid
                }
                _ => AuthError::Malformed,
            })?;

        // Signature already pins the kind; the claim must agree with it.
        if data.claims.kind != kind {
            return Err(AuthError::CredentialInvalid);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_codec() -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(2_592_000),
        })
    }

    #[test]
    fn encode_decode_roundtrip() {
        let codec = test_codec();
        let claims = Claims::new(
            Uuid::new_v4(),
            "teacher",
            TokenKind::Access,
            Duration::from_secs(900),
        );

        let token = codec.encode(&claims).unwrap();
        let decoded = codec.decode(&token, TokenKind::Access).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_kind_is_invalid_not_expired() {
        let codec = test_codec();
        let access = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Access,
            Duration::from_secs(900),
        );
        let token = codec.encode(&access).unwrap();

        match codec.decode(&token, TokenKind::Refresh) {
            Err(AuthError::CredentialInvalid) => {}
            other => panic!("expected CredentialInvalid, got {other:?}"),
        }
    }

    #[test]
    fn expired_token_is_expired() {
        let codec = test_codec();
        let mut claims = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Access,
            Duration::from_secs(900),
        );
        // 16 minutes past issuance of a 15 minute token, beyond leeway
        claims.iat -= 16 * 60;
        claims.exp -= 16 * 60;

        let token = codec.encode(&claims).unwrap();
        match codec.decode(&token, TokenKind::Access) {
            Err(AuthError::CredentialExpired) => {}
            other => panic!("expected CredentialExpired, got {other:?}"),
        }
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let codec = test_codec();
        let claims = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Access,
            Duration::from_secs(900),
        );
        let token = codec.encode(&claims).unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let flipped = if parts[2].starts_with('A') { "B" } else { "A" };
        let sig = format!("{}{}", flipped, &parts[2][1..]);
        parts[2] = &sig;
        let tampered = parts.join(".");

        match codec.decode(&tampered, TokenKind::Access) {
            Err(AuthError::CredentialInvalid) => {}
            other => panic!("expected CredentialInvalid, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = test_codec();
        match codec.decode("not-a-token", TokenKind::Access) {
            Err(AuthError::Malformed) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn wire_format_has_three_sections_and_expected_claims() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let codec = test_codec();
        let claims = Claims::new(
            Uuid::new_v4(),
            "student",
            TokenKind::Access,
            Duration::from_secs(900),
        );
        let token = codec.encode(&claims).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        for field in ["sub", "role", "jti", "iat", "exp"] {
            assert!(body.get(field).is_some(), "missing claim {field}");
        }
        assert_eq!(body["kind"], "access");
        assert_eq!(body["jti"], claims.jti.as_str());
    }
}
