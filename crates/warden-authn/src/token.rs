//! Access token issuance.
//!
//! After an authenticator resolves and validates an identity, the
//! orchestrator mints a short-lived platform access token for it. The
//! factory is a trait so deployments can plug in an HSM-backed signer;
//! the default implementation signs with a local Ed25519 key.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{AuthenticationError, Result};

/// Default access token lifetime in seconds (8 minutes).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 480;

/// Claims carried by an issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuing account
    pub iss: String,
    /// Authenticated identity
    pub sub: String,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Mints signed access tokens for authenticated identities.
pub trait TokenFactory: Send + Sync {
    /// Returns a signed token asserting `username` within `account`.
    fn signed_token(&self, account: &str, username: &str) -> Result<String>;
}

/// Ed25519-backed token factory.
pub struct EdDsaTokenFactory {
    encoding_key: EncodingKey,
    kid: String,
    ttl_secs: u64,
}

impl EdDsaTokenFactory {
    /// Creates a factory from a PKCS#8 DER-encoded Ed25519 private key.
    pub fn from_ed_der(der: &[u8], kid: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_ed_der(der),
            kid: kid.into(),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }

    /// Overrides the token lifetime.
    #[must_use]
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }
}

impl TokenFactory for EdDsaTokenFactory {
    fn signed_token(&self, account: &str, username: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            iss: account.to_string(),
            sub: username.to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
        };

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthenticationError::TokenIssuanceFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use ed25519_dalek::SigningKey;
    use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
    use rand_core::OsRng;

    use super::*;

    fn generate_test_keypair() -> (Vec<u8>, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());

        // PKCS#8 DER encoding for the Ed25519 private key
        let private_bytes = signing_key.to_bytes();
        let mut pkcs8_der = vec![
            0x30, 0x2e, // SEQUENCE, 46 bytes
            0x02, 0x01, 0x00, // INTEGER version 0
            0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, 0x04, 0x20, // OCTET STRING wrapping 32-byte key
        ];
        pkcs8_der.extend_from_slice(&private_bytes);

        (pkcs8_der, public_key_b64)
    }

    #[test]
    fn test_issued_token_round_trips() {
        let (der, public_b64) = generate_test_keypair();
        let factory = EdDsaTokenFactory::from_ed_der(&der, "warden-key-1");

        let token = factory.signed_token("acme", "host/myapp/workload-1").unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("warden-key-1"));

        let decoding_key = DecodingKey::from_ed_components(&public_b64).unwrap();
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&["acme"]);
        let data = decode::<AccessTokenClaims>(&token, &decoding_key, &validation).unwrap();

        assert_eq!(data.claims.sub, "host/myapp/workload-1");
        assert_eq!(data.claims.exp - data.claims.iat, DEFAULT_TOKEN_TTL_SECS as i64);
    }

    #[test]
    fn test_ttl_override() {
        let (der, _) = generate_test_keypair();
        let factory = EdDsaTokenFactory::from_ed_der(&der, "k").with_ttl_secs(60);

        let token = factory.signed_token("acme", "alice").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: AccessTokenClaims = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims.exp - claims.iat, 60);
    }
}
