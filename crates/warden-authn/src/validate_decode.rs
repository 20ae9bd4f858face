//! Token validation and decoding.
//!
//! Validation runs in two passes. The first pass checks only the
//! signature against the cached key set; if it fails, the key set is
//! force-refetched once and the signature retried, so a provider key
//! rotation is picked up immediately instead of after the cache TTL.
//! The second pass enforces the registered claims: `exp` always, `iss`
//! against the resolved issuer, `aud` when an audience is configured,
//! and `nbf`/`iat` when present in the token.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use serde_json::Value;
use warden_config::TokenConfig;

use crate::{
    error::{AuthenticationError, Result},
    signing_key::CachedSigningKeys,
};

/// Decoded token payload as a raw claim map.
pub type DecodedToken = serde_json::Map<String, Value>;

/// Signing algorithms accepted for incoming tokens.
///
/// Symmetric algorithms and `none` are rejected outright: the engine only
/// ever holds public keys, so a token claiming a shared-secret algorithm
/// is an attack, not a configuration choice.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::EdDSA,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Registered claims the second validation pass enforces.
#[derive(Debug, Clone, Default, bon::Builder)]
#[builder(on(String, into))]
pub struct ExpectedClaims {
    /// Expected `iss` value, from [`resolve_issuer`]
    pub issuer: Option<String>,
    /// Expected `aud` value, when the authenticator configures one
    pub audience: Option<String>,
}

/// Resolves the issuer to enforce from the authenticator's variables.
///
/// Precedence: an explicit `issuer` variable wins; otherwise exactly one
/// of `provider-uri` (used verbatim) or `jwks-uri` (reduced to its
/// hostname) must be configured. Both or neither is a misconfiguration.
pub fn resolve_issuer(
    issuer: Option<&str>,
    provider_uri: Option<&str>,
    jwks_uri: Option<&str>,
) -> Result<String> {
    if let Some(issuer) = issuer {
        return Ok(issuer.to_string());
    }
    match (provider_uri, jwks_uri) {
        (Some(uri), None) => Ok(uri.to_string()),
        (None, Some(uri)) => hostname_from_uri(uri),
        _ => Err(AuthenticationError::InvalidIssuerConfiguration),
    }
}

fn hostname_from_uri(uri: &str) -> Result<String> {
    let parsed = url::Url::parse(uri).map_err(|e| AuthenticationError::InvalidUriFormat {
        uri: uri.to_string(),
        cause: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| AuthenticationError::FailedToParseHostnameFromUri(uri.to_string()))
}

/// Two-pass JWT validator over a cached signing key set.
pub struct TokenValidator {
    keys: Arc<CachedSigningKeys>,
    token_config: TokenConfig,
}

impl TokenValidator {
    /// Creates a validator reading keys through the given cache.
    #[must_use]
    pub fn new(keys: Arc<CachedSigningKeys>, token_config: TokenConfig) -> Self {
        Self { keys, token_config }
    }

    /// Validates the token and returns its decoded claims.
    pub async fn validate_and_decode(
        &self,
        token: &str,
        expected: &ExpectedClaims,
    ) -> Result<DecodedToken> {
        if token.trim().is_empty() {
            return Err(AuthenticationError::MissingToken);
        }

        let header = decode_header(token)?;
        ensure_algorithm_accepted(header.alg)?;
        let kid = header.kid.as_deref();

        // Signature pass against cached keys, with one forced refetch on
        // failure to pick up rotated keys. The refetch error, not the
        // original one, is what propagates.
        let jwks = self.keys.fetch(false).await?;
        let key = match verify_signature(token, header.alg, &jwks, kid) {
            Ok(key) => key,
            Err(stale_err) => {
                tracing::info!(
                    uri = %self.keys.uri(),
                    error = %stale_err,
                    "signature check failed against cached keys, refetching"
                );
                let jwks = self.keys.fetch(true).await?;
                verify_signature(token, header.alg, &jwks, kid)?
            },
        };

        // Claims pass
        let mut validation = Validation::new(header.alg);
        validation.leeway = self.token_config.clock_skew;
        validation.validate_nbf = true;
        if let Some(issuer) = &expected.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &expected.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<DecodedToken>(token, &key, &validation)?;
        let claims = data.claims;
        self.check_issued_at(&claims)?;

        Ok(claims)
    }

    /// Enforces `iat` sanity and maximum token age. `jsonwebtoken` has no
    /// iat checks of its own.
    fn check_issued_at(&self, claims: &DecodedToken) -> Result<()> {
        let Some(iat_value) = claims.get("iat") else {
            return Ok(());
        };
        let iat = iat_value.as_u64().ok_or_else(|| {
            AuthenticationError::TokenVerificationFailed("iat claim is not a timestamp".to_string())
        })?;

        let now = Utc::now().timestamp().max(0) as u64;
        if iat > now + self.token_config.clock_skew {
            return Err(AuthenticationError::TokenVerificationFailed(
                "iat claim is in the future".to_string(),
            ));
        }
        if now.saturating_sub(iat) > self.token_config.max_age {
            tracing::warn!(
                token_age = now.saturating_sub(iat),
                max_age = self.token_config.max_age,
                "token exceeds maximum age"
            );
            return Err(AuthenticationError::TokenTooOld);
        }
        Ok(())
    }
}

fn ensure_algorithm_accepted(alg: Algorithm) -> Result<()> {
    if ACCEPTED_ALGORITHMS.contains(&alg) {
        Ok(())
    } else {
        Err(AuthenticationError::UnsupportedAlgorithm(format!("{alg:?}")))
    }
}

/// Selects the decoding key for the token's kid and checks the signature
/// alone. Registered claims are deliberately not validated here.
fn verify_signature(
    token: &str,
    alg: Algorithm,
    jwks: &JwkSet,
    kid: Option<&str>,
) -> Result<DecodingKey> {
    let jwk = match kid {
        Some(kid) => jwks.find(kid).ok_or_else(|| {
            AuthenticationError::InvalidSigningKey(format!("no signing key with kid '{kid}'"))
        })?,
        None => match jwks.keys.as_slice() {
            [only] => only,
            _ => {
                return Err(AuthenticationError::InvalidSigningKey(
                    "token has no kid and the key set holds more than one key".to_string(),
                ));
            },
        },
    };
    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthenticationError::InvalidSigningKey(e.to_string()))?;

    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    decode::<Value>(token, &key, &validation)?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use ed25519_dalek::SigningKey;
    use jsonwebtoken::{EncodingKey, Header};
    use rand_core::OsRng;
    use serde_json::json;
    use tokio::sync::RwLock;

    use super::*;
    use crate::signing_key::SigningKeyProvider;

    /// Generate a test Ed25519 key pair and return (pkcs8_der, jwk_set)
    fn generate_test_keypair(kid: &str) -> (Vec<u8>, JwkSet) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());
        let jwks = serde_json::from_value(json!({
            "keys": [{
                "kty": "OKP",
                "crv": "Ed25519",
                "x": x,
                "kid": kid,
                "alg": "EdDSA",
                "use": "sig"
            }]
        }))
        .expect("valid jwk set");

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

        (pkcs8_der, jwks)
    }

    fn sign_token(pkcs8_der: &[u8], kid: Option<&str>, claims: Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = kid.map(str::to_string);
        let encoding_key = EncodingKey::from_ed_der(pkcs8_der);
        jsonwebtoken::encode(&header, &claims, &encoding_key).expect("encode test token")
    }

    fn base_claims() -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://idp.test",
            "sub": "workload-1",
            "exp": now + 300,
            "iat": now,
        })
    }

    /// Provider serving whatever key set was last installed.
    struct StaticProvider {
        jwks: RwLock<JwkSet>,
        fetches: std::sync::atomic::AtomicUsize,
    }

    impl StaticProvider {
        fn new(jwks: JwkSet) -> Self {
            Self { jwks: RwLock::new(jwks), fetches: std::sync::atomic::AtomicUsize::new(0) }
        }

        async fn rotate(&self, jwks: JwkSet) {
            *self.jwks.write().await = jwks;
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SigningKeyProvider for StaticProvider {
        fn uri(&self) -> &str {
            "https://idp.test/jwks"
        }

        async fn fetch_keys(&self) -> Result<JwkSet> {
            self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.jwks.read().await.clone())
        }
    }

    fn validator(provider: Arc<StaticProvider>) -> TokenValidator {
        let keys = Arc::new(CachedSigningKeys::new(
            provider as Arc<dyn SigningKeyProvider>,
            Duration::from_secs(300),
        ));
        TokenValidator::new(keys, TokenConfig::default())
    }

    #[tokio::test]
    async fn test_valid_token_decodes() {
        let (der, jwks) = generate_test_keypair("key-1");
        let provider = Arc::new(StaticProvider::new(jwks));
        let validator = validator(provider.clone());

        let token = sign_token(&der, Some("key-1"), base_claims());
        let expected = ExpectedClaims::builder().issuer("https://idp.test").build();

        let claims = validator.validate_and_decode(&token, &expected).await.unwrap();
        assert_eq!(claims.get("sub").and_then(Value::as_str), Some("workload-1"));
    }

    #[tokio::test]
    async fn test_blank_token_rejected() {
        let (_, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let err = validator
            .validate_and_decode("   ", &ExpectedClaims::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingToken));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (der, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let now = Utc::now().timestamp();
        let token = sign_token(
            &der,
            Some("key-1"),
            json!({ "iss": "https://idp.test", "exp": now - 600, "iat": now - 900 }),
        );

        let err = validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::TokenExpired));
    }

    #[tokio::test]
    async fn test_missing_exp_claim() {
        let (der, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let token = sign_token(
            &der,
            Some("key-1"),
            json!({ "iss": "https://idp.test", "iat": Utc::now().timestamp() }),
        );

        let err = validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingMandatoryClaim(claim) if claim == "exp"));
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let (der, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let token = sign_token(&der, Some("key-1"), base_claims());
        let expected = ExpectedClaims::builder().issuer("https://other-idp.test").build();

        let err = validator.validate_and_decode(&token, &expected).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::TokenVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_audience_enforced_when_configured() {
        let (der, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let now = Utc::now().timestamp();
        let claims = json!({
            "iss": "https://idp.test",
            "aud": "conjur",
            "exp": now + 300,
            "iat": now,
        });
        let token = sign_token(&der, Some("key-1"), claims);

        let good = ExpectedClaims::builder().audience("conjur").build();
        assert!(validator.validate_and_decode(&token, &good).await.is_ok());

        let bad = ExpectedClaims::builder().audience("other").build();
        let err = validator.validate_and_decode(&token, &bad).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::TokenVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_token_older_than_max_age() {
        let (der, jwks) = generate_test_keypair("key-1");
        let provider = Arc::new(StaticProvider::new(jwks));
        let keys = Arc::new(CachedSigningKeys::new(
            provider as Arc<dyn SigningKeyProvider>,
            Duration::from_secs(300),
        ));
        let validator =
            TokenValidator::new(keys, TokenConfig { clock_skew: 60, max_age: 3600 });

        let now = Utc::now().timestamp();
        let token = sign_token(
            &der,
            Some("key-1"),
            json!({ "iss": "https://idp.test", "exp": now + 300, "iat": now - 7200 }),
        );

        let err = validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::TokenTooOld));
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_rejected() {
        let (_, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &base_claims(),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        let err = validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::UnsupportedAlgorithm(_)));
    }

    #[tokio::test]
    async fn test_rotated_key_triggers_single_refetch() {
        let (old_der, old_jwks) = generate_test_keypair("key-old");
        let (new_der, new_jwks) = generate_test_keypair("key-new");
        let provider = Arc::new(StaticProvider::new(old_jwks));
        let validator = validator(provider.clone());

        // Warm the cache with the old key set
        let old_token = sign_token(&old_der, Some("key-old"), base_claims());
        validator
            .validate_and_decode(&old_token, &ExpectedClaims::default())
            .await
            .unwrap();
        assert_eq!(provider.fetch_count(), 1);

        // Rotate keys at the provider; the cached set is now stale
        provider.rotate(new_jwks).await;

        let new_token = sign_token(&new_der, Some("key-new"), base_claims());
        validator
            .validate_and_decode(&new_token, &ExpectedClaims::default())
            .await
            .unwrap();
        assert_eq!(provider.fetch_count(), 2, "exactly one forced refetch");
    }

    #[tokio::test]
    async fn test_unknown_key_fails_after_refetch() {
        let (_, jwks) = generate_test_keypair("key-1");
        let (foreign_der, _) = generate_test_keypair("key-foreign");
        let provider = Arc::new(StaticProvider::new(jwks));
        let validator = validator(provider.clone());

        let token = sign_token(&foreign_der, Some("key-foreign"), base_claims());
        let err = validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .unwrap_err();

        // Refetch happened, then the second attempt's error propagated
        assert_eq!(provider.fetch_count(), 2);
        assert!(matches!(err, AuthenticationError::InvalidSigningKey(_)));
    }

    #[tokio::test]
    async fn test_kid_less_token_with_single_key() {
        let (der, jwks) = generate_test_keypair("key-1");
        let validator = validator(Arc::new(StaticProvider::new(jwks)));

        let token = sign_token(&der, None, base_claims());
        assert!(validator
            .validate_and_decode(&token, &ExpectedClaims::default())
            .await
            .is_ok());
    }

    #[test]
    fn test_resolve_issuer_precedence() {
        // Explicit issuer wins over everything
        let issuer = resolve_issuer(
            Some("https://explicit"),
            Some("https://provider"),
            Some("https://keys/jwks"),
        )
        .unwrap();
        assert_eq!(issuer, "https://explicit");

        // provider-uri alone is used verbatim
        assert_eq!(resolve_issuer(None, Some("https://provider"), None).unwrap(), "https://provider");

        // jwks-uri alone is reduced to its hostname
        assert_eq!(
            resolve_issuer(None, None, Some("https://keys.idp.test/path/jwks")).unwrap(),
            "keys.idp.test"
        );
    }

    #[test]
    fn test_resolve_issuer_invalid_combinations() {
        let err = resolve_issuer(None, Some("https://p"), Some("https://j")).unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidIssuerConfiguration));

        let err = resolve_issuer(None, None, None).unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidIssuerConfiguration));
    }

    #[test]
    fn test_resolve_issuer_bad_jwks_uri() {
        let err = resolve_issuer(None, None, Some("not a uri")).unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidUriFormat { .. }));

        let err = resolve_issuer(None, None, Some("unix:/var/sock")).unwrap_err();
        assert!(matches!(err, AuthenticationError::FailedToParseHostnameFromUri(_)));
    }
}
