//! The `authn-gcp` family's Google Compute Engine authenticator.
//!
//! Validates identity tokens minted by the GCE metadata server. Google
//! publishes the signing keys at a fixed certs endpoint and stamps a
//! fixed issuer; the operator configures nothing but the role
//! annotations. The token's audience must name the account and host the
//! workload authenticates as.

use std::sync::Arc;

use async_trait::async_trait;
use warden_config::{ProviderConfig, TokenConfig};
use warden_store::RoleStore;
use warden_types::{AuthenticatorInput, ResourceRestrictions};

use crate::{
    authenticators::AuthenticatorAdapter,
    constraints::{AnyConstraint, Constraint, MultipleConstraint, PermittedConstraint},
    error::{AuthenticationError, Result},
    restrictions::{claim_value, extract_resource_restrictions, validate_one_to_one, value_as_string},
    signing_key::{CachedSigningKeys, KeyProviderFactory, SigningKeyCaches},
    validate_decode::{DecodedToken, ExpectedClaims, TokenValidator},
};

/// Where Google publishes the token signing keys.
pub const GCE_CERTS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuer Google stamps into GCE identity tokens.
pub const GCE_ISSUER: &str = "https://accounts.google.com";

const INSTANCE_NAME: &str = "instance-name";
const PROJECT_ID: &str = "project-id";
const SERVICE_ACCOUNT_ID: &str = "service-account-id";
const SERVICE_ACCOUNT_EMAIL: &str = "service-account-email";

/// Restriction name to token claim path, in the full-format token layout.
fn claim_path(restriction: &str) -> Option<&'static str> {
    match restriction {
        INSTANCE_NAME => Some("google/compute_engine/instance_name"),
        PROJECT_ID => Some("google/compute_engine/project_id"),
        SERVICE_ACCOUNT_ID => Some("sub"),
        SERVICE_ACCOUNT_EMAIL => Some("email"),
        _ => None,
    }
}

/// Host login asserted by the token's `aud` claim, expected in
/// `conjur/<account>/<host-id>` form.
fn host_from_audience(claims: &DecodedToken, account: &str) -> Result<String> {
    let audience = claims
        .get("aud")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthenticationError::TokenClaimNotFoundOrEmpty("aud".to_string()))?;

    let mut parts = audience.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("conjur"), Some(aud_account), Some(host))
            if aud_account == account && !host.is_empty() =>
        {
            Ok(host.to_string())
        },
        _ => Err(AuthenticationError::InvalidAudience(audience.to_string())),
    }
}

/// Authenticates GCE instances by their metadata-server identity token.
pub struct GceAuthenticator {
    roles: Arc<dyn RoleStore>,
    key_factory: Arc<dyn KeyProviderFactory>,
    key_caches: SigningKeyCaches,
    token_config: TokenConfig,
}

impl GceAuthenticator {
    /// Creates the authenticator.
    pub fn new(
        roles: Arc<dyn RoleStore>,
        key_factory: Arc<dyn KeyProviderFactory>,
        provider_config: &ProviderConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            roles,
            key_factory,
            key_caches: SigningKeyCaches::new(std::time::Duration::from_secs(
                provider_config.jwks_cache_ttl_secs,
            )),
            token_config,
        }
    }

    async fn signing_keys(&self) -> Result<Arc<CachedSigningKeys>> {
        self.key_caches
            .get_or_create(GCE_CERTS_URI, || self.key_factory.for_jwks_uri(GCE_CERTS_URI))
            .await
    }

    fn validate_restrictions(restrictions: &ResourceRestrictions) -> Result<()> {
        let known = vec![
            INSTANCE_NAME.to_string(),
            PROJECT_ID.to_string(),
            SERVICE_ACCOUNT_ID.to_string(),
            SERVICE_ACCOUNT_EMAIL.to_string(),
        ];
        let constraints = MultipleConstraint::new(vec![
            Box::new(AnyConstraint::new(known.clone())),
            Box::new(PermittedConstraint::new(known)),
        ]);
        constraints.validate(&restrictions.names())
    }
}

#[async_trait]
impl AuthenticatorAdapter for GceAuthenticator {
    fn name(&self) -> &str {
        "authn-gcp"
    }

    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String> {
        let keys = self.signing_keys().await?;
        let expected =
            ExpectedClaims { issuer: Some(GCE_ISSUER.to_string()), audience: None };
        let claims = TokenValidator::new(keys, self.token_config.clone())
            .validate_and_decode(&input.credentials, &expected)
            .await?;

        let host = host_from_audience(&claims, &input.account)?;
        let username = match &input.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => format!("host/{host}"),
        };

        let role = self
            .roles
            .by_login(&username, &input.account)
            .await?
            .ok_or_else(|| AuthenticationError::RoleNotFound(username.clone()))?;
        let restrictions = extract_resource_restrictions(
            &role.annotations,
            &input.authenticator_name,
            input.service_id.as_deref(),
        )?;
        Self::validate_restrictions(&restrictions)?;

        validate_one_to_one(&restrictions, |name| {
            claim_path(name)
                .and_then(|path| claim_value(&claims, path))
                .and_then(value_as_string)
                .filter(|v| !v.is_empty())
        })?;

        Ok(username)
    }

    fn supports_status(&self) -> bool {
        true
    }

    async fn status(&self, _input: &AuthenticatorInput) -> Result<()> {
        self.signing_keys().await?.fetch(true).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Utc;
    use ed25519_dalek::SigningKey;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
    use rand_core::OsRng;
    use serde_json::{Value, json};
    use warden_store::{Annotation, MemoryStore};

    use super::*;
    use crate::signing_key::SigningKeyProvider;

    struct FixedProvider {
        uri: String,
        jwks: JwkSet,
    }

    #[async_trait]
    impl SigningKeyProvider for FixedProvider {
        fn uri(&self) -> &str {
            &self.uri
        }

        async fn fetch_keys(&self) -> Result<JwkSet> {
            Ok(self.jwks.clone())
        }
    }

    struct StubKeyFactory {
        jwks: JwkSet,
    }

    impl KeyProviderFactory for StubKeyFactory {
        fn for_jwks_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>> {
            Ok(Arc::new(FixedProvider { uri: uri.to_string(), jwks: self.jwks.clone() }))
        }

        fn for_provider_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>> {
            Ok(Arc::new(FixedProvider { uri: uri.to_string(), jwks: self.jwks.clone() }))
        }
    }

    fn generate_test_keypair() -> (Vec<u8>, JwkSet) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().as_bytes());
        let jwks = serde_json::from_value(json!({
            "keys": [{
                "kty": "OKP", "crv": "Ed25519", "x": x,
                "kid": "key-1", "alg": "EdDSA", "use": "sig"
            }]
        }))
        .expect("valid jwk set");

        let mut pkcs8_der = vec![
            0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22,
            0x04, 0x20,
        ];
        pkcs8_der.extend_from_slice(&signing_key.to_bytes());
        (pkcs8_der, jwks)
    }

    fn sign_token(pkcs8_der: &[u8], claims: Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some("key-1".to_string());
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_ed_der(pkcs8_der))
            .expect("encode test token")
    }

    fn full_format_claims(audience: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": GCE_ISSUER,
            "aud": audience,
            "sub": "1234567890",
            "email": "vm-sa@proj-1.iam.gserviceaccount.com",
            "google": {
                "compute_engine": {
                    "instance_name": "vm-1",
                    "project_id": "proj-1",
                }
            },
            "exp": now + 300,
            "iat": now,
        })
    }

    fn input(token: &str) -> AuthenticatorInput {
        AuthenticatorInput {
            authenticator_name: "authn-gcp".to_string(),
            service_id: None,
            account: "acme".to_string(),
            username: None,
            credentials: token.to_string(),
            client_ip: "127.0.0.1".to_string(),
        }
    }

    async fn setup(annotations: Vec<Annotation>) -> (GceAuthenticator, Vec<u8>) {
        let (der, jwks) = generate_test_keypair();
        let store = Arc::new(MemoryStore::new());
        store.add_role_with_annotations("acme:host:gce/vm-1", annotations).await;

        let authenticator = GceAuthenticator::new(
            store,
            Arc::new(StubKeyFactory { jwks }),
            &ProviderConfig::default(),
            TokenConfig::default(),
        );
        (authenticator, der)
    }

    #[tokio::test]
    async fn test_authenticates_host_from_audience() {
        let (authenticator, der) = setup(vec![
            Annotation::new("authn-gcp/project-id", "proj-1"),
            Annotation::new("authn-gcp/instance-name", "vm-1"),
        ])
        .await;
        let token = sign_token(&der, full_format_claims("conjur/acme/gce/vm-1"));

        let username = authenticator.authenticate(&input(&token)).await.unwrap();
        assert_eq!(username, "host/gce/vm-1");
    }

    #[tokio::test]
    async fn test_service_account_restrictions() {
        let (authenticator, der) = setup(vec![
            Annotation::new("authn-gcp/service-account-id", "1234567890"),
            Annotation::new(
                "authn-gcp/service-account-email",
                "vm-sa@proj-1.iam.gserviceaccount.com",
            ),
        ])
        .await;
        let token = sign_token(&der, full_format_claims("conjur/acme/gce/vm-1"));

        assert!(authenticator.authenticate(&input(&token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_audience_for_other_account_rejected() {
        let (authenticator, der) =
            setup(vec![Annotation::new("authn-gcp/project-id", "proj-1")]).await;
        let token = sign_token(&der, full_format_claims("conjur/other/gce/vm-1"));

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(
            matches!(err, AuthenticationError::InvalidAudience(aud) if aud == "conjur/other/gce/vm-1")
        );
    }

    #[tokio::test]
    async fn test_malformed_audience_rejected() {
        let (authenticator, der) =
            setup(vec![Annotation::new("authn-gcp/project-id", "proj-1")]).await;
        let token = sign_token(&der, full_format_claims("gce/vm-1"));

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidAudience(_)));
    }

    #[tokio::test]
    async fn test_role_without_known_restrictions_rejected() {
        let (authenticator, der) =
            setup(vec![Annotation::new("description", "a vm")]).await;
        let token = sign_token(&der, full_format_claims("conjur/acme/gce/vm-1"));

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::RoleMissingRequiredConstraints(_)));
    }

    #[tokio::test]
    async fn test_unknown_restriction_rejected() {
        let (authenticator, der) = setup(vec![
            Annotation::new("authn-gcp/project-id", "proj-1"),
            Annotation::new("authn-gcp/zone", "us-east1-b"),
        ])
        .await;
        let token = sign_token(&der, full_format_claims("conjur/acme/gce/vm-1"));

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(
            matches!(err, AuthenticationError::ConstraintNotSupported { name, .. } if name == "zone")
        );
    }

    #[tokio::test]
    async fn test_standard_format_token_misses_instance_claims() {
        let (authenticator, der) =
            setup(vec![Annotation::new("authn-gcp/instance-name", "vm-1")]).await;
        let now = Utc::now().timestamp();
        // Standard-format tokens omit the google/compute_engine section
        let token = sign_token(
            &der,
            json!({
                "iss": GCE_ISSUER, "aud": "conjur/acme/gce/vm-1",
                "sub": "1234567890", "exp": now + 300, "iat": now,
            }),
        );

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(
            matches!(err, AuthenticationError::ResourceRestrictionNotFoundOrEmpty(name)
                if name == "instance-name")
        );
    }

    #[tokio::test]
    async fn test_restriction_value_mismatch() {
        let (authenticator, der) =
            setup(vec![Annotation::new("authn-gcp/project-id", "proj-2")]).await;
        let token = sign_token(&der, full_format_claims("conjur/acme/gce/vm-1"));

        let err = authenticator.authenticate(&input(&token)).await.unwrap_err();
        assert!(
            matches!(err, AuthenticationError::InvalidResourceRestrictions(name)
                if name == "project-id")
        );
    }
}
