//! The `authn-oidc` authenticator.
//!
//! Authenticates a human user by an OIDC authorization code. The engine
//! exchanges the code for an ID token at the provider's token endpoint,
//! validates the token against the provider's published keys, and maps
//! the claim named by `claim-mapping` to the username.

use std::sync::Arc;

use async_trait::async_trait;
use warden_config::{ProviderConfig, TokenConfig};
use warden_store::SecretStore;
use warden_types::{AuthenticatorInput, Webservice};

use crate::{
    authenticators::AuthenticatorAdapter,
    error::{AuthenticationError, Result},
    oidc::{CodeExchangeRequest, OidcClient, OidcDiscoveryClient, ProviderConfiguration},
    restrictions::{claim_value, value_as_string},
    secrets::fetch_authenticator_secrets,
    signing_key::{KeyProviderFactory, SigningKeyCaches},
    validate_decode::{ExpectedClaims, TokenValidator},
};

const PROVIDER_URI_VAR: &str = "provider-uri";
const CLIENT_ID_VAR: &str = "client-id";
const CLIENT_SECRET_VAR: &str = "client-secret";
const REDIRECT_URI_VAR: &str = "redirect-uri";
const CLAIM_MAPPING_VAR: &str = "claim-mapping";

/// Provider interaction needed by the authorization-code flow.
///
/// Production uses [`HttpOidcProvider`]; tests substitute a stub.
#[async_trait]
pub trait OidcProviderClient: Send + Sync {
    /// Fetches the provider's discovery document.
    async fn discover(&self, provider_uri: &str) -> Result<ProviderConfiguration>;

    /// Exchanges an authorization code for a raw ID token.
    async fn exchange_code(
        &self,
        config: &ProviderConfiguration,
        request: &CodeExchangeRequest,
    ) -> Result<String>;
}

/// [`OidcProviderClient`] backed by real HTTP clients.
pub struct HttpOidcProvider {
    discovery: Arc<OidcDiscoveryClient>,
    exchange: OidcClient,
}

impl HttpOidcProvider {
    /// Creates the provider client.
    pub fn new(discovery: Arc<OidcDiscoveryClient>, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self { discovery, exchange: OidcClient::new(timeout)? })
    }
}

#[async_trait]
impl OidcProviderClient for HttpOidcProvider {
    async fn discover(&self, provider_uri: &str) -> Result<ProviderConfiguration> {
        self.discovery.discover(provider_uri).await
    }

    async fn exchange_code(
        &self,
        config: &ProviderConfiguration,
        request: &CodeExchangeRequest,
    ) -> Result<String> {
        self.exchange.exchange_code(config, request).await
    }
}

/// Authenticates users through the OIDC authorization-code flow.
pub struct OidcAuthenticator {
    secrets: Arc<dyn SecretStore>,
    provider: Arc<dyn OidcProviderClient>,
    key_factory: Arc<dyn KeyProviderFactory>,
    key_caches: SigningKeyCaches,
    token_config: TokenConfig,
}

impl OidcAuthenticator {
    /// Creates the authenticator.
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        provider: Arc<dyn OidcProviderClient>,
        key_factory: Arc<dyn KeyProviderFactory>,
        provider_config: &ProviderConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            secrets,
            provider,
            key_factory,
            key_caches: SigningKeyCaches::new(std::time::Duration::from_secs(
                provider_config.jwks_cache_ttl_secs,
            )),
            token_config,
        }
    }

    async fn settings(&self, webservice: &Webservice) -> Result<OidcSettings> {
        let mut values = fetch_authenticator_secrets(
            self.secrets.as_ref(),
            webservice,
            &[
                PROVIDER_URI_VAR,
                CLIENT_ID_VAR,
                CLIENT_SECRET_VAR,
                REDIRECT_URI_VAR,
                CLAIM_MAPPING_VAR,
            ],
        )
        .await?;
        let mut take = |name: &str| {
            values
                .remove(name)
                .ok_or_else(|| AuthenticationError::RequiredSecretMissing(name.to_string()))
        };
        Ok(OidcSettings {
            provider_uri: take(PROVIDER_URI_VAR)?,
            client_id: take(CLIENT_ID_VAR)?,
            client_secret: take(CLIENT_SECRET_VAR)?,
            redirect_uri: take(REDIRECT_URI_VAR)?,
            claim_mapping: take(CLAIM_MAPPING_VAR)?,
        })
    }
}

struct OidcSettings {
    provider_uri: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    claim_mapping: String,
}

/// Splits credentials of the form `code=...&code_verifier=...`. A bare
/// value is taken as the code itself.
fn parse_credentials(credentials: &str) -> (String, Option<String>) {
    if !credentials.contains('=') {
        return (credentials.to_string(), None);
    }
    let mut code = String::new();
    let mut verifier = None;
    for (key, value) in url::form_urlencoded::parse(credentials.as_bytes()) {
        match key.as_ref() {
            "code" => code = value.into_owned(),
            "code_verifier" => verifier = Some(value.into_owned()),
            _ => {},
        }
    }
    (code, verifier)
}

#[async_trait]
impl AuthenticatorAdapter for OidcAuthenticator {
    fn name(&self) -> &str {
        "authn-oidc"
    }

    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String> {
        let (code, code_verifier) = parse_credentials(&input.credentials);
        if code.is_empty() {
            return Err(AuthenticationError::InvalidCredentials);
        }

        let webservice = Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        );
        let settings = self.settings(&webservice).await?;

        let config = self.provider.discover(&settings.provider_uri).await?;
        let request = CodeExchangeRequest::builder()
            .client_id(settings.client_id.clone())
            .client_secret(settings.client_secret)
            .redirect_uri(settings.redirect_uri)
            .code(code)
            .maybe_code_verifier(code_verifier)
            .build();
        let id_token = self.provider.exchange_code(&config, &request).await?;

        let keys = self
            .key_caches
            .get_or_create(&settings.provider_uri, || {
                self.key_factory.for_provider_uri(&settings.provider_uri)
            })
            .await?;
        let expected = ExpectedClaims {
            issuer: Some(config.issuer.clone()),
            audience: Some(settings.client_id),
        };
        let claims = TokenValidator::new(keys, self.token_config.clone())
            .validate_and_decode(&id_token, &expected)
            .await?;

        claim_value(&claims, &settings.claim_mapping)
            .and_then(value_as_string)
            .filter(|v| !v.is_empty())
            .ok_or(AuthenticationError::IdTokenClaimNotFoundOrEmpty(settings.claim_mapping))
    }

    fn supports_status(&self) -> bool {
        true
    }

    async fn status(&self, input: &AuthenticatorInput) -> Result<()> {
        let webservice = Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        );
        let settings = self.settings(&webservice).await?;
        self.provider.discover(&settings.provider_uri).await?;
        self.key_caches
            .get_or_create(&settings.provider_uri, || {
                self.key_factory.for_provider_uri(&settings.provider_uri)
            })
            .await?
            .fetch(true)
            .await?;
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
    use warden_store::MemoryStore;

    use super::*;
    use crate::signing_key::SigningKeyProvider;

    const PROVIDER: &str = "https://auth.example.com";

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

    struct StubProviderClient {
        id_token: String,
    }

    #[async_trait]
    impl OidcProviderClient for StubProviderClient {
        async fn discover(&self, _provider_uri: &str) -> Result<ProviderConfiguration> {
            Ok(ProviderConfiguration::builder()
                .issuer(PROVIDER)
                .jwks_uri(format!("{PROVIDER}/jwks"))
                .token_endpoint(format!("{PROVIDER}/token"))
                .build())
        }

        async fn exchange_code(
            &self,
            _config: &ProviderConfiguration,
            request: &CodeExchangeRequest,
        ) -> Result<String> {
            if request.code == "bad-code" {
                return Err(AuthenticationError::ProviderTokenExchangeFailed {
                    uri: format!("{PROVIDER}/token"),
                    cause: "token endpoint returned status 400".to_string(),
                });
            }
            Ok(self.id_token.clone())
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

    fn id_token_claims(aud: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": PROVIDER,
            "aud": aud,
            "sub": "user-1",
            "preferred_username": "alice",
            "exp": now + 300,
            "iat": now,
        })
    }

    fn input(credentials: &str) -> AuthenticatorInput {
        AuthenticatorInput {
            authenticator_name: "authn-oidc".to_string(),
            service_id: Some("okta".to_string()),
            account: "acme".to_string(),
            username: None,
            credentials: credentials.to_string(),
            client_ip: "127.0.0.1".to_string(),
        }
    }

    async fn setup(id_token: String, jwks: JwkSet) -> OidcAuthenticator {
        let store = Arc::new(MemoryStore::new());
        for (name, value) in [
            ("provider-uri", PROVIDER),
            ("client-id", "warden-client"),
            ("client-secret", "s3cret"),
            ("redirect-uri", "https://warden/callback"),
            ("claim-mapping", "preferred_username"),
        ] {
            store.set_secret(format!("acme:variable:conjur/authn-oidc/okta/{name}"), value).await;
        }

        OidcAuthenticator::new(
            store,
            Arc::new(StubProviderClient { id_token }),
            Arc::new(StubKeyFactory { jwks }),
            &ProviderConfig::default(),
            TokenConfig::default(),
        )
    }

    #[test]
    fn test_parse_credentials() {
        assert_eq!(parse_credentials("abc"), ("abc".to_string(), None));
        assert_eq!(
            parse_credentials("code=abc&code_verifier=v1"),
            ("abc".to_string(), Some("v1".to_string()))
        );
        assert_eq!(parse_credentials("code=abc"), ("abc".to_string(), None));
    }

    #[tokio::test]
    async fn test_authenticates_mapped_claim() {
        let (der, jwks) = generate_test_keypair();
        let id_token = sign_token(&der, id_token_claims("warden-client"));
        let authenticator = setup(id_token, jwks).await;

        let username = authenticator.authenticate(&input("auth-code-1")).await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn test_empty_code_rejected() {
        let (_, jwks) = generate_test_keypair();
        let authenticator = setup(String::new(), jwks).await;

        let err = authenticator.authenticate(&input("")).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_exchange_failure_propagates() {
        let (der, jwks) = generate_test_keypair();
        let id_token = sign_token(&der, id_token_claims("warden-client"));
        let authenticator = setup(id_token, jwks).await;

        let err = authenticator.authenticate(&input("bad-code")).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::ProviderTokenExchangeFailed { .. }));
    }

    #[tokio::test]
    async fn test_audience_must_match_client_id() {
        let (der, jwks) = generate_test_keypair();
        let id_token = sign_token(&der, id_token_claims("some-other-client"));
        let authenticator = setup(id_token, jwks).await;

        let err = authenticator.authenticate(&input("auth-code-1")).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::TokenVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_mapped_claim() {
        let (der, jwks) = generate_test_keypair();
        let now = Utc::now().timestamp();
        let id_token = sign_token(
            &der,
            json!({
                "iss": PROVIDER, "aud": "warden-client", "sub": "user-1",
                "exp": now + 300, "iat": now,
            }),
        );
        let authenticator = setup(id_token, jwks).await;

        let err = authenticator.authenticate(&input("auth-code-1")).await.unwrap_err();
        assert!(
            matches!(err, AuthenticationError::IdTokenClaimNotFoundOrEmpty(claim)
                if claim == "preferred_username")
        );
    }

    #[tokio::test]
    async fn test_missing_configuration_variable() {
        let (der, jwks) = generate_test_keypair();
        let id_token = sign_token(&der, id_token_claims("warden-client"));
        let store = Arc::new(MemoryStore::new());
        store
            .set_secret("acme:variable:conjur/authn-oidc/okta/provider-uri", PROVIDER)
            .await;

        let authenticator = OidcAuthenticator::new(
            store,
            Arc::new(StubProviderClient { id_token }),
            Arc::new(StubKeyFactory { jwks }),
            &ProviderConfig::default(),
            TokenConfig::default(),
        );

        let err = authenticator.authenticate(&input("auth-code-1")).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::RequiredSecretMissing(_)));
    }
}
