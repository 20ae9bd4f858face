//! OpenID Connect discovery and token exchange.
//!
//! Discovery fetches `{provider-uri}/.well-known/openid-configuration`
//! and caches the result per issuer, so repeated authentications do not
//! hammer the provider. Token exchange trades an authorization code for
//! an ID token at the provider's token endpoint.

use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::error::{AuthenticationError, Result};

/// Provider metadata from the OpenID Connect discovery document.
#[derive(Debug, Clone, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct ProviderConfiguration {
    /// Issuer identifier, must match the `iss` claim of issued tokens
    pub issuer: String,

    /// JWKS URI for fetching signing keys
    pub jwks_uri: String,

    /// Token endpoint for the authorization-code exchange
    pub token_endpoint: Option<String>,

    /// Supported signing algorithms
    #[serde(default)]
    #[builder(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Parameters for the authorization-code exchange.
#[derive(Debug, Clone, Serialize, bon::Builder)]
#[builder(on(String, into))]
pub struct CodeExchangeRequest {
    /// OAuth client id registered with the provider
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
    /// Authorization code returned by the provider
    pub code: String,
    /// PKCE code verifier, when the flow used one
    pub code_verifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// Discovery client with a per-issuer TTL cache.
pub struct OidcDiscoveryClient {
    http_client: reqwest::Client,
    cache: Arc<Cache<String, ProviderConfiguration>>,
}

impl OidcDiscoveryClient {
    /// Creates a discovery client.
    ///
    /// `timeout` bounds each discovery request; `cache_ttl` controls how
    /// long discovered documents are reused.
    pub fn new(timeout: Duration, cache_ttl: Duration) -> Result<Self> {
        let cache = Arc::new(Cache::builder().max_capacity(100).time_to_live(cache_ttl).build());

        let http_client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            AuthenticationError::ProviderDiscoveryFailed {
                uri: String::new(),
                cause: format!("failed to create HTTP client: {e}"),
            }
        })?;

        Ok(Self { http_client, cache })
    }

    /// Fetches the discovery document for `provider_uri`, using the cache
    /// when a fresh copy is available.
    pub async fn discover(&self, provider_uri: &str) -> Result<ProviderConfiguration> {
        if let Some(cached) = self.cache.get(provider_uri).await {
            tracing::debug!(provider = %provider_uri, "provider discovery cache hit");
            return Ok(cached);
        }

        tracing::info!(provider = %provider_uri, "fetching provider discovery document");

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            provider_uri.trim_end_matches('/')
        );

        let response =
            self.http_client.get(&discovery_url).send().await.map_err(|e| {
                discovery_error(provider_uri, &e)
            })?;

        if !response.status().is_success() {
            return Err(AuthenticationError::ProviderDiscoveryFailed {
                uri: provider_uri.to_string(),
                cause: format!("discovery failed with status {}", response.status()),
            });
        }

        let config: ProviderConfiguration = response.json().await.map_err(|e| {
            AuthenticationError::ProviderDiscoveryFailed {
                uri: provider_uri.to_string(),
                cause: format!("failed to parse discovery response: {e}"),
            }
        })?;

        if config.issuer.is_empty() {
            return Err(AuthenticationError::ProviderDiscoveryFailed {
                uri: provider_uri.to_string(),
                cause: "discovery document is missing 'issuer'".to_string(),
            });
        }
        if config.jwks_uri.is_empty() {
            return Err(AuthenticationError::ProviderDiscoveryFailed {
                uri: provider_uri.to_string(),
                cause: "discovery document is missing 'jwks_uri'".to_string(),
            });
        }

        self.cache.insert(provider_uri.to_string(), config.clone()).await;
        tracing::info!(
            provider = %provider_uri,
            jwks_uri = %config.jwks_uri,
            "provider discovery successful"
        );

        Ok(config)
    }

    /// Cached configuration, if any.
    pub async fn get_cached(&self, provider_uri: &str) -> Option<ProviderConfiguration> {
        self.cache.get(provider_uri).await
    }

    /// Drops all cached discovery documents.
    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

/// Exchanges an authorization code for an ID token.
pub struct OidcClient {
    http_client: reqwest::Client,
}

impl OidcClient {
    /// Creates a token-exchange client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            AuthenticationError::ProviderTokenExchangeFailed {
                uri: String::new(),
                cause: format!("failed to create HTTP client: {e}"),
            }
        })?;
        Ok(Self { http_client })
    }

    /// Submits the authorization code to the provider's token endpoint
    /// and returns the raw ID token.
    pub async fn exchange_code(
        &self,
        config: &ProviderConfiguration,
        request: &CodeExchangeRequest,
    ) -> Result<String> {
        let token_endpoint = config.token_endpoint.as_deref().ok_or_else(|| {
            AuthenticationError::ProviderTokenExchangeFailed {
                uri: config.issuer.clone(),
                cause: "discovery document has no token endpoint".to_string(),
            }
        })?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", request.client_id.as_str()),
            ("client_secret", request.client_secret.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("code", request.code.as_str()),
        ];
        if let Some(verifier) = &request.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        let response =
            self.http_client.post(token_endpoint).form(&form).send().await.map_err(|e| {
                AuthenticationError::ProviderTokenExchangeFailed {
                    uri: token_endpoint.to_string(),
                    cause: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            return Err(AuthenticationError::ProviderTokenExchangeFailed {
                uri: token_endpoint.to_string(),
                cause: format!("token endpoint returned status {}", response.status()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthenticationError::ProviderTokenExchangeFailed {
                uri: token_endpoint.to_string(),
                cause: format!("failed to parse token response: {e}"),
            }
        })?;

        token.id_token.ok_or_else(|| AuthenticationError::ProviderTokenExchangeFailed {
            uri: token_endpoint.to_string(),
            cause: "token response has no id_token".to_string(),
        })
    }
}

pub(crate) fn discovery_error(uri: &str, error: &reqwest::Error) -> AuthenticationError {
    if error.is_timeout() {
        AuthenticationError::ProviderDiscoveryTimeout {
            uri: uri.to_string(),
            cause: error.to_string(),
        }
    } else {
        AuthenticationError::ProviderDiscoveryFailed {
            uri: uri.to_string(),
            cause: error.to_string(),
        }
    }
}
