//! Signing key providers and the key-set cache.
//!
//! A [`SigningKeyProvider`] knows where an authenticator's verification
//! keys live: either a directly configured JWKS endpoint or an OIDC
//! provider whose discovery document names one. [`CachedSigningKeys`]
//! fronts a provider with a TTL cache; token validation reads through it
//! and forces a refetch when a signature fails against the cached set,
//! which is how key rotation is picked up without waiting out the TTL.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use moka::future::Cache;

use crate::{
    error::{AuthenticationError, Result},
    metrics::AuthMetrics,
    oidc::OidcDiscoveryClient,
};

/// Source of JWT verification keys.
#[async_trait]
pub trait SigningKeyProvider: Send + Sync {
    /// URI the keys are fetched from; used as the cache key and in error
    /// reports.
    fn uri(&self) -> &str;

    /// Fetches a fresh key set from the source.
    async fn fetch_keys(&self) -> Result<JwkSet>;
}

/// Provider reading keys from a statically configured `jwks-uri`.
pub struct JwksUriProvider {
    uri: String,
    http_client: reqwest::Client,
}

impl JwksUriProvider {
    /// Creates a provider for the given JWKS endpoint.
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let uri = uri.into();
        let http_client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            AuthenticationError::FetchProviderKeysFailed {
                uri: uri.clone(),
                cause: format!("failed to create HTTP client: {e}"),
            }
        })?;
        Ok(Self { uri, http_client })
    }
}

#[async_trait]
impl SigningKeyProvider for JwksUriProvider {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        fetch_jwks(&self.http_client, &self.uri).await
    }
}

/// Provider resolving keys through OIDC discovery on a `provider-uri`.
pub struct ProviderUriProvider {
    provider_uri: String,
    discovery: Arc<OidcDiscoveryClient>,
    http_client: reqwest::Client,
}

impl ProviderUriProvider {
    /// Creates a provider that discovers the JWKS endpoint from the OIDC
    /// provider's well-known configuration.
    pub fn new(
        provider_uri: impl Into<String>,
        discovery: Arc<OidcDiscoveryClient>,
        timeout: Duration,
    ) -> Result<Self> {
        let provider_uri = provider_uri.into();
        let http_client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            AuthenticationError::ProviderDiscoveryFailed {
                uri: provider_uri.clone(),
                cause: format!("failed to create HTTP client: {e}"),
            }
        })?;
        Ok(Self { provider_uri, discovery, http_client })
    }
}

#[async_trait]
impl SigningKeyProvider for ProviderUriProvider {
    fn uri(&self) -> &str {
        &self.provider_uri
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        let config = self.discovery.discover(&self.provider_uri).await?;
        fetch_jwks(&self.http_client, &config.jwks_uri).await
    }
}

async fn fetch_jwks(http_client: &reqwest::Client, uri: &str) -> Result<JwkSet> {
    let response =
        http_client.get(uri).send().await.map_err(|e| key_fetch_error(uri, &e))?;

    if !response.status().is_success() {
        return Err(AuthenticationError::FetchProviderKeysFailed {
            uri: uri.to_string(),
            cause: format!("key endpoint returned status {}", response.status()),
        });
    }

    response.json::<JwkSet>().await.map_err(|e| AuthenticationError::FetchProviderKeysFailed {
        uri: uri.to_string(),
        cause: format!("failed to parse key set: {e}"),
    })
}

fn key_fetch_error(uri: &str, error: &reqwest::Error) -> AuthenticationError {
    if error.is_timeout() {
        return AuthenticationError::ProviderDiscoveryTimeout {
            uri: uri.to_string(),
            cause: error.to_string(),
        };
    }

    // TLS failures surface as connect errors; the cause chain names the
    // certificate problem
    let mut cause = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        cause = format!("{cause}: {inner}");
        source = inner.source();
    }
    if cause.contains("certificate") {
        return AuthenticationError::ProviderFetchCertificateFailed {
            uri: uri.to_string(),
            cause,
        };
    }

    AuthenticationError::FetchProviderKeysFailed { uri: uri.to_string(), cause }
}

/// TTL cache over a [`SigningKeyProvider`].
///
/// Lookups read through the cache; `force` invalidates the cached set
/// first so the fetch always reaches the source.
pub struct CachedSigningKeys {
    provider: Arc<dyn SigningKeyProvider>,
    cache: Cache<String, Arc<JwkSet>>,
    metrics: Option<Arc<AuthMetrics>>,
}

impl CachedSigningKeys {
    /// Creates the cache with the given TTL.
    #[must_use]
    pub fn new(provider: Arc<dyn SigningKeyProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: Cache::builder().max_capacity(100).time_to_live(ttl).build(),
            metrics: None,
        }
    }

    /// Attaches metrics collector for observability.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// URI of the underlying key source.
    pub fn uri(&self) -> &str {
        self.provider.uri()
    }

    /// Returns the current key set.
    ///
    /// With `force` set the cached entry is dropped before fetching, so
    /// the returned set is guaranteed to come from the source.
    pub async fn fetch(&self, force: bool) -> Result<Arc<JwkSet>> {
        let cache_key = self.provider.uri().to_string();

        if force {
            self.cache.invalidate(&cache_key).await;
            tracing::debug!(uri = %cache_key, "forcing signing key refetch");
        } else if let Some(keys) = self.cache.get(&cache_key).await {
            if let Some(ref metrics) = self.metrics {
                metrics.record_cache_hit("signing_key");
            }
            return Ok(keys);
        }

        if let Some(ref metrics) = self.metrics {
            metrics.record_cache_miss("signing_key");
        }

        let result = self.provider.fetch_keys().await;
        if let Some(ref metrics) = self.metrics {
            metrics.record_provider_request("jwks_fetch", result.is_ok());
        }
        let keys = Arc::new(result?);

        self.cache.insert(cache_key, keys.clone()).await;
        tracing::debug!(uri = %self.provider.uri(), keys = keys.keys.len(), "cached signing keys");

        Ok(keys)
    }
}

/// Builds key providers for the two configurable source kinds.
///
/// Adapters go through this trait instead of constructing HTTP providers
/// directly, so tests can substitute in-memory key sources.
pub trait KeyProviderFactory: Send + Sync {
    /// Provider for a directly configured JWKS endpoint.
    fn for_jwks_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>>;

    /// Provider that discovers the JWKS endpoint from an OIDC provider.
    fn for_provider_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>>;
}

/// Production factory backed by HTTP fetches.
pub struct HttpKeyProviderFactory {
    timeout: Duration,
    discovery: Arc<OidcDiscoveryClient>,
}

impl HttpKeyProviderFactory {
    /// Creates the factory with the given per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration, discovery: Arc<OidcDiscoveryClient>) -> Self {
        Self { timeout, discovery }
    }
}

impl KeyProviderFactory for HttpKeyProviderFactory {
    fn for_jwks_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>> {
        Ok(Arc::new(JwksUriProvider::new(uri, self.timeout)?))
    }

    fn for_provider_uri(&self, uri: &str) -> Result<Arc<dyn SigningKeyProvider>> {
        Ok(Arc::new(ProviderUriProvider::new(uri, self.discovery.clone(), self.timeout)?))
    }
}

/// Lazily built per-source key caches, shared across requests.
///
/// Authenticator configuration lives in policy variables and can change
/// at any time, so key caches are created on first use for a given
/// source URI rather than at adapter construction.
pub struct SigningKeyCaches {
    ttl: Duration,
    caches: tokio::sync::RwLock<std::collections::HashMap<String, Arc<CachedSigningKeys>>>,
}

impl SigningKeyCaches {
    /// Creates an empty cache map with the given per-set TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, caches: tokio::sync::RwLock::new(std::collections::HashMap::new()) }
    }

    /// Returns the cache for `uri`, building it from `create` on first
    /// use.
    pub async fn get_or_create<F>(&self, uri: &str, create: F) -> Result<Arc<CachedSigningKeys>>
    where
        F: FnOnce() -> Result<Arc<dyn SigningKeyProvider>>,
    {
        if let Some(cache) = self.caches.read().await.get(uri) {
            return Ok(cache.clone());
        }

        let mut caches = self.caches.write().await;
        // Re-check under the write lock; another task may have won the race
        if let Some(cache) = caches.get(uri) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(CachedSigningKeys::new(create()?, self.ttl));
        caches.insert(uri.to_string(), cache.clone());
        Ok(cache)
    }
}
