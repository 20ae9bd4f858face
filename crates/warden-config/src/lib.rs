//! # Warden Config
//!
//! Loads engine configuration from a YAML file with `WARDEN_` environment
//! variable overrides. Configuration is read once at process start and
//! threaded explicitly through the orchestrator's constructor; nothing in
//! the engine reads the environment at request time.
//!
//! ```yaml
//! enabled_authenticators: "authn,authn-jwt/raw,authn-azure/prod"
//! token:
//!   clock_skew: 60
//!   max_age: 86400
//! provider:
//!   timeout_secs: 10
//!   jwks_cache_ttl_secs: 300
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying loader failure (missing file, parse error, bad override)
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value that passed parsing but makes no operational sense
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Token validation knobs shared by all JWT-based authenticators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Clock skew tolerance in seconds for exp/nbf/iat checks
    #[serde(default = "default_clock_skew")]
    pub clock_skew: u64,

    /// Maximum accepted token age in seconds (now - iat)
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { clock_skew: default_clock_skew(), max_age: default_max_age() }
    }
}

/// Identity-provider HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Timeout in seconds for discovery and JWKS fetches
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// TTL in seconds for cached signing key sets
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_provider_timeout(),
            jwks_cache_ttl_secs: default_jwks_cache_ttl(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Comma-separated whitelist of enabled authenticator webservices,
    /// e.g. `"authn,authn-jwt/raw"`. The default `authn` authenticator is
    /// always treated as enabled regardless of this list.
    #[serde(default)]
    pub enabled_authenticators: String,

    /// Token validation settings
    #[serde(default)]
    pub token: TokenConfig,

    /// Identity-provider HTTP settings
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    /// Loads configuration from an optional YAML file, then applies
    /// `WARDEN_`-prefixed environment overrides (`WARDEN_TOKEN__MAX_AGE`
    /// style for nested fields).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: Config = builder
            .add_source(Environment::with_prefix("WARDEN").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider.timeout_secs must be positive".into()));
        }
        if self.token.max_age == 0 {
            return Err(ConfigError::Invalid("token.max_age must be positive".into()));
        }
        Ok(())
    }
}

fn default_clock_skew() -> u64 {
    60
}

fn default_max_age() -> u64 {
    86400
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_jwks_cache_ttl() -> u64 {
    300
}
