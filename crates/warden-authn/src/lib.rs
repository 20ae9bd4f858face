//! # Warden Authentication Engine
//!
//! This crate implements Warden's pluggable authentication engine: a set
//! of protocol adapters behind a single orchestrator that validates
//! credentials, enforces policy, audits every attempt and mints access
//! tokens.
//!
//! ## Authenticators
//!
//! - **API key** (`authn`): the built-in default, constant-time key check
//! - **JWT** (`authn-jwt`): vendor-neutral JWTs from any identity provider
//! - **Azure** (`authn-azure`): AAD tokens from Azure managed identities
//! - **GCE** (`authn-gcp`): identity tokens from the GCE metadata server
//! - **OIDC** (`authn-oidc`): authorization-code flow for human users
//!
//! ## Security
//!
//! - Only asymmetric signing algorithms are accepted; HS256 and friends
//!   are explicitly rejected
//! - Signing keys are cached per provider and refetched once, at most,
//!   when a signature fails to verify against the cached set
//! - No unsafe code is allowed in this crate
//!
//! ## Example
//!
//! ```ignore
//! use warden_authn::strategy::AuthenticationEngine;
//!
//! let outcome = engine.authenticate(&input).await?;
//! println!("issued token for {}", outcome.username);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Audit logging for authentication events
pub mod audit;
/// Protocol-specific authenticator adapters
pub mod authenticators;
/// Resource restriction constraint engine
pub mod constraints;
/// Authentication errors
pub mod error;
/// Claim name and alias input validation
pub mod input_validation;
/// Prometheus metrics for authentication operations
pub mod metrics;
/// OIDC discovery and token exchange
pub mod oidc;
/// Extracting and matching resource restrictions
pub mod restrictions;
/// Authenticator configuration variables
pub mod secrets;
/// The security pipeline run on every request
pub mod security;
/// Provider signing key fetch and cache
pub mod signing_key;
/// Adapter registry and orchestration
pub mod strategy;
/// Access token issuance
pub mod token;
/// Two-pass JWT validation and decoding
pub mod validate_decode;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use authenticators::{
    ApiKeyAuthenticator, AuthenticatorAdapter, AzureAuthenticator, GceAuthenticator,
    JwtAuthenticator, OidcAuthenticator,
};
pub use error::{AuthenticationError, ErrorKind, Result};
pub use metrics::AuthMetrics;
pub use security::SecurityValidator;
pub use signing_key::{CachedSigningKeys, HttpKeyProviderFactory, KeyProviderFactory};
pub use strategy::{AuthenticationEngine, AuthenticationOutcome, AuthenticatorRegistry};
pub use token::{EdDsaTokenFactory, TokenFactory};
pub use validate_decode::{DecodedToken, TokenValidator};
