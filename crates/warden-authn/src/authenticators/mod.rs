//! Protocol-specific authenticator adapters.
//!
//! Each adapter turns one credential format into a validated identity:
//! an API key, a platform-issued JWT from Azure or GCE, a generic JWT,
//! or an OIDC authorization code. Adapters run after the webservice has
//! been vetted but before the role checks; their job is the credential
//! itself and the role's resource restrictions.

pub mod api_key;
pub mod azure;
pub mod gce;
pub mod jwt;
pub mod oidc;

use async_trait::async_trait;
use warden_types::AuthenticatorInput;

use crate::error::{AuthenticationError, Result};

pub use api_key::ApiKeyAuthenticator;
pub use azure::AzureAuthenticator;
pub use gce::GceAuthenticator;
pub use jwt::JwtAuthenticator;
pub use oidc::OidcAuthenticator;

/// A pluggable authenticator.
#[async_trait]
pub trait AuthenticatorAdapter: Send + Sync {
    /// Authenticator type name, e.g. `authn-jwt`.
    fn name(&self) -> &str;

    /// Validates the credentials and returns the authenticated identity
    /// in login form (`alice` or `host/path`).
    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String>;

    /// Whether this authenticator implements a status check. The engine
    /// rejects status requests for adapters that do not, before any
    /// authorization checks run.
    fn supports_status(&self) -> bool {
        false
    }

    /// Checks the authenticator's configuration health for the status
    /// endpoint. Adapters without a meaningful check keep the default.
    async fn status(&self, _input: &AuthenticatorInput) -> Result<()> {
        Err(AuthenticationError::StatusNotImplemented(self.name().to_string()))
    }
}
