use serde::{Deserialize, Serialize};

/// Immutable description of one inbound authentication request.
///
/// Constructed once per request by the HTTP layer and threaded through the
/// whole pipeline. The username is optional on entry: some authenticators
/// receive it in the URL, others derive it from the decoded credentials and
/// produce an updated copy with [`AuthenticatorInput::with_username`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorInput {
    /// Authenticator type, e.g. `authn`, `authn-jwt`, `authn-azure`
    pub authenticator_name: String,
    /// Service id distinguishing multiple configurations of one type
    pub service_id: Option<String>,
    /// Organization account the request targets
    pub account: String,
    /// Requesting username, when already known from the request path
    pub username: Option<String>,
    /// Opaque credential material (JWT, API key, authorization code)
    pub credentials: String,
    /// Client IP as observed by the HTTP layer
    pub client_ip: String,
}

impl AuthenticatorInput {
    /// Returns a copy of this input with the username filled in.
    ///
    /// The original value is left untouched so that concurrent validation
    /// stages never observe a partially updated request.
    #[must_use]
    pub fn with_username(&self, username: impl Into<String>) -> Self {
        Self { username: Some(username.into()), ..self.clone() }
    }

    /// Returns a copy of this input with replaced credentials.
    #[must_use]
    pub fn with_credentials(&self, credentials: impl Into<String>) -> Self {
        Self { credentials: credentials.into(), ..self.clone() }
    }
}

/// Terminal output of a login-style authenticator.
///
/// Login exchanges a long-lived credential (for example a password) for the
/// role's API key; it does not mint an access token. Both fields are
/// optional so a response can be serialized without the parts a given
/// authenticator does not produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Fully qualified role id of the authenticated role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    /// The role's API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_key: Option<String>,
}
