//! The built-in `authn` API-key authenticator.

use std::sync::Arc;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use warden_store::{RoleStore, role_id_from_login};
use warden_types::{AuthenticatorInput, LoginResponse};

use crate::{
    authenticators::AuthenticatorAdapter,
    error::{AuthenticationError, Result},
};

/// Authenticates a role by its assigned API key.
///
/// Key comparison is constant-time; a wrong key and an unknown role are
/// indistinguishable to the caller.
pub struct ApiKeyAuthenticator {
    roles: Arc<dyn RoleStore>,
}

impl ApiKeyAuthenticator {
    /// Creates the authenticator.
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Login: validates the API key and returns the role id together
    /// with the key, for clients that authenticate by key thereafter.
    pub async fn login(&self, input: &AuthenticatorInput) -> Result<LoginResponse> {
        let username = self.verify_key(input).await?;
        let role_id = role_id_from_login(&input.account, &username);
        let api_key = self
            .roles
            .api_key(&role_id)
            .await?
            .ok_or(AuthenticationError::InvalidCredentials)?;
        Ok(LoginResponse { role_id: Some(role_id), authentication_key: Some(api_key) })
    }

    async fn verify_key(&self, input: &AuthenticatorInput) -> Result<String> {
        let username = match &input.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => return Err(AuthenticationError::InvalidCredentials),
        };
        if input.credentials.is_empty() {
            return Err(AuthenticationError::InvalidCredentials);
        }

        let role_id = role_id_from_login(&input.account, &username);
        let stored = self
            .roles
            .api_key(&role_id)
            .await?
            .ok_or(AuthenticationError::InvalidCredentials)?;

        let matches: bool = stored.as_bytes().ct_eq(input.credentials.as_bytes()).into();
        if !matches {
            return Err(AuthenticationError::InvalidCredentials);
        }

        Ok(username)
    }
}

#[async_trait]
impl AuthenticatorAdapter for ApiKeyAuthenticator {
    fn name(&self) -> &str {
        "authn"
    }

    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String> {
        self.verify_key(input).await
    }
}
