//! The authentication engine: adapter registry and orchestration.
//!
//! Every request flows the same way regardless of protocol: resolve the
//! adapter, vet the webservice, let the adapter validate the credential
//! and yield an identity, run the role-level checks, check the role's
//! network origin, then mint an access token. Exactly one audit event
//! is recorded per attempt, success or failure.

use std::sync::Arc;

use chrono::Utc;
use warden_store::RoleStore;
use warden_types::{AuthenticatorInput, LoginResponse, Webservice};

use crate::{
    audit::{AuditEvent, AuditSink},
    authenticators::{ApiKeyAuthenticator, AuthenticatorAdapter},
    error::{AuthenticationError, Result},
    metrics::AuthMetrics,
    security::SecurityValidator,
    token::TokenFactory,
};

/// Ordered collection of authenticator adapters, looked up by type name.
#[derive(Default)]
pub struct AuthenticatorRegistry {
    adapters: Vec<Arc<dyn AuthenticatorAdapter>>,
}

impl AuthenticatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter. The first registration under a name wins;
    /// later ones with the same name are ignored.
    pub fn register(&mut self, adapter: Arc<dyn AuthenticatorAdapter>) {
        if self.get(adapter.name()).is_none() {
            self.adapters.push(adapter);
        }
    }

    /// The adapter registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthenticatorAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    /// Registered adapter names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}

/// A successful authentication.
#[derive(Debug)]
pub struct AuthenticationOutcome {
    /// Identity in login form
    pub username: String,
    /// Fully qualified role id
    pub role_id: String,
    /// Signed access token
    pub access_token: String,
}

/// Orchestrates authentication across all registered adapters.
#[derive(bon::Builder)]
#[builder(on(String, into))]
pub struct AuthenticationEngine {
    registry: AuthenticatorRegistry,
    security: SecurityValidator,
    roles: Arc<dyn RoleStore>,
    api_key: Arc<ApiKeyAuthenticator>,
    audit: Arc<dyn AuditSink>,
    tokens: Arc<dyn TokenFactory>,
    metrics: Option<AuthMetrics>,
    /// Comma-separated whitelist of enabled authenticator webservices
    enabled_authenticators: String,
}

impl AuthenticationEngine {
    /// Authenticates a request end to end and mints an access token.
    pub async fn authenticate(&self, input: &AuthenticatorInput) -> Result<AuthenticationOutcome> {
        let timer =
            self.metrics.as_ref().map(|m| m.start_authentication_timer(&input.authenticator_name));
        let webservice_name = self.webservice(input).name();

        let result = self.authenticate_inner(input).await;
        drop(timer);

        match &result {
            Ok(outcome) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_success(&input.authenticator_name);
                }
                self.audit.record(AuditEvent::AuthenticationSuccess {
                    account: input.account.clone(),
                    authenticator: webservice_name,
                    username: outcome.username.clone(),
                    client_ip: input.client_ip.clone(),
                    timestamp: Utc::now(),
                });
            },
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(&input.authenticator_name);
                }
                self.audit.record(AuditEvent::AuthenticationFailure {
                    account: input.account.clone(),
                    authenticator: webservice_name,
                    username: input.username.clone(),
                    client_ip: input.client_ip.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
            },
        }

        result
    }

    async fn authenticate_inner(
        &self,
        input: &AuthenticatorInput,
    ) -> Result<AuthenticationOutcome> {
        let adapter = self.registry.get(&input.authenticator_name).ok_or_else(|| {
            AuthenticationError::AuthenticatorNotFound(input.authenticator_name.clone())
        })?;

        // The webservice must be vetted before the credential is touched
        let webservice = self.webservice(input);
        self.security.validate_webservice(&webservice, &self.enabled_authenticators).await?;

        let username = adapter.authenticate(input).await?;

        let role_id = self.security.validate_role_access(&webservice, &username).await?;

        let role = self
            .roles
            .get(&role_id)
            .await?
            .ok_or_else(|| AuthenticationError::RoleNotFound(username.clone()))?;
        if !role.valid_origin(&input.client_ip) {
            return Err(AuthenticationError::InvalidOrigin);
        }

        let access_token = self.tokens.signed_token(&input.account, &username)?;
        Ok(AuthenticationOutcome { username, role_id, access_token })
    }

    /// API-key login: validates the key and returns the role id with its
    /// authentication key.
    pub async fn login(&self, input: &AuthenticatorInput) -> Result<LoginResponse> {
        match self.api_key.login(input).await {
            Ok(response) => {
                self.audit.record(AuditEvent::LoginSuccess {
                    account: input.account.clone(),
                    username: input.username.clone().unwrap_or_default(),
                    client_ip: input.client_ip.clone(),
                    timestamp: Utc::now(),
                });
                Ok(response)
            },
            Err(err) => {
                self.audit.record(AuditEvent::LoginFailure {
                    account: input.account.clone(),
                    username: input.username.clone(),
                    client_ip: input.client_ip.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
                Err(err)
            },
        }
    }

    /// Status check for an authenticator instance. The requesting user
    /// needs `read` on the webservice's status sub-resource.
    pub async fn status(&self, input: &AuthenticatorInput) -> Result<()> {
        let result = self.status_inner(input).await;
        let webservice_name = self.webservice(input).name();

        match &result {
            Ok(()) => {
                self.audit.record(AuditEvent::StatusSuccess {
                    account: input.account.clone(),
                    authenticator: webservice_name,
                    username: input.username.clone().unwrap_or_default(),
                    client_ip: input.client_ip.clone(),
                    timestamp: Utc::now(),
                });
            },
            Err(err) => {
                self.audit.record(AuditEvent::StatusFailure {
                    account: input.account.clone(),
                    authenticator: webservice_name,
                    username: input.username.clone(),
                    client_ip: input.client_ip.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
            },
        }

        result
    }

    async fn status_inner(&self, input: &AuthenticatorInput) -> Result<()> {
        let adapter = self.registry.get(&input.authenticator_name).ok_or_else(|| {
            AuthenticationError::AuthenticatorNotFound(input.authenticator_name.clone())
        })?;
        if !adapter.supports_status() {
            return Err(AuthenticationError::StatusNotImplemented(
                input.authenticator_name.clone(),
            ));
        }

        let username = match &input.username {
            Some(username) if !username.is_empty() => username.as_str(),
            _ => return Err(AuthenticationError::InvalidCredentials),
        };
        let webservice = self.webservice(input);
        self.security.validate_status(&webservice, username, &self.enabled_authenticators).await?;

        adapter.status(input).await
    }

    fn webservice(&self, input: &AuthenticatorInput) -> Webservice {
        Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        )
    }
}
