//! Security validation pipeline.
//!
//! The checks run in two phases around credential verification. Before
//! any credentials are examined: the account exists, the authenticator
//! webservice is defined in policy, and it is on the enabled list.
//! After the authenticator has resolved an identity: the role exists
//! and holds the `authenticate` privilege on the webservice. Within
//! each phase the first failing check wins; later checks never run.
//! The default `authn` authenticator is always enabled and needs no
//! webservice or privilege grants.

use std::sync::Arc;

use warden_store::{ResourceStore, RoleStore, role_id_from_login};
use warden_types::{Webservice, Webservices};

use crate::error::{AuthenticationError, Result};

/// Privilege required to authenticate through a webservice.
pub const AUTHENTICATE_PRIVILEGE: &str = "authenticate";

/// Privilege required to read an authenticator's status.
pub const READ_PRIVILEGE: &str = "read";

/// Name of the built-in API-key authenticator.
pub const DEFAULT_AUTHENTICATOR: &str = "authn";

/// Runs the pre-credential security checks.
pub struct SecurityValidator {
    roles: Arc<dyn RoleStore>,
    resources: Arc<dyn ResourceStore>,
}

impl SecurityValidator {
    /// Creates a validator over the given stores.
    pub fn new(roles: Arc<dyn RoleStore>, resources: Arc<dyn ResourceStore>) -> Self {
        Self { roles, resources }
    }

    /// Validates an authentication request end to end: webservice-level
    /// checks followed by role-level checks.
    ///
    /// `enabled_authenticators` is the comma-separated whitelist from
    /// configuration; `username` is the login form of the requesting
    /// identity.
    pub async fn validate(
        &self,
        webservice: &Webservice,
        username: &str,
        enabled_authenticators: &str,
    ) -> Result<String> {
        self.validate_webservice(webservice, enabled_authenticators).await?;
        self.validate_role_access(webservice, username).await
    }

    /// Webservice-level checks, safe to run before any credentials are
    /// touched: account defined, webservice defined, whitelisted. The
    /// default authenticator passes unconditionally.
    pub async fn validate_webservice(
        &self,
        webservice: &Webservice,
        enabled_authenticators: &str,
    ) -> Result<()> {
        if is_default_authenticator(webservice) {
            return Ok(());
        }

        self.validate_account_is_defined(webservice).await?;
        self.validate_webservice_is_defined(webservice).await?;
        validate_webservice_is_whitelisted(webservice, enabled_authenticators)
    }

    /// Role-level checks, run once the authenticator has resolved an
    /// identity: the role exists and holds `authenticate` on the
    /// webservice. Returns the fully qualified role id.
    pub async fn validate_role_access(
        &self,
        webservice: &Webservice,
        username: &str,
    ) -> Result<String> {
        let role_id = role_id_from_login(&webservice.account, username);
        if self.roles.get(&role_id).await?.is_none() {
            return Err(AuthenticationError::RoleNotFound(username.to_string()));
        }

        if is_default_authenticator(webservice) {
            return Ok(role_id);
        }

        self.validate_role_has_privilege(
            &role_id,
            AUTHENTICATE_PRIVILEGE,
            &webservice.resource_id(),
        )
        .await?;

        Ok(role_id)
    }

    /// Validates a status-endpoint request: same resolution checks, but
    /// the privilege is `read` on the webservice's status sub-resource.
    pub async fn validate_status(
        &self,
        webservice: &Webservice,
        username: &str,
        enabled_authenticators: &str,
    ) -> Result<String> {
        self.validate_account_is_defined(webservice).await?;
        self.validate_webservice_is_defined(webservice).await?;
        validate_webservice_is_whitelisted(webservice, enabled_authenticators)?;

        let role_id = role_id_from_login(&webservice.account, username);
        if self.roles.get(&role_id).await?.is_none() {
            return Err(AuthenticationError::RoleNotFound(username.to_string()));
        }

        self.validate_role_has_privilege(
            &role_id,
            READ_PRIVILEGE,
            &webservice.status_resource_id(),
        )
        .await?;

        Ok(role_id)
    }

    async fn validate_account_is_defined(&self, webservice: &Webservice) -> Result<()> {
        // Account existence is probed through its admin role
        let admin_role_id = format!("{}:user:admin", webservice.account);
        if self.roles.get(&admin_role_id).await?.is_none() {
            return Err(AuthenticationError::AccountNotDefined(webservice.account.clone()));
        }
        Ok(())
    }

    async fn validate_webservice_is_defined(&self, webservice: &Webservice) -> Result<()> {
        if self.resources.get(&webservice.resource_id()).await?.is_none() {
            return Err(AuthenticationError::ServiceNotDefined(webservice.name()));
        }
        Ok(())
    }

    async fn validate_role_has_privilege(
        &self,
        role_id: &str,
        privilege: &str,
        resource_id: &str,
    ) -> Result<()> {
        if !self.roles.allowed_to(role_id, privilege, resource_id).await? {
            return Err(AuthenticationError::RoleNotAuthorizedOnResource {
                role: role_id.to_string(),
                privilege: privilege.to_string(),
                resource: resource_id.to_string(),
            });
        }
        Ok(())
    }
}

fn is_default_authenticator(webservice: &Webservice) -> bool {
    webservice.authenticator_name == DEFAULT_AUTHENTICATOR && webservice.service_id.is_none()
}

fn validate_webservice_is_whitelisted(
    webservice: &Webservice,
    enabled_authenticators: &str,
) -> Result<()> {
    let enabled = Webservices::from_string(&webservice.account, Some(enabled_authenticators));
    if !enabled.contains(webservice) {
        return Err(AuthenticationError::AuthenticatorNotWhitelisted(webservice.name()));
    }
    Ok(())
}
