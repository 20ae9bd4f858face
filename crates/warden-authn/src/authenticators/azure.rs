//! The `authn-azure` authenticator.
//!
//! Validates Azure Active Directory access tokens presented by Azure
//! resources. The token's `xms_mirid` claim carries the resource path of
//! the authenticating identity; the role's annotations pin which
//! subscription, resource group and (optionally) managed identity may
//! authenticate as it.

use std::sync::Arc;

use async_trait::async_trait;
use warden_config::{ProviderConfig, TokenConfig};
use warden_store::{RoleStore, SecretStore};
use warden_types::{AuthenticatorInput, ResourceRestrictions, Webservice};

use crate::{
    authenticators::AuthenticatorAdapter,
    constraints::{
        Constraint, MultipleConstraint, PermittedConstraint, RequiredConstraint,
        RequiredExclusiveConstraint,
    },
    error::{AuthenticationError, Result},
    restrictions::extract_resource_restrictions,
    secrets::fetch_authenticator_secrets,
    signing_key::{CachedSigningKeys, KeyProviderFactory, SigningKeyCaches},
    validate_decode::{DecodedToken, ExpectedClaims, TokenValidator},
};

const PROVIDER_URI_VAR: &str = "provider-uri";

const SUBSCRIPTION_ID: &str = "subscription-id";
const RESOURCE_GROUP: &str = "resource-group";
const USER_ASSIGNED_IDENTITY: &str = "user-assigned-identity";
const SYSTEM_ASSIGNED_IDENTITY: &str = "system-assigned-identity";

const XMS_MIRID_CLAIM: &str = "xms_mirid";
const OID_CLAIM: &str = "oid";

const USER_ASSIGNED_IDENTITY_TYPE: &str = "userAssignedIdentities";

/// The Azure identity asserted by a token's `xms_mirid` and `oid` claims.
#[derive(Debug, PartialEq, Eq)]
struct AzureIdentity {
    subscription_id: String,
    resource_group: String,
    /// Set when the token belongs to a user-assigned managed identity.
    user_assigned_identity: Option<String>,
    /// The `oid` claim, used when no user-assigned identity is named.
    system_assigned_identity: String,
}

impl AzureIdentity {
    fn from_token(claims: &DecodedToken) -> Result<Self> {
        let mirid = claims
            .get(XMS_MIRID_CLAIM)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AuthenticationError::TokenClaimNotFoundOrEmpty(XMS_MIRID_CLAIM.to_string())
            })?;
        let oid = claims
            .get(OID_CLAIM)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AuthenticationError::TokenClaimNotFoundOrEmpty(OID_CLAIM.to_string())
            })?;

        let segments: Vec<&str> = mirid.split('/').filter(|s| !s.is_empty()).collect();
        let section = |field: &str| {
            segments
                .iter()
                .position(|s| s.eq_ignore_ascii_case(field))
                .map(|idx| &segments[idx + 1..])
        };

        let mut missing = Vec::new();
        let subscription = section("subscriptions").and_then(|rest| rest.first().copied());
        if subscription.is_none() {
            missing.push("subscriptions".to_string());
        }
        let resource_group = section("resourcegroups").and_then(|rest| rest.first().copied());
        if resource_group.is_none() {
            missing.push("resourcegroups".to_string());
        }
        let providers = section("providers");
        if providers.is_none() {
            missing.push("providers".to_string());
        }
        if !missing.is_empty() {
            return Err(AuthenticationError::MissingRequiredFieldsInXmsMirid {
                fields: missing,
                mirid: mirid.to_string(),
            });
        }

        // The providers section is namespace/type/name, nothing more
        let providers = providers.unwrap_or_default();
        if providers.len() != 3 {
            return Err(AuthenticationError::InvalidProviderFieldsInXmsMirid(mirid.to_string()));
        }

        let user_assigned_identity = (providers[1] == USER_ASSIGNED_IDENTITY_TYPE)
            .then(|| providers[2].to_string());

        Ok(Self {
            subscription_id: subscription.unwrap_or_default().to_string(),
            resource_group: resource_group.unwrap_or_default().to_string(),
            user_assigned_identity,
            system_assigned_identity: oid.to_string(),
        })
    }

    fn restriction_value(&self, name: &str) -> Option<String> {
        match name {
            SUBSCRIPTION_ID => Some(self.subscription_id.clone()),
            RESOURCE_GROUP => Some(self.resource_group.clone()),
            USER_ASSIGNED_IDENTITY => self.user_assigned_identity.clone(),
            SYSTEM_ASSIGNED_IDENTITY => self
                .user_assigned_identity
                .is_none()
                .then(|| self.system_assigned_identity.clone()),
            _ => None,
        }
    }
}

/// Authenticates Azure workloads by their AAD access token.
pub struct AzureAuthenticator {
    roles: Arc<dyn RoleStore>,
    secrets: Arc<dyn SecretStore>,
    key_factory: Arc<dyn KeyProviderFactory>,
    key_caches: SigningKeyCaches,
    token_config: TokenConfig,
}

impl AzureAuthenticator {
    /// Creates the authenticator.
    pub fn new(
        roles: Arc<dyn RoleStore>,
        secrets: Arc<dyn SecretStore>,
        key_factory: Arc<dyn KeyProviderFactory>,
        provider_config: &ProviderConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            roles,
            secrets,
            key_factory,
            key_caches: SigningKeyCaches::new(std::time::Duration::from_secs(
                provider_config.jwks_cache_ttl_secs,
            )),
            token_config,
        }
    }

    async fn provider_uri(&self, webservice: &Webservice) -> Result<String> {
        let mut values =
            fetch_authenticator_secrets(self.secrets.as_ref(), webservice, &[PROVIDER_URI_VAR])
                .await?;
        values.remove(PROVIDER_URI_VAR).ok_or_else(|| {
            AuthenticationError::RequiredSecretMissing(PROVIDER_URI_VAR.to_string())
        })
    }

    async fn signing_keys(&self, provider_uri: &str) -> Result<Arc<CachedSigningKeys>> {
        self.key_caches
            .get_or_create(provider_uri, || self.key_factory.for_provider_uri(provider_uri))
            .await
    }

    fn validate_restrictions(restrictions: &ResourceRestrictions) -> Result<()> {
        let constraints = MultipleConstraint::new(vec![
            Box::new(RequiredConstraint::new(vec![
                SUBSCRIPTION_ID.to_string(),
                RESOURCE_GROUP.to_string(),
            ])),
            Box::new(RequiredExclusiveConstraint::new(vec![
                USER_ASSIGNED_IDENTITY.to_string(),
                SYSTEM_ASSIGNED_IDENTITY.to_string(),
            ])),
            Box::new(PermittedConstraint::new(vec![
                SUBSCRIPTION_ID.to_string(),
                RESOURCE_GROUP.to_string(),
                USER_ASSIGNED_IDENTITY.to_string(),
                SYSTEM_ASSIGNED_IDENTITY.to_string(),
            ])),
        ]);
        constraints.validate(&restrictions.names())
    }
}

#[async_trait]
impl AuthenticatorAdapter for AzureAuthenticator {
    fn name(&self) -> &str {
        "authn-azure"
    }

    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String> {
        let username = match &input.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => return Err(AuthenticationError::InvalidCredentials),
        };
        let webservice = Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        );

        let provider_uri = self.provider_uri(&webservice).await?;
        let keys = self.signing_keys(&provider_uri).await?;

        // AAD tokens carry the provider URI verbatim as their issuer
        let expected = ExpectedClaims { issuer: Some(provider_uri), audience: None };
        let claims = TokenValidator::new(keys, self.token_config.clone())
            .validate_and_decode(&input.credentials, &expected)
            .await?;

        let role = self
            .roles
            .by_login(&username, &input.account)
            .await?
            .ok_or_else(|| AuthenticationError::RoleNotFound(username.clone()))?;
        let restrictions = extract_resource_restrictions(
            &role.annotations,
            &input.authenticator_name,
            input.service_id.as_deref(),
        )?;
        Self::validate_restrictions(&restrictions)?;

        let identity = AzureIdentity::from_token(&claims)?;
        for restriction in restrictions.iter() {
            match identity.restriction_value(&restriction.name) {
                Some(actual) if actual == restriction.value => {},
                Some(_) => {
                    return Err(AuthenticationError::InvalidResourceRestrictions(
                        restriction.name.clone(),
                    ));
                },
                None => {
                    return Err(AuthenticationError::ResourceRestrictionNotFoundOrEmpty(
                        restriction.name.clone(),
                    ));
                },
            }
        }

        Ok(username)
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
        let provider_uri = self.provider_uri(&webservice).await?;
        self.signing_keys(&provider_uri).await?.fetch(true).await?;
        Ok(())
    }
}
