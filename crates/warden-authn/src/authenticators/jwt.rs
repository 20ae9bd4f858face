//! The generic `authn-jwt` authenticator.
//!
//! Accepts a JWT from any identity provider the operator configures.
//! Key material comes from either a `jwks-uri` or an OIDC `provider-uri`
//! variable; the enforced issuer follows the precedence implemented in
//! [`resolve_issuer`]. Identity is taken from the request URL when
//! present, otherwise from the claim named by `token-app-property`,
//! optionally prefixed with `identity-path`. The role's restrictions are
//! matched one-to-one against token claims, with `claim-aliases` mapping
//! annotation names to claim paths and `enforced-claims` adding required
//! restrictions.

use std::sync::Arc;

use async_trait::async_trait;
use warden_config::{ProviderConfig, TokenConfig};
use warden_store::{ResourceStore, RoleStore, SecretStore};
use warden_types::{AuthenticatorInput, Webservice};

use crate::{
    authenticators::AuthenticatorAdapter,
    constraints::{
        Constraint, MultipleConstraint, NonPermittedConstraint, NotEmptyConstraint,
        RequiredConstraint,
    },
    error::{AuthenticationError, Result},
    input_validation::{CLAIMS_DENY_LIST, parse_claim_aliases, parse_mandatory_claims},
    restrictions::{
        claim_value, extract_resource_restrictions, validate_one_to_one, value_as_string,
    },
    secrets::fetch_optional_secret,
    signing_key::{CachedSigningKeys, KeyProviderFactory, SigningKeyCaches},
    validate_decode::{DecodedToken, ExpectedClaims, TokenValidator, resolve_issuer},
};

const ISSUER_VAR: &str = "issuer";
const PROVIDER_URI_VAR: &str = "provider-uri";
const JWKS_URI_VAR: &str = "jwks-uri";
const AUDIENCE_VAR: &str = "audience";
const TOKEN_APP_PROPERTY_VAR: &str = "token-app-property";
const IDENTITY_PATH_VAR: &str = "identity-path";
const ENFORCED_CLAIMS_VAR: &str = "enforced-claims";
const CLAIM_ALIASES_VAR: &str = "claim-aliases";

/// Vendor-neutral JWT authenticator.
pub struct JwtAuthenticator {
    roles: Arc<dyn RoleStore>,
    resources: Arc<dyn ResourceStore>,
    secrets: Arc<dyn SecretStore>,
    key_factory: Arc<dyn KeyProviderFactory>,
    key_caches: SigningKeyCaches,
    token_config: TokenConfig,
}

impl JwtAuthenticator {
    /// Creates the authenticator.
    pub fn new(
        roles: Arc<dyn RoleStore>,
        resources: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretStore>,
        key_factory: Arc<dyn KeyProviderFactory>,
        provider_config: &ProviderConfig,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            roles,
            resources,
            secrets,
            key_factory,
            key_caches: SigningKeyCaches::new(std::time::Duration::from_secs(
                provider_config.jwks_cache_ttl_secs,
            )),
            token_config,
        }
    }

    async fn variable(&self, webservice: &Webservice, name: &str) -> Result<Option<String>> {
        fetch_optional_secret(self.resources.as_ref(), self.secrets.as_ref(), webservice, name)
            .await
    }

    async fn signing_keys(
        &self,
        provider_uri: Option<&str>,
        jwks_uri: Option<&str>,
    ) -> Result<Arc<CachedSigningKeys>> {
        match (provider_uri, jwks_uri) {
            (Some(uri), None) => {
                self.key_caches
                    .get_or_create(uri, || self.key_factory.for_provider_uri(uri))
                    .await
            },
            (None, Some(uri)) => {
                self.key_caches.get_or_create(uri, || self.key_factory.for_jwks_uri(uri)).await
            },
            _ => Err(AuthenticationError::InvalidIssuerConfiguration),
        }
    }

    async fn decode_token(
        &self,
        webservice: &Webservice,
        token: &str,
    ) -> Result<DecodedToken> {
        let issuer_var = self.variable(webservice, ISSUER_VAR).await?;
        let provider_uri = self.variable(webservice, PROVIDER_URI_VAR).await?;
        let jwks_uri = self.variable(webservice, JWKS_URI_VAR).await?;
        let audience = self.variable(webservice, AUDIENCE_VAR).await?;

        let issuer =
            resolve_issuer(issuer_var.as_deref(), provider_uri.as_deref(), jwks_uri.as_deref())?;
        let keys = self.signing_keys(provider_uri.as_deref(), jwks_uri.as_deref()).await?;

        let expected = ExpectedClaims { issuer: Some(issuer), audience };
        TokenValidator::new(keys, self.token_config.clone())
            .validate_and_decode(token, &expected)
            .await
    }

    /// Identity from the claim named by `token-app-property`, prefixed
    /// with `identity-path` and the `host/` login namespace.
    async fn identity_from_token(
        &self,
        webservice: &Webservice,
        claims: &DecodedToken,
    ) -> Result<String> {
        let property = self
            .variable(webservice, TOKEN_APP_PROPERTY_VAR)
            .await?
            .ok_or(AuthenticationError::IdentityMisconfigured)?;
        let value = claim_value(claims, &property)
            .and_then(value_as_string)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthenticationError::TokenClaimNotFoundOrEmpty(property.clone()))?;

        let identity_path = self.variable(webservice, IDENTITY_PATH_VAR).await?;
        let login = match identity_path.as_deref().map(|p| p.trim_matches('/')) {
            Some(path) if !path.is_empty() => format!("host/{path}/{value}"),
            _ => format!("host/{value}"),
        };
        Ok(login)
    }

    async fn validate_restrictions(
        &self,
        webservice: &Webservice,
        input: &AuthenticatorInput,
        username: &str,
        claims: &DecodedToken,
    ) -> Result<()> {
        let role = self
            .roles
            .by_login(username, &input.account)
            .await?
            .ok_or_else(|| AuthenticationError::RoleNotFound(username.to_string()))?;
        let restrictions = extract_resource_restrictions(
            &role.annotations,
            &input.authenticator_name,
            input.service_id.as_deref(),
        )?;

        let enforced = match self.variable(webservice, ENFORCED_CLAIMS_VAR).await? {
            Some(csv) => parse_mandatory_claims(&csv)?,
            None => Vec::new(),
        };
        let aliases = match self.variable(webservice, CLAIM_ALIASES_VAR).await? {
            Some(raw) => parse_claim_aliases(&raw)?,
            None => Vec::new(),
        };

        // Enforced claims are claim names; the role must carry the
        // corresponding annotation, which is the alias when one exists
        let annotation_for = |claim: &str| {
            aliases
                .iter()
                .find(|(_, aliased)| aliased == claim)
                .map(|(annotation, _)| annotation.clone())
                .unwrap_or_else(|| claim.to_string())
        };
        let required: Vec<String> = enforced.iter().map(|claim| annotation_for(claim)).collect();

        // Reserved claims may never be restrictions, and neither may a
        // claim name that an alias supersedes
        let mut non_permitted: Vec<String> =
            CLAIMS_DENY_LIST.iter().map(|claim| claim.to_string()).collect();
        non_permitted.extend(aliases.iter().map(|(_, claim)| claim.clone()));

        let constraints = MultipleConstraint::new(vec![
            Box::new(NotEmptyConstraint),
            Box::new(RequiredConstraint::new(required)),
            Box::new(NonPermittedConstraint::new(non_permitted)),
        ]);
        constraints.validate(&restrictions.names())?;

        let claim_for = |annotation: &str| {
            aliases
                .iter()
                .find(|(name, _)| name == annotation)
                .map(|(_, claim)| claim.clone())
                .unwrap_or_else(|| annotation.to_string())
        };
        validate_one_to_one(&restrictions, |name| {
            claim_value(claims, &claim_for(name))
                .and_then(value_as_string)
                .filter(|v| !v.is_empty())
        })
    }
}

#[async_trait]
impl AuthenticatorAdapter for JwtAuthenticator {
    fn name(&self) -> &str {
        "authn-jwt"
    }

    async fn authenticate(&self, input: &AuthenticatorInput) -> Result<String> {
        let webservice = Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        );

        let claims = self.decode_token(&webservice, &input.credentials).await?;

        let username = match &input.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => self.identity_from_token(&webservice, &claims).await?,
        };

        self.validate_restrictions(&webservice, input, &username, &claims).await?;

        Ok(username)
    }

    fn supports_status(&self) -> bool {
        true
    }

    /// Status check: the issuer settings must resolve and the key source
    /// must serve a key set.
    async fn status(&self, input: &AuthenticatorInput) -> Result<()> {
        let webservice = Webservice::new(
            input.account.clone(),
            input.authenticator_name.clone(),
            input.service_id.clone(),
        );

        let issuer_var = self.variable(&webservice, ISSUER_VAR).await?;
        let provider_uri = self.variable(&webservice, PROVIDER_URI_VAR).await?;
        let jwks_uri = self.variable(&webservice, JWKS_URI_VAR).await?;

        resolve_issuer(issuer_var.as_deref(), provider_uri.as_deref(), jwks_uri.as_deref())?;
        let keys = self.signing_keys(provider_uri.as_deref(), jwks_uri.as_deref()).await?;
        keys.fetch(true).await?;

        Ok(())
    }
}
