//! Access to authenticator configuration variables.
//!
//! Each authenticator webservice owns a set of policy variables under
//! `conjur/{authenticator}[/{service-id}]/...` in its account. This module
//! maps variable names to fully qualified resource ids and reads their
//! values through the store traits.

use std::collections::HashMap;

use warden_store::{ResourceStore, SecretStore};
use warden_types::Webservice;

use crate::error::{AuthenticationError, Result};

/// Fully qualified variable resource id for an authenticator variable,
/// e.g. `acme:variable:conjur/authn-jwt/raw/jwks-uri`.
pub fn variable_id(webservice: &Webservice, variable_name: &str) -> String {
    format!("{}:variable:conjur/{}/{}", webservice.account, webservice.name(), variable_name)
}

/// Whether the authenticator variable exists as a resource, regardless of
/// whether it currently holds a value.
pub async fn variable_exists(
    resources: &dyn ResourceStore,
    webservice: &Webservice,
    variable_name: &str,
) -> Result<bool> {
    let resource_id = variable_id(webservice, variable_name);
    Ok(resources.get(&resource_id).await?.is_some())
}

/// Fetches required authenticator variables, keyed by variable name.
///
/// Fails with [`AuthenticationError::RequiredSecretMissing`] on the first
/// variable without a value.
pub async fn fetch_authenticator_secrets(
    secrets: &dyn SecretStore,
    webservice: &Webservice,
    variable_names: &[&str],
) -> Result<HashMap<String, String>> {
    let resource_ids: Vec<String> =
        variable_names.iter().map(|name| variable_id(webservice, name)).collect();
    let by_id = secrets.fetch_required_secrets(&resource_ids).await?;

    Ok(variable_names
        .iter()
        .zip(resource_ids)
        .filter_map(|(name, id)| by_id.get(&id).map(|value| (name.to_string(), value.clone())))
        .collect())
}

/// Fetches an optional authenticator variable.
///
/// A variable that is not defined in policy yields `None`. A variable that
/// is defined but holds no value is a misconfiguration and fails with
/// [`AuthenticationError::RequiredSecretMissing`].
pub async fn fetch_optional_secret(
    resources: &dyn ResourceStore,
    secrets: &dyn SecretStore,
    webservice: &Webservice,
    variable_name: &str,
) -> Result<Option<String>> {
    if !variable_exists(resources, webservice, variable_name).await? {
        return Ok(None);
    }
    let resource_id = variable_id(webservice, variable_name);
    match secrets.secret(&resource_id).await? {
        Some(value) => Ok(Some(value)),
        None => Err(AuthenticationError::RequiredSecretMissing(resource_id)),
    }
}
