//! Extracting resource restrictions from role annotations and matching
//! them against decoded tokens.
//!
//! Restrictions come from annotations under the authenticator's prefix.
//! A general annotation `authn-x/name` applies to every instance of the
//! authenticator; a service-scoped one `authn-x/{service-id}/name` applies
//! to that instance only and overrides the general value for the same
//! restriction name.

use serde_json::Value;
use warden_store::Annotation;
use warden_types::{ResourceRestriction, ResourceRestrictions};

use crate::{
    error::{AuthenticationError, Result},
    validate_decode::DecodedToken,
};

/// Collects the resource restrictions a role declares for an
/// authenticator instance.
///
/// Annotation order is preserved. An annotation with an empty value is a
/// policy mistake and fails with
/// [`AuthenticationError::MissingResourceRestrictionsValue`].
pub fn extract_resource_restrictions(
    annotations: &[Annotation],
    authenticator_name: &str,
    service_id: Option<&str>,
) -> Result<ResourceRestrictions> {
    let general_prefix = format!("{authenticator_name}/");
    let service_prefix = service_id.map(|sid| format!("{authenticator_name}/{sid}/"));

    let mut restrictions: Vec<ResourceRestriction> = Vec::new();
    let mut add = |name: &str, value: &str, service_scoped: bool| -> Result<()> {
        if value.is_empty() {
            return Err(AuthenticationError::MissingResourceRestrictionsValue(name.to_string()));
        }
        match restrictions.iter_mut().find(|r| r.name == name) {
            // Service-scoped values win over general ones
            Some(existing) if service_scoped => existing.value = value.to_string(),
            Some(_) => {},
            None => restrictions.push(ResourceRestriction::new(name, value)),
        }
        Ok(())
    };

    for annotation in annotations {
        if let Some(prefix) = &service_prefix {
            if let Some(name) = annotation.name.strip_prefix(prefix.as_str()) {
                add(name, &annotation.value, true)?;
                continue;
            }
        }
        if let Some(name) = annotation.name.strip_prefix(general_prefix.as_str()) {
            // General annotations are same-level only; a deeper path is a
            // service-scoped annotation for some other instance
            if !name.contains('/') {
                add(name, &annotation.value, false)?;
            }
        }
    }

    Ok(restrictions.into_iter().collect())
}

/// Looks up a possibly nested claim by a `/`-separated path.
pub fn claim_value<'a>(token: &'a DecodedToken, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('/');
    let mut current = token.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Renders a claim value for restriction comparison. Objects and arrays
/// have no string form and never match.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Checks each restriction against a resolver from restriction name to
/// observed value, requiring exact equality.
///
/// A restriction the resolver cannot answer fails with
/// [`AuthenticationError::ResourceRestrictionNotFoundOrEmpty`]; a value
/// mismatch fails with [`AuthenticationError::InvalidResourceRestrictions`].
pub fn validate_one_to_one<F>(restrictions: &ResourceRestrictions, resolve: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for restriction in restrictions.iter() {
        match resolve(&restriction.name) {
            None => {
                return Err(AuthenticationError::ResourceRestrictionNotFoundOrEmpty(
                    restriction.name.clone(),
                ));
            },
            Some(actual) if actual == restriction.value => {},
            Some(_) => {
                return Err(AuthenticationError::InvalidResourceRestrictions(
                    restriction.name.clone(),
                ));
            },
        }
    }
    Ok(())
}
