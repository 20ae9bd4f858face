//! Validation of operator-supplied claim configuration.
//!
//! JWT authenticators are configured through policy variables holding
//! claim lists (`enforced-claims`) and an alias mapping DSL
//! (`claim-aliases`). These values come from humans; everything here is
//! strict, fails fast, and never partially succeeds.

use crate::error::{AuthenticationError, Result};

/// Standard claims that may never be used as restrictions or aliases.
///
/// These are consumed by token validation itself; letting policy bind
/// them to identities would bypass the verification rules.
pub const CLAIMS_DENY_LIST: &[&str] = &["exp", "nbf", "iat", "jti", "aud", "iss"];

const LIST_DELIMITER: char = ',';
const TUPLE_DELIMITER: char = ':';

/// Validates a claim name against the accepted grammar and an optional
/// deny list.
///
/// The grammar accepts a leading letter, `_` or `$`, and interior
/// letters, digits, `_`, `$`, `/`, `|` and `.`. Anything else is
/// rejected, including whitespace and a leading digit or dot.
pub fn validate_claim_name(claim_name: &str, deny_list: Option<&[&str]>) -> Result<()> {
    let mut chars = claim_name.chars();
    let Some(first) = chars.next() else {
        return Err(AuthenticationError::MissingClaimName);
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return Err(AuthenticationError::ForbiddenClaimName(claim_name.to_string()));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | '|' | '.')) {
        return Err(AuthenticationError::ForbiddenClaimName(claim_name.to_string()));
    }

    if let Some(deny_list) = deny_list {
        if deny_list.contains(&claim_name) {
            return Err(AuthenticationError::ClaimNameInDenyList(claim_name.to_string()));
        }
    }

    Ok(())
}

/// Parses the comma-separated mandatory-claims list.
///
/// Whitespace around entries is trimmed. Leading, trailing or doubled
/// commas are malformed input rather than empty entries, and repeated
/// claims are rejected. Returns the claim names in declaration order.
pub fn parse_mandatory_claims(csv: &str) -> Result<Vec<String>> {
    if csv.trim().is_empty() {
        return Err(AuthenticationError::MandatoryClaimsMissingInput);
    }

    let entries: Vec<String> =
        csv.split(LIST_DELIMITER).map(|entry| entry.trim().to_string()).collect();
    if entries.iter().any(String::is_empty) {
        return Err(AuthenticationError::InvalidMandatoryClaimsFormat(csv.to_string()));
    }

    let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
    for entry in &entries {
        if seen.contains(&entry.as_str()) {
            return Err(AuthenticationError::MandatoryClaimsDuplication(entry.clone()));
        }
        validate_claim_name(entry, Some(CLAIMS_DENY_LIST))?;
        seen.push(entry);
    }

    Ok(entries)
}

/// Parses the claim-aliases mapping DSL: `"annotation:claim,..."`.
///
/// Each tuple must be exactly `annotation_name:claim_name` with both
/// sides passing [`validate_claim_name`] (deny list included).
/// Duplication is checked independently on both sides so the error can
/// name which side repeated. Returns pairs in declaration order.
pub fn parse_claim_aliases(input: &str) -> Result<Vec<(String, String)>> {
    if input.trim().is_empty() {
        return Err(AuthenticationError::ClaimAliasesMissingInput);
    }
    // split ignores empty values at the end of the string, so a trailing
    // delimiter has to be caught before splitting
    if input.ends_with(LIST_DELIMITER) {
        return Err(AuthenticationError::ClaimAliasesBlankOrEmpty(input.to_string()));
    }

    let mut aliases: Vec<(String, String)> = Vec::new();
    for tuple in input.split(LIST_DELIMITER) {
        let tuple = tuple.trim();
        if tuple.is_empty() {
            return Err(AuthenticationError::ClaimAliasesBlankOrEmpty(input.to_string()));
        }

        let mut sides = tuple.split(TUPLE_DELIMITER);
        let (annotation_name, claim_name) = match (sides.next(), sides.next(), sides.next()) {
            (Some(annotation), Some(claim), None) => (annotation.trim(), claim.trim()),
            _ => return Err(AuthenticationError::ClaimAliasInvalidFormat(tuple.to_string())),
        };
        if annotation_name.is_empty() || claim_name.is_empty() {
            return Err(AuthenticationError::ClaimAliasInvalidFormat(tuple.to_string()));
        }

        for side in [annotation_name, claim_name] {
            validate_claim_name(side, Some(CLAIMS_DENY_LIST)).map_err(|cause| {
                AuthenticationError::ClaimAliasInvalidClaimFormat {
                    tuple: tuple.to_string(),
                    cause: cause.to_string(),
                }
            })?;
        }

        if aliases.iter().any(|(existing, _)| existing == annotation_name) {
            return Err(AuthenticationError::ClaimAliasDuplication {
                side: "annotation name",
                name: annotation_name.to_string(),
            });
        }
        if aliases.iter().any(|(_, existing)| existing == claim_name) {
            return Err(AuthenticationError::ClaimAliasDuplication {
                side: "claim name",
                name: claim_name.to_string(),
            });
        }

        aliases.push((annotation_name.to_string(), claim_name.to_string()));
    }

    Ok(aliases)
}
