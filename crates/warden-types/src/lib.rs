//! # Warden Types
//!
//! Shared value types for the Warden authentication engine.
//!
//! Everything in this crate is an immutable value: pipeline stages never
//! mutate a shared input in place. Where a stage learns new information
//! (for example the username decoded from credentials), it produces an
//! updated copy via a `with_*` method.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Inbound authentication request values
pub mod input;
/// Resource restrictions extracted from role annotations
pub mod restrictions;
/// Webservice identity of an authenticator endpoint
pub mod webservice;

pub use input::{AuthenticatorInput, LoginResponse};
pub use restrictions::{ResourceRestriction, ResourceRestrictions};
pub use webservice::{Webservice, Webservices};

/// A single claim entry in the claims-to-validate list assembled by the
/// validate-and-decode engine.
///
/// `value` is the expected value for claims that are checked against a
/// configured reference (for example `iss`). Claims that only need a
/// structural check (`exp`, `nbf`, `iat`) carry no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtClaim {
    /// Claim name as it appears in the token payload
    pub name: String,
    /// Expected value, when the claim is validated against one
    pub value: Option<String>,
}

impl JwtClaim {
    /// Creates a claim entry that only needs a structural check.
    pub fn bare(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }

    /// Creates a claim entry validated against an expected value.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_claim_constructors() {
        let bare = JwtClaim::bare("exp");
        assert_eq!(bare.name, "exp");
        assert!(bare.value.is_none());

        let valued = JwtClaim::with_value("iss", "https://issuer.example.com");
        assert_eq!(valued.value.as_deref(), Some("https://issuer.example.com"));
    }
}
