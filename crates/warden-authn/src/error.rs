use thiserror::Error;
use warden_store::StoreError;

/// Coarse error categories for callers that branch on failure class
/// without matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authenticator, webservice, account or role unknown
    NotFound,
    /// Policy denies use of the authenticator
    NotWhitelisted,
    /// Role lacks the needed privilege or origin
    NotAuthorized,
    /// Signature, claim or restriction mismatch
    InvalidCredentials,
    /// Authenticator misconfigured in policy
    ConfigurationError,
    /// Identity provider unreachable or misbehaving
    UpstreamError,
    /// Unparsable claim lists, aliases or audiences
    MalformedInput,
}

/// Authentication and authorization errors.
///
/// Every failure path in the engine maps to a distinct named variant so
/// the HTTP layer can branch on [`AuthenticationError::kind`] without
/// string matching.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    // ========== Authenticator resolution and security checks ==========
    /// No registered authenticator under the requested name
    #[error("'{0}' is not a supported authenticator")]
    AuthenticatorNotFound(String),

    /// Account unknown to the platform
    #[error("account '{0}' is not defined")]
    AccountNotDefined(String),

    /// The authenticator webservice has no resource in policy
    #[error("webservice '{0}' not found")]
    ServiceNotDefined(String),

    /// The webservice is not in the enabled-authenticators list
    #[error("'{0}' is not enabled")]
    AuthenticatorNotWhitelisted(String),

    /// Requesting role unknown
    #[error("role '{0}' not found")]
    RoleNotFound(String),

    /// Role lacks a privilege on the webservice resource
    #[error("'{role}' does not have '{privilege}' privilege on {resource}")]
    RoleNotAuthorizedOnResource {
        /// Requesting role id
        role: String,
        /// Privilege that was required
        privilege: String,
        /// Webservice resource id
        resource: String,
    },

    /// Role may not authenticate from the observed client IP
    #[error("invalid origin")]
    InvalidOrigin,

    /// Presented credentials failed validation
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The adapter does not expose a status capability
    #[error("status check not supported for authenticator '{0}'")]
    StatusNotImplemented(String),

    // ========== Constraint engine ==========
    /// Required restrictions absent from the role's annotations
    #[error("role does not have the required constraints: {0:?}")]
    RoleMissingConstraints(Vec<String>),

    /// A restriction name outside the authenticator's permitted set
    #[error("'{name}' is not a supported resource restriction; supported: {permitted:?}")]
    ConstraintNotSupported {
        /// Offending restriction name
        name: String,
        /// Restriction names the authenticator permits
        permitted: Vec<String>,
    },

    /// Mutually exclusive restrictions supplied together, or a
    /// required-exclusive group not satisfied by exactly one member
    #[error("resource restrictions include an illegal combination of constraints: {0:?}")]
    IllegalConstraintCombinations(Vec<String>),

    /// None of an any-of group is present
    #[error("role must have at least one of the following constraints: {0:?}")]
    RoleMissingRequiredConstraints(Vec<String>),

    /// Restrictions from the non-permitted set are present
    #[error("non-permitted restrictions given: {0:?}")]
    NonPermittedRestrictionGiven(Vec<String>),

    /// The role carries no restrictions at all
    #[error("role must have at least one relevant annotation")]
    RoleMissingAnyRestrictions,

    // ========== Claim input validation ==========
    /// Empty claim name
    #[error("failed to validate claim: claim name is missing")]
    MissingClaimName,

    /// Claim name violates the accepted grammar
    #[error("failed to validate claim: claim name '{0}' does not match allowed format")]
    ForbiddenClaimName(String),

    /// Claim name collides with a reserved standard claim
    #[error("failed to validate claim: claim name '{0}' is in denylist")]
    ClaimNameInDenyList(String),

    /// Mandatory-claims variable empty
    #[error("failed to parse mandatory claims: input is missing or empty")]
    MandatoryClaimsMissingInput,

    /// Mandatory-claims list malformed (stray or doubled delimiters)
    #[error("mandatory claims value '{0}' is in invalid format")]
    InvalidMandatoryClaimsFormat(String),

    /// Repeated entry in the mandatory-claims list
    #[error("mandatory claims value contains duplication: '{0}'")]
    MandatoryClaimsDuplication(String),

    /// Claim-aliases variable empty
    #[error("failed to parse claim aliases: input is missing or empty")]
    ClaimAliasesMissingInput,

    /// Claim-aliases list contains a blank entry or trailing delimiter
    #[error("claim aliases value '{0}' contains a blank or empty entry")]
    ClaimAliasesBlankOrEmpty(String),

    /// An alias tuple is not exactly `annotation:claim`
    #[error("claim alias tuple '{0}' is in invalid format")]
    ClaimAliasInvalidFormat(String),

    /// A tuple side failed claim-name validation
    #[error("claim alias tuple '{tuple}' has an invalid claim name: {cause}")]
    ClaimAliasInvalidClaimFormat {
        /// Offending tuple as written
        tuple: String,
        /// Underlying claim-name validation failure
        cause: String,
    },

    /// The same annotation name or claim name appears twice
    #[error("claim alias duplication in {side} '{name}'")]
    ClaimAliasDuplication {
        /// `"annotation name"` or `"claim name"`
        side: &'static str,
        /// Duplicated entry
        name: String,
    },

    // ========== Token validation ==========
    /// No token supplied in the request
    #[error("token is missing or empty")]
    MissingToken,

    /// Token could not be decoded at all
    #[error("failed to decode token: {0}")]
    TokenDecodeFailed(String),

    /// Token decoded but failed verification
    #[error("failed to verify token: {0}")]
    TokenVerificationFailed(String),

    /// exp claim in the past
    #[error("token expired")]
    TokenExpired,

    /// nbf claim in the future
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// iat claim older than the configured maximum age
    #[error("token too old")]
    TokenTooOld,

    /// A claim on the claims-to-validate list is absent from the token
    #[error("mandatory claim '{0}' is missing from token")]
    MissingMandatoryClaim(String),

    /// A claim referenced by configuration is absent or empty
    #[error("claim '{0}' not found or empty in token")]
    TokenClaimNotFoundOrEmpty(String),

    /// Signing algorithm rejected
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A JWKS entry could not be turned into a decoding key
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    // ========== Resource restrictions ==========
    /// A restriction's value does not match the decoded token
    #[error("resource restriction '{0}' does not match the token")]
    InvalidResourceRestrictions(String),

    /// An annotation exists but its value is empty
    #[error("resource restriction '{0}' value is missing or empty")]
    MissingResourceRestrictionsValue(String),

    /// A permitted restriction references a claim absent from the token
    #[error("resource restriction '{0}' was not found in any token claim")]
    ResourceRestrictionNotFoundOrEmpty(String),

    // ========== Authenticator configuration ==========
    /// `issuer`, `provider-uri` and `jwks-uri` variables configured in an
    /// unsupported combination (need `issuer`, or exactly one of the URIs)
    #[error(
        "invalid issuer configuration: set 'issuer', or exactly one of 'provider-uri'/'jwks-uri'"
    )]
    InvalidIssuerConfiguration,

    /// jwks-uri has no extractable hostname
    #[error("failed to parse hostname from URI '{0}'")]
    FailedToParseHostnameFromUri(String),

    /// A configured URI is not parsable at all
    #[error("invalid URI format '{uri}': {cause}")]
    InvalidUriFormat {
        /// URI as configured
        uri: String,
        /// Parser failure
        cause: String,
    },

    /// A variable the authenticator requires carries no secret
    #[error("missing value for resource: {0}")]
    RequiredSecretMissing(String),

    /// Neither the request URL nor the authenticator's configuration
    /// names an identity source
    #[error("authenticator is not configured with an identity source")]
    IdentityMisconfigured,

    // ========== Identity providers (remote) ==========
    /// Provider discovery timed out
    #[error("failed to discover identity provider with timeout error (URI: '{uri}'): {cause}")]
    ProviderDiscoveryTimeout {
        /// Provider URI
        uri: String,
        /// Underlying cause
        cause: String,
    },

    /// Provider discovery failed for a non-timeout reason
    #[error("failed to discover identity provider (URI: '{uri}'): {cause}")]
    ProviderDiscoveryFailed {
        /// Provider URI
        uri: String,
        /// Underlying cause
        cause: String,
    },

    /// TLS/certificate failure while fetching from the provider
    #[error("failed to fetch certificate from provider (URI: '{uri}'): {cause}")]
    ProviderFetchCertificateFailed {
        /// Provider URI
        uri: String,
        /// Underlying cause
        cause: String,
    },

    /// Key set fetch failed after successful discovery
    #[error("failed to fetch keys from identity provider (URI: '{uri}'): {cause}")]
    FetchProviderKeysFailed {
        /// Provider URI
        uri: String,
        /// Underlying cause
        cause: String,
    },

    /// OIDC code-for-token exchange failed
    #[error("failed to exchange authorization code (URI: '{uri}'): {cause}")]
    ProviderTokenExchangeFailed {
        /// Token endpoint URI
        uri: String,
        /// Underlying cause
        cause: String,
    },

    /// The policy store itself is unavailable
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // ========== Protocol-specific ==========
    /// xms_mirid is missing one of its required path fields
    #[error("required fields {fields:?} are missing in xms_mirid '{mirid}'")]
    MissingRequiredFieldsInXmsMirid {
        /// Missing field names
        fields: Vec<String>,
        /// Claim value as received
        mirid: String,
    },

    /// xms_mirid providers section is not namespace/type/name
    #[error("provider fields are in invalid format in xms_mirid '{0}'")]
    InvalidProviderFieldsInXmsMirid(String),

    /// GCE audience claim not in `conjur/<account>/<host>` form
    #[error("'audience' token claim '{0}' is invalid; expected 'conjur/<account>/<host-id>'")]
    InvalidAudience(String),

    /// OIDC id-token claim configured as the identity source is absent
    #[error("claim '{0}' not found or empty in id token")]
    IdTokenClaimNotFoundOrEmpty(String),

    /// Token factory failed to mint an access token
    #[error("failed to issue access token: {0}")]
    TokenIssuanceFailed(String),
}

impl AuthenticationError {
    /// The coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        use AuthenticationError::*;
        match self {
            AuthenticatorNotFound(_) | AccountNotDefined(_) | ServiceNotDefined(_)
            | RoleNotFound(_) => ErrorKind::NotFound,
            AuthenticatorNotWhitelisted(_) => ErrorKind::NotWhitelisted,
            RoleNotAuthorizedOnResource { .. } | InvalidOrigin | StatusNotImplemented(_) => {
                ErrorKind::NotAuthorized
            },
            InvalidCredentials
            | RoleMissingConstraints(_)
            | ConstraintNotSupported { .. }
            | IllegalConstraintCombinations(_)
            | RoleMissingRequiredConstraints(_)
            | NonPermittedRestrictionGiven(_)
            | RoleMissingAnyRestrictions
            | MissingToken
            | TokenDecodeFailed(_)
            | TokenVerificationFailed(_)
            | TokenExpired
            | TokenNotYetValid
            | TokenTooOld
            | MissingMandatoryClaim(_)
            | TokenClaimNotFoundOrEmpty(_)
            | UnsupportedAlgorithm(_)
            | InvalidSigningKey(_)
            | InvalidResourceRestrictions(_)
            | MissingResourceRestrictionsValue(_)
            | ResourceRestrictionNotFoundOrEmpty(_)
            | IdTokenClaimNotFoundOrEmpty(_) => ErrorKind::InvalidCredentials,
            InvalidIssuerConfiguration
            | FailedToParseHostnameFromUri(_)
            | InvalidUriFormat { .. }
            | RequiredSecretMissing(_)
            | IdentityMisconfigured
            | TokenIssuanceFailed(_) => ErrorKind::ConfigurationError,
            ProviderDiscoveryTimeout { .. }
            | ProviderDiscoveryFailed { .. }
            | ProviderFetchCertificateFailed { .. }
            | FetchProviderKeysFailed { .. }
            | ProviderTokenExchangeFailed { .. }
            | StoreUnavailable(_) => ErrorKind::UpstreamError,
            MissingClaimName
            | ForbiddenClaimName(_)
            | ClaimNameInDenyList(_)
            | MandatoryClaimsMissingInput
            | InvalidMandatoryClaimsFormat(_)
            | MandatoryClaimsDuplication(_)
            | ClaimAliasesMissingInput
            | ClaimAliasesBlankOrEmpty(_)
            | ClaimAliasInvalidFormat(_)
            | ClaimAliasInvalidClaimFormat { .. }
            | ClaimAliasDuplication { .. }
            | MissingRequiredFieldsInXmsMirid { .. }
            | InvalidProviderFieldsInXmsMirid(_)
            | InvalidAudience(_) => ErrorKind::MalformedInput,
        }
    }
}

impl From<StoreError> for AuthenticationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RequiredSecretMissing(id) => AuthenticationError::RequiredSecretMissing(id),
            other => AuthenticationError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthenticationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtKind;

        match err.kind() {
            JwtKind::InvalidToken | JwtKind::Base64(_) | JwtKind::Json(_) | JwtKind::Utf8(_) => {
                AuthenticationError::TokenDecodeFailed(err.to_string())
            },
            JwtKind::ExpiredSignature => AuthenticationError::TokenExpired,
            JwtKind::ImmatureSignature => AuthenticationError::TokenNotYetValid,
            JwtKind::MissingRequiredClaim(claim) => {
                AuthenticationError::MissingMandatoryClaim(claim.clone())
            },
            JwtKind::InvalidAlgorithm | JwtKind::InvalidAlgorithmName => {
                AuthenticationError::UnsupportedAlgorithm(err.to_string())
            },
            _ => AuthenticationError::TokenVerificationFailed(err.to_string()),
        }
    }
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthenticationError>;
