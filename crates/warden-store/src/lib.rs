//! # Warden Store
//!
//! Narrow read interfaces into the platform's persistence layer.
//!
//! The authentication engine never talks to a database directly: roles,
//! resources and secrets live in an external policy store and are reached
//! through the traits in this crate. Production wires these to the real
//! store; tests use [`MemoryStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// In-memory store backend for tests and development
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use ipnet::IpNet;
use thiserror::Error;

pub use memory::MemoryStore;

/// Storage access errors.
///
/// `Connection` and `Timeout` are transient: the store may recover and the
/// caller may fall back to cached data. The remaining variants are
/// definitive responses.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend connection failure
    #[error("store connection error: {0}")]
    Connection(String),

    /// Backend call timed out
    #[error("store timeout")]
    Timeout,

    /// A resource that must carry a secret has none
    #[error("missing value for resource: {0}")]
    RequiredSecretMissing(String),

    /// Any other backend failure
    #[error("store internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the error indicates a temporarily unavailable backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Timeout)
    }
}

/// A name/value annotation attached to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Annotation name, e.g. `authn-azure/subscription-id`
    pub name: String,
    /// Annotation value
    pub value: String,
}

impl Annotation {
    /// Creates an annotation.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// A role as seen by the authentication engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Fully qualified role id, e.g. `acme:host:myapp/workload-1`
    pub id: String,
    /// Role annotations, in policy order
    pub annotations: Vec<Annotation>,
    /// CIDR list the role may authenticate from; empty means unrestricted
    pub restricted_to: Vec<String>,
}

impl Role {
    /// Creates an unrestricted role with no annotations.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), annotations: Vec::new(), restricted_to: Vec::new() }
    }

    /// Whether the given client IP satisfies the role's network
    /// restrictions. Roles without restrictions accept any origin.
    pub fn valid_origin(&self, client_ip: &str) -> bool {
        if self.restricted_to.is_empty() {
            return true;
        }
        let Ok(ip) = client_ip.parse::<std::net::IpAddr>() else {
            return false;
        };
        self.restricted_to.iter().any(|cidr| {
            cidr.parse::<IpNet>().map(|net| net.contains(&ip)).unwrap_or_else(|_| {
                // Plain addresses are allowed alongside CIDR ranges
                cidr.parse::<std::net::IpAddr>().map(|allowed| allowed == ip).unwrap_or(false)
            })
        })
    }
}

/// A resource record; existence is what the engine mostly cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Fully qualified resource id, e.g. `acme:webservice:conjur/authn-jwt/raw`
    pub id: String,
}

impl Resource {
    /// Creates a resource record.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Read access to roles and their privileges.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Resolves a role by login name within an account, e.g.
    /// `host/myapp/workload-1` in `acme`.
    async fn by_login(&self, login: &str, account: &str) -> Result<Option<Role>, StoreError>;

    /// Fetches a role by fully qualified id.
    async fn get(&self, role_id: &str) -> Result<Option<Role>, StoreError>;

    /// Whether the role holds the given privilege on the resource.
    async fn allowed_to(
        &self,
        role_id: &str,
        privilege: &str,
        resource_id: &str,
    ) -> Result<bool, StoreError>;

    /// The role's API key, when one is assigned.
    async fn api_key(&self, role_id: &str) -> Result<Option<String>, StoreError>;
}

/// Read access to resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetches a resource by fully qualified id.
    async fn get(&self, resource_id: &str) -> Result<Option<Resource>, StoreError>;
}

/// Read access to secrets stored on variable resources.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the current value of a single variable, if set.
    async fn secret(&self, resource_id: &str) -> Result<Option<String>, StoreError>;

    /// Fetches all listed secrets, failing with
    /// [`StoreError::RequiredSecretMissing`] for the first id without a
    /// value.
    async fn fetch_required_secrets(
        &self,
        resource_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let mut secrets = HashMap::with_capacity(resource_ids.len());
        for resource_id in resource_ids {
            match self.secret(resource_id).await? {
                Some(value) => {
                    secrets.insert(resource_id.clone(), value);
                },
                None => return Err(StoreError::RequiredSecretMissing(resource_id.clone())),
            }
        }
        Ok(secrets)
    }
}

/// Convert a role login (`host/path` or plain user name) into a fully
/// qualified role id within an account.
pub fn role_id_from_login(account: &str, login: &str) -> String {
    match login.strip_prefix("host/") {
        Some(host_path) => format!("{account}:host:{host_path}"),
        None => format!("{account}:user:{login}"),
    }
}
