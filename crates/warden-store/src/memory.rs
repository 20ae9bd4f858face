//! In-memory store backend for testing and development

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Annotation, Resource, ResourceStore, Role, RoleStore, SecretStore, StoreError};

#[derive(Default)]
struct Inner {
    /// Roles by fully qualified id
    roles: HashMap<String, Role>,
    /// API keys by role id
    api_keys: HashMap<String, String>,
    /// Resources by fully qualified id
    resources: HashMap<String, Resource>,
    /// Secrets by variable resource id
    secrets: HashMap<String, String>,
    /// Granted (role_id, privilege, resource_id) triples
    permissions: HashSet<(String, String, String)>,
}

/// In-memory implementation of all collaborator stores.
///
/// Backed by a single `RwLock`; suitable for tests and local development,
/// not for production load.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account by seeding its admin user role, which is how
    /// account existence is probed by the security pipeline.
    pub async fn add_account(&self, account: &str) {
        self.add_role(Role::new(format!("{account}:user:admin"))).await;
    }

    /// Inserts or replaces a role.
    pub async fn add_role(&self, role: Role) {
        self.inner.write().await.roles.insert(role.id.clone(), role);
    }

    /// Inserts a role with the given annotations.
    pub async fn add_role_with_annotations(
        &self,
        role_id: impl Into<String>,
        annotations: Vec<Annotation>,
    ) {
        let mut role = Role::new(role_id);
        role.annotations = annotations;
        self.add_role(role).await;
    }

    /// Assigns an API key to a role.
    pub async fn set_api_key(&self, role_id: impl Into<String>, api_key: impl Into<String>) {
        self.inner.write().await.api_keys.insert(role_id.into(), api_key.into());
    }

    /// Inserts or replaces a resource.
    pub async fn add_resource(&self, resource_id: impl Into<String>) {
        let resource = Resource::new(resource_id);
        self.inner.write().await.resources.insert(resource.id.clone(), resource);
    }

    /// Sets a variable's secret value, creating the resource if needed.
    pub async fn set_secret(&self, resource_id: impl Into<String>, value: impl Into<String>) {
        let resource_id = resource_id.into();
        let mut inner = self.inner.write().await;
        inner.resources.entry(resource_id.clone()).or_insert_with(|| Resource::new(&resource_id));
        inner.secrets.insert(resource_id, value.into());
    }

    /// Grants a privilege on a resource to a role.
    pub async fn permit(
        &self,
        role_id: impl Into<String>,
        privilege: impl Into<String>,
        resource_id: impl Into<String>,
    ) {
        self.inner
            .write()
            .await
            .permissions
            .insert((role_id.into(), privilege.into(), resource_id.into()));
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn by_login(&self, login: &str, account: &str) -> Result<Option<Role>, StoreError> {
        let role_id = crate::role_id_from_login(account, login);
        RoleStore::get(self, &role_id).await
    }

    async fn get(&self, role_id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.inner.read().await.roles.get(role_id).cloned())
    }

    async fn allowed_to(
        &self,
        role_id: &str,
        privilege: &str,
        resource_id: &str,
    ) -> Result<bool, StoreError> {
        let key = (role_id.to_string(), privilege.to_string(), resource_id.to_string());
        Ok(self.inner.read().await.permissions.contains(&key))
    }

    async fn api_key(&self, role_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.api_keys.get(role_id).cloned())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, resource_id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.inner.read().await.resources.get(resource_id).cloned())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn secret(&self, resource_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.secrets.get(resource_id).cloned())
    }
}
