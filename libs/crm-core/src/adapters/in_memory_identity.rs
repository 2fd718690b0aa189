use crate::domain::identity::{IdentityUser, IdentityUserPatch, NewIdentityUser};
use crate::{CoreError, CoreResult, IdentityDirectory, TenantId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory implementation of the IdentityDirectory port. Logins are unique
/// per tenant, as are external references.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityDirectory {
    users: Arc<DashMap<(String, Uuid), IdentityUser>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user directly, bypassing uniqueness checks.
    pub fn seed(&self, tenant: &TenantId, user: IdentityUser) {
        self.users.insert((tenant.to_string(), user.id), user);
    }

    pub fn count(&self, tenant: &TenantId) -> usize {
        self.users
            .iter()
            .filter(|entry| entry.key().0 == tenant.as_str())
            .count()
    }

    fn tenant_users(&self, tenant: &TenantId) -> Vec<IdentityUser> {
        self.users
            .iter()
            .filter(|entry| entry.key().0 == tenant.as_str())
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn ensure_unique(
        &self,
        tenant: &TenantId,
        except: Option<Uuid>,
        login: Option<&str>,
        external_ref: Option<&str>,
    ) -> CoreResult<()> {
        for user in self.tenant_users(tenant) {
            if Some(user.id) == except {
                continue;
            }
            if login.is_some_and(|login| user.login == login) {
                return Err(CoreError::AlreadyExists(format!("user with login {}", user.login)));
            }
            if external_ref.is_some() && user.external_ref.as_deref() == external_ref {
                return Err(CoreError::AlreadyExists(format!(
                    "user with external reference {}",
                    external_ref.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn get(&self, tenant: &TenantId, id: Uuid) -> CoreResult<IdentityUser> {
        self.users
            .get(&(tenant.to_string(), id))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
    }

    async fn get_many(
        &self,
        tenant: &TenantId,
        ids: &[Uuid],
    ) -> CoreResult<HashMap<Uuid, IdentityUser>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.users
                    .get(&(tenant.to_string(), *id))
                    .map(|entry| (*id, entry.value().clone()))
            })
            .collect())
    }

    async fn find_by_external_ref(
        &self,
        tenant: &TenantId,
        external_ref: &str,
    ) -> CoreResult<Option<IdentityUser>> {
        Ok(self
            .tenant_users(tenant)
            .into_iter()
            .find(|user| user.external_ref.as_deref() == Some(external_ref)))
    }

    async fn create(&self, tenant: &TenantId, user: NewIdentityUser) -> CoreResult<IdentityUser> {
        if user.login.trim().is_empty() {
            return Err(CoreError::invalid_input("login", "must not be empty"));
        }
        self.ensure_unique(tenant, None, Some(&user.login), user.external_ref.as_deref())?;
        let created = IdentityUser {
            id: Uuid::new_v4(),
            login: user.login,
            email: user.email,
            display_name: user.display_name,
            avatar_url: None,
            external_ref: user.external_ref,
        };
        self.users
            .insert((tenant.to_string(), created.id), created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        patch: IdentityUserPatch,
    ) -> CoreResult<IdentityUser> {
        self.ensure_unique(tenant, Some(id), patch.login.as_deref(), None)?;
        let mut entry = self
            .users
            .get_mut(&(tenant.to_string(), id))
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))?;
        let user = entry.value_mut();
        if let Some(login) = patch.login {
            user.login = login;
        }
        if let Some(email) = patch.email {
            user.email = Some(email);
        }
        if let Some(display_name) = patch.display_name {
            user.display_name = display_name;
        }
        Ok(user.clone())
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> CoreResult<()> {
        self.users
            .remove(&(tenant.to_string(), id))
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
    }
}
