//! Role, permission and ownership resolution.

use std::sync::Arc;

use common::{AddressId, OrderId, PaymentId, TxId, UserId};
use store::{Store, User};

use super::cache::{PermissionCache, RoleGrants};
use super::resources;
use crate::error::{DomainError, Result};

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
        }
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Decides whether a user may perform an action on a resource.
///
/// Absent permission is a deny, never an error. Only store failures are
/// returned as `Err`.
pub struct AuthorizationResolver {
    store: Arc<dyn Store>,
    cache: PermissionCache,
}

impl AuthorizationResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: PermissionCache::new(),
        }
    }

    /// Returns the permission cache, for invalidation after role or
    /// permission mutations.
    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Loads the user if it exists and is active.
    async fn active_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .filter(|user| user.is_active))
    }

    async fn grants_for(&self, user: &User) -> Result<Option<Arc<RoleGrants>>> {
        if let Some(grants) = self.cache.get(user.role_id) {
            return Ok(Some(grants));
        }
        let generation = self.cache.generation();
        if self.store.get_role(user.role_id).await?.is_none() {
            return Ok(None);
        }

        let permissions = self.store.get_role_permissions(user.role_id).await?;
        let grants = RoleGrants::from_permissions(permissions);
        tracing::debug!(role_id = %user.role_id, permissions = grants.len(), "role permissions loaded");
        Ok(Some(self.cache.insert_if_current(user.role_id, grants, generation)))
    }

    async fn user_allows(&self, user_id: UserId, resource: &str, action: &str) -> Result<bool> {
        let Some(user) = self.active_user(user_id).await? else {
            return Ok(false);
        };
        Ok(self
            .grants_for(&user)
            .await?
            .is_some_and(|grants| grants.allows(resource, action)))
    }

    /// Checks `{resource}.{action}` for the user's role.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, user_id: UserId, resource: &str, action: &str) -> Result<Decision> {
        let decision = Decision::from_bool(self.user_allows(user_id, resource, action).await?);
        metrics::counter!("authz_decisions_total", "decision" => decision.as_str()).increment(1);
        Ok(decision)
    }

    /// Like [`check`](Self::check), but also allows holders of
    /// `{resource}.{action}_own` who own `resource_id`.
    #[tracing::instrument(skip(self))]
    pub async fn check_or_own(
        &self,
        user_id: UserId,
        resource: &str,
        action: &str,
        resource_id: &str,
    ) -> Result<Decision> {
        let allowed = self.user_allows(user_id, resource, action).await?
            || (self
                .user_allows(user_id, resource, &format!("{action}_own"))
                .await?
                && self.is_owner(user_id, resource, resource_id).await?);

        let decision = Decision::from_bool(allowed);
        metrics::counter!("authz_decisions_total", "decision" => decision.as_str()).increment(1);
        Ok(decision)
    }

    /// Returns `Forbidden` unless [`check`](Self::check) allows.
    pub async fn require(&self, user_id: UserId, resource: &str, action: &str) -> Result<()> {
        if self.check(user_id, resource, action).await?.is_allowed() {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!(
                "user {user_id} lacks {resource}.{action}"
            )))
        }
    }

    /// Returns `Forbidden` unless [`check_or_own`](Self::check_or_own) allows.
    pub async fn require_or_own(
        &self,
        user_id: UserId,
        resource: &str,
        action: &str,
        resource_id: &str,
    ) -> Result<()> {
        if self
            .check_or_own(user_id, resource, action, resource_id)
            .await?
            .is_allowed()
        {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!(
                "user {user_id} may not {action} {resource}/{resource_id}"
            )))
        }
    }

    /// Returns true if `user_id` owns the record. Unparseable ids, missing
    /// records and unknown resources are not owned.
    pub async fn is_owner(&self, user_id: UserId, resource: &str, resource_id: &str) -> Result<bool> {
        let owner = match resource {
            resources::ORDERS => match resource_id.parse::<OrderId>() {
                Ok(id) => self.store.order_owner(&id).await?,
                Err(_) => None,
            },
            resources::TRANSACTIONS => match resource_id.parse::<TxId>() {
                Ok(id) => self.store.transaction_owner(&id).await?,
                Err(_) => None,
            },
            resources::ADDRESSES => match resource_id.parse::<AddressId>() {
                Ok(id) => self.store.address_owner(id).await?,
                Err(_) => None,
            },
            resources::PAYMENTS => match resource_id.parse::<PaymentId>() {
                Ok(id) => self.store.payment_owner(id).await?,
                Err(_) => None,
            },
            _ => None,
        };
        Ok(owner == Some(user_id))
    }

    /// Returns true if the user's role is named `role_name`.
    pub async fn has_role(&self, user_id: UserId, role_name: &str) -> Result<bool> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_role(user.role_id)
            .await?
            .is_some_and(|role| role.name == role_name))
    }

    /// Returns true if the manager's role level is strictly above the
    /// target's.
    pub async fn can_manage_user(&self, manager_id: UserId, target_id: UserId) -> Result<bool> {
        let (manager, target) = tokio::try_join!(
            self.role_level(manager_id),
            self.role_level(target_id)
        )?;
        Ok(matches!((manager, target), (Some(m), Some(t)) if m > t))
    }

    async fn role_level(&self, user_id: UserId) -> Result<Option<i32>> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(None);
        };
        Ok(self.store.get_role(user.role_id).await?.map(|role| role.level))
    }
}
