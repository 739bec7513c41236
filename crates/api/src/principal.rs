//! Acting principal resolution.
//!
//! Authentication happens upstream; by the time a request reaches this
//! server the gateway has put the authenticated user id in a header. This
//! module turns that id into a [`Principal`] and rejects requests whose user
//! is unknown or deactivated.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{RoleId, UserId};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub is_active: bool,
}

/// Yields the acting principal of a request.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    /// Returns `None` when the request carries no recognizable principal.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Principal>, ApiError>;
}

/// Reads the user id from [`USER_ID_HEADER`] and loads the user.
pub struct HeaderPrincipalResolver {
    store: Arc<dyn Store>,
}

impl HeaderPrincipalResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PrincipalResolver for HeaderPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Principal>, ApiError> {
        let Some(raw) = headers.get(USER_ID_HEADER) else {
            return Ok(None);
        };
        let Some(user_id) = raw.to_str().ok().and_then(|s| s.trim().parse::<UserId>().ok())
        else {
            return Ok(None);
        };

        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(user.map(|u| Principal {
            user_id: u.id,
            role_id: u.role_id,
            is_active: u.is_active,
        }))
    }
}

/// Extractor for an active principal. Rejects with 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Principal);

impl Actor {
    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }
}

impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match state.principals.resolve(&parts.headers).await? {
            Some(principal) if principal.is_active => Ok(Actor(principal)),
            Some(principal) => Err(ApiError::Unauthenticated(format!(
                "user {} is inactive",
                principal.user_id
            ))),
            None => Err(ApiError::Unauthenticated(
                "missing or unknown principal".to_string(),
            )),
        }
    }
}
