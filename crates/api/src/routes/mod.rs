//! Route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod transactions;

use std::convert::Infallible;

use activity::Activity;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use common::UserId;

use crate::error::ApiError;

/// JSON body extractor whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Client details attached to activity log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Takes the first `X-Forwarded-For` hop and the `User-Agent` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_str = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        Self {
            ip_address: header_str(header::HeaderName::from_static("x-forwarded-for"))
                .and_then(|v| v.split(',').next())
                .map(|ip| ip.trim().to_string()),
            user_agent: header_str(header::USER_AGENT).map(str::to_string),
        }
    }

    pub fn activity(
        self,
        user_id: UserId,
        action: &str,
        resource: &str,
        details: impl Into<String>,
    ) -> Activity {
        Activity::new(user_id, action, resource, details)
            .from_client(self.ip_address, self.user_agent)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn parse_path<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what}: {raw:?}")))
}
