//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind, TransitionError};
use serde_json::{Value, json};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No principal, an unknown one, or a deactivated one.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Malformed request body or path parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// Maps an error kind to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidBasket => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InsufficientStock | ErrorKind::IllegalTransition | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            ApiError::Unauthenticated(reason) => {
                tracing::debug!(%reason, "request rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "unauthenticated",
                    "authentication required".to_string(),
                    None,
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidInput.as_str(),
                msg,
                None,
            ),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        metrics::counter!("http_errors_total", "kind" => error).increment(1);

        let mut body = json!({ "error": error, "message": message });
        if let Some(details) = details {
            body["details"] = details;
        }
        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: String) -> (StatusCode, &'static str, String, Option<Value>) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Internal.as_str(),
        "internal server error".to_string(),
        None,
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, &'static str, String, Option<Value>) {
    let kind = err.kind();
    let status = status_for(kind);
    let details = match &err {
        DomainError::Forbidden(reason) => {
            tracing::debug!(%reason, "access denied");
            return (status, kind.as_str(), "access denied".to_string(), None);
        }
        DomainError::Store(_) => return internal(err.to_string()),
        DomainError::InvalidInput { field, .. } => Some(json!({ "field": field })),
        DomainError::InsufficientStock {
            product_id,
            size_variant_id,
            requested,
            available,
        } => Some(json!({
            "productId": product_id,
            "sizeVariantId": size_variant_id,
            "requested": requested,
            "available": available,
        })),
        DomainError::Transition(TransitionError::Illegal { entity, from, to }) => {
            Some(json!({ "entity": entity, "from": from, "to": to }))
        }
        DomainError::Transition(TransitionError::Terminal { entity, state }) => {
            Some(json!({ "entity": entity, "from": state }))
        }
        DomainError::Transition(TransitionError::ParentState {
            entity,
            to,
            parent,
            parent_state,
        }) => Some(json!({
            "entity": entity,
            "to": to,
            "parent": parent,
            "parentState": parent_state,
        })),
        _ => None,
    };
    (status, kind.as_str(), err.to_string(), details)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
