//! Domain error types.

use std::time::Duration;

use common::{ProductId, SizeVariantId};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

use crate::status::TransitionError;

/// Tagged error kinds. Callers switch on these, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidInput,
    InvalidBasket,
    InsufficientStock,
    IllegalTransition,
    Conflict,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidBasket => "invalid_basket",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::IllegalTransition => "illegal_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Authorization or ownership failure. The reason is for logs only.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// A malformed, empty or negative field.
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// The basket is empty or its variant chain is inconsistent.
    #[error("invalid basket: {0}")]
    InvalidBasket(String),

    /// Stock at lock time is below the requested quantity.
    #[error(
        "insufficient stock for product {product_id} (size variant {size_variant_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size_variant_id: SizeVariantId,
        requested: i32,
        available: i32,
    },

    /// The status machine rejected a transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A lock could not be acquired or a concurrent update won.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation deadline passed.
    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// A store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        DomainError::Forbidden(reason.into())
    }

    /// Returns the tagged kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::InvalidInput { .. } => ErrorKind::InvalidInput,
            DomainError::InvalidBasket(_) => ErrorKind::InvalidBasket,
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::Transition(_) => ErrorKind::IllegalTransition,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Timeout(_) => ErrorKind::Timeout,
            DomainError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller may retry the same request.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Timeout)
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { reason } => DomainError::Conflict(reason),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
