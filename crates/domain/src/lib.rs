//! Domain layer for the storefront backend.
//!
//! This crate provides:
//! - [`AuthorizationResolver`]: role permissions and `*_own` ownership checks
//! - [`status`]: the transaction, order and payment transition tables
//! - [`CheckoutOrchestrator`]: basket to transaction with row-locked stock
//!   reservation
//! - [`LifecycleService`]: admin status updates and cancellation
//! - [`PaymentService`]: payment submission and review
//! - [`TransactionQueries`]: owner-or-admin transaction reads

use std::sync::Arc;

use common::Clock;
use store::Store;

pub mod authz;
pub mod checkout;
pub mod error;
pub mod lifecycle;
pub mod payment;
pub mod queries;
pub mod status;

pub use authz::{AuthorizationResolver, Decision, PermissionCache};
pub use checkout::{
    Basket, BasketLine, CheckoutConfig, CheckoutOrchestrator, OrderView, TransactionView,
};
pub use error::{DomainError, ErrorKind, Result};
pub use lifecycle::LifecycleService;
pub use payment::{PaymentService, SubmitPayment};
pub use queries::TransactionQueries;
pub use status::{Status, TransitionError};

/// Every domain service, wired to one store, clock and permission cache.
pub struct Storefront {
    pub authz: Arc<AuthorizationResolver>,
    pub checkout: CheckoutOrchestrator,
    pub lifecycle: LifecycleService,
    pub payments: PaymentService,
    pub queries: TransactionQueries,
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: CheckoutConfig) -> Self {
        let authz = Arc::new(AuthorizationResolver::new(store.clone()));
        Self {
            checkout: CheckoutOrchestrator::new(
                store.clone(),
                authz.clone(),
                clock.clone(),
                config,
            ),
            lifecycle: LifecycleService::new(store.clone(), authz.clone(), clock.clone()),
            payments: PaymentService::new(store.clone(), authz.clone(), clock),
            queries: TransactionQueries::new(store, authz.clone()),
            authz,
        }
    }
}
