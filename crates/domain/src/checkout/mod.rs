//! Checkout: turning a basket into a persisted transaction.
//!
//! Stock is reserved under exclusive variant row locks taken in ascending
//! `(product, color variant, size variant)` order, so two baskets touching
//! the same variants always queue in the same order instead of deadlocking.

mod basket;
mod orchestrator;
mod view;

use std::time::Duration;

pub use basket::{Basket, BasketLine, LockKey};
pub use orchestrator::CheckoutOrchestrator;
pub use view::{OrderView, References, TransactionView};

/// Checkout tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Deadline for the whole operation, reference loads included.
    pub timeout: Duration,
    /// How many times a checkout that lost a lock race is restarted.
    pub lock_retries: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            lock_retries: 3,
        }
    }
}
