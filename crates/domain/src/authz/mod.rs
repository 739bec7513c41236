//! Authorization: role permissions plus `*_own` ownership checks.
//!
//! Permissions are named `{resource}.{action}`. A role holding
//! `{resource}.{action}_own` may perform the action only on records the
//! acting user owns. Ownership follows the address chain: an order belongs to
//! its transaction, a transaction and its payments to the address's user.

mod cache;
mod resolver;

pub use cache::{PermissionCache, RoleGrants};
pub use resolver::{AuthorizationResolver, Decision};

/// Resource names.
pub mod resources {
    pub const TRANSACTIONS: &str = "transactions";
    pub const ORDERS: &str = "orders";
    pub const ADDRESSES: &str = "addresses";
    pub const PAYMENTS: &str = "payments";
}

/// Action names.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const READ: &str = "read";
    pub const UPDATE: &str = "update";
    pub const CANCEL: &str = "cancel";
    pub const PAY: &str = "pay";
}
