//! Relational store for the storefront backend.
//!
//! - [`Store`]: pooled, non-locking reads and ownership lookups
//! - [`UnitOfWork`]: one store transaction; row locks taken through it are
//!   held until [`UnitOfWork::commit`] or until the value is dropped, which
//!   rolls back
//! - [`InMemoryStore`] and [`PostgresStore`] implement both

pub mod error;
mod locks;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    ActivityLog, Address, ColorVariant, OrderRecord, PaymentMethod, PaymentRecord, Permission,
    Product, Role, Shipping, ShippingState, SizeVariant, TransactionRecord, User,
};
pub use postgres::PostgresStore;
pub use store::{Store, UnitOfWork};
