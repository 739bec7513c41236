//! Shared types for the storefront backend.
//!
//! - Typed identifiers for every entity, including the prefixed
//!   transaction (`TRX-…`) and order (`TXO…`) ids
//! - [`Money`] in integer minor units
//! - Status enums for transactions, orders and payments
//! - [`Clock`] for timestamps

pub mod clock;
pub mod ids;
pub mod money;
pub mod status;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{
    ActivityId, AddressId, CategoryId, ColorVariantId, IdParseError, OrderId, PaymentId,
    PaymentMethodId, PermissionId, ProductId, RoleId, ShippingId, SizeVariantId, TxId, UserId,
};
pub use money::Money;
pub use status::{OrderStatus, ParseStatusError, PaymentStatus, TransactionStatus};
