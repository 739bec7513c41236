//! Status values for transactions, orders and payments.
//!
//! These are plain values with string codecs; the legal transitions between
//! them live in the domain status machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {entity} status: {value:?}")]
pub struct ParseStatusError {
    pub entity: &'static str,
    pub value: String,
}

macro_rules! status_codec {
    ($name:ident, $entity:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All states, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the persisted / wire form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseStatusError {
                        entity: $entity,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle state of a transaction (a checked-out basket).
///
/// ```text
/// waiting_payment ──► paid ──► packed ──► shipped ──► completed
///        │             │ ▲
///        ▼             ▼ │
///    cancelled    refund_requested ──► refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    WaitingPayment,
    Paid,
    Packed,
    Shipped,
    Completed,
    Cancelled,
    RefundRequested,
    Refunded,
}

status_codec!(TransactionStatus, "transaction", {
    WaitingPayment => "waiting_payment",
    Paid => "paid",
    Packed => "packed",
    Shipped => "shipped",
    Completed => "completed",
    Cancelled => "cancelled",
    RefundRequested => "refund_requested",
    Refunded => "refunded",
});

/// Lifecycle state of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Packaged,
    OnDelivery,
    Delivered,
    Received,
    Cancelled,
}

status_codec!(OrderStatus, "order", {
    Pending => "pending",
    Packaged => "packaged",
    OnDelivery => "on_delivery",
    Delivered => "delivered",
    Received => "received",
    Cancelled => "cancelled",
});

/// Lifecycle state of a proof-of-transfer payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
    Completed,
    Cancelled,
    Refunded,
}

status_codec!(PaymentStatus, "payment", {
    Pending => "pending",
    Confirmed => "confirmed",
    Rejected => "rejected",
    Completed => "completed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_string_roundtrip() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(*status));
        }
    }

    #[test]
    fn order_status_wire_form_is_snake_case() {
        assert_eq!(OrderStatus::OnDelivery.as_str(), "on_delivery");
        let json = serde_json::to_string(&OrderStatus::OnDelivery).unwrap();
        assert_eq!(json, "\"on_delivery\"");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "lost".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.entity, "payment");
        assert_eq!(err.value, "lost");
    }

    #[test]
    fn defaults_are_initial_states() {
        assert_eq!(TransactionStatus::default(), TransactionStatus::WaitingPayment);
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }
}
