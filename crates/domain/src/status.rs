//! Status machine for transactions, orders and payments.
//!
//! Transaction transitions:
//! ```text
//! waiting_payment ──► paid ──► packed ──► shipped ──► completed
//!        │             │ ▲
//!        ▼             ▼ │
//!    cancelled    refund_requested ──► refunded
//! ```
//!
//! Order transitions:
//! ```text
//! pending ──► packaged ──► on_delivery ──► delivered ──► received
//!    │
//!    └──► cancelled
//! ```
//!
//! Payment transitions:
//! ```text
//! pending ──► confirmed ──► completed ──► refunded
//!  │  ▲ │         │                          ▲
//!  │  │ ▼         └──────────────────────────┘
//!  │ rejected
//!  ▼
//! cancelled
//! ```
//!
//! Any edge not drawn is illegal. A state without outgoing edges is terminal.

use common::{OrderStatus, PaymentStatus, TransactionStatus};
use thiserror::Error;

/// A rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The edge `from → to` is not in the table.
    #[error("illegal {entity} transition: {from} -> {to}")]
    Illegal {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// The change is legal on its own but not while the parent record is
    /// in `parent_state`.
    #[error("{entity} cannot become {to} while its {parent} is {parent_state}")]
    ParentState {
        entity: &'static str,
        to: &'static str,
        parent: &'static str,
        parent_state: &'static str,
    },

    /// `from` has no outgoing edges.
    #[error("{entity} is in terminal state {state}")]
    Terminal {
        entity: &'static str,
        state: &'static str,
    },
}

/// A status value governed by a transition table.
pub trait Status: Copy + Eq + std::fmt::Debug + 'static {
    /// Entity name used in errors, logs and metrics.
    const ENTITY: &'static str;

    /// Legal next states.
    fn successors(&self) -> &'static [Self];

    /// Wire form of the state.
    fn name(&self) -> &'static str;

    /// Returns true if no transition leaves this state.
    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

impl Status for TransactionStatus {
    const ENTITY: &'static str = "transaction";

    fn successors(&self) -> &'static [Self] {
        use TransactionStatus::*;
        match self {
            WaitingPayment => &[Paid, Cancelled],
            Paid => &[Packed, RefundRequested],
            Packed => &[Shipped],
            Shipped => &[Completed],
            RefundRequested => &[Refunded, Paid],
            Completed | Cancelled | Refunded => &[],
        }
    }

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

impl Status for OrderStatus {
    const ENTITY: &'static str = "order";

    fn successors(&self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            Pending => &[Packaged, Cancelled],
            Packaged => &[OnDelivery],
            OnDelivery => &[Delivered],
            Delivered => &[Received],
            Received | Cancelled => &[],
        }
    }

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

impl Status for PaymentStatus {
    const ENTITY: &'static str = "payment";

    fn successors(&self) -> &'static [Self] {
        use PaymentStatus::*;
        match self {
            Pending => &[Confirmed, Rejected, Cancelled],
            Confirmed => &[Completed, Refunded],
            Rejected => &[Pending],
            Completed => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    fn name(&self) -> &'static str {
        self.as_str()
    }
}

/// Checks a single transition against the table.
pub fn validate<S: Status>(from: S, to: S) -> Result<(), TransitionError> {
    if from.is_terminal() {
        return Err(TransitionError::Terminal {
            entity: S::ENTITY,
            state: from.name(),
        });
    }
    if !from.successors().contains(&to) {
        return Err(TransitionError::Illegal {
            entity: S::ENTITY,
            from: from.name(),
            to: to.name(),
        });
    }
    Ok(())
}

/// Returns true if `from → to` is a legal edge.
pub fn can_transition<S: Status>(from: S, to: S) -> bool {
    validate(from, to).is_ok()
}

/// Returns the legal next states of `from`.
pub fn next_states<S: Status>(from: S) -> &'static [S] {
    from.successors()
}
