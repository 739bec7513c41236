//! Transaction status advancement and cancellation.
//!
//! Every change runs in one store transaction holding the transaction row
//! lock, so the cascade to child orders is atomic with the parent change.
//! Orders move in lockstep with their transaction:
//!
//! | transaction → | orders                                   |
//! |---------------|------------------------------------------|
//! | `paid`        | `pending → packaged`                      |
//! | `shipped`     | `packaged → on_delivery`                 |
//! | `completed`   | `on_delivery → delivered → received`     |
//! | `cancelled`   | `pending → cancelled`, stock restored    |
//!
//! The open payment follows too: `pending → confirmed` on `paid`,
//! `pending → cancelled` on `cancelled`, and `confirmed`/`completed →
//! refunded` on `refunded`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Clock, OrderId, OrderStatus, PaymentStatus, TransactionStatus, TxId, UserId};
use store::{OrderRecord, Store, TransactionRecord, UnitOfWork};

use crate::authz::{AuthorizationResolver, actions, resources};
use crate::checkout::{LockKey, TransactionView};
use crate::error::{DomainError, Result};
use crate::queries::TransactionQueries;
use crate::status;

/// Order steps the lockstep rule applies when a transaction enters `to`.
fn order_cascade(to: TransactionStatus) -> &'static [(OrderStatus, &'static [OrderStatus])] {
    use OrderStatus::*;
    match to {
        TransactionStatus::Paid => &[(Pending, &[Packaged])],
        TransactionStatus::Shipped => &[(Packaged, &[OnDelivery])],
        TransactionStatus::Completed => &[(OnDelivery, &[Delivered, Received])],
        TransactionStatus::Cancelled => &[(Pending, &[Cancelled])],
        _ => &[],
    }
}

/// Payment steps that follow a transaction entering `to`.
fn payment_cascade(to: TransactionStatus) -> &'static [(PaymentStatus, PaymentStatus)] {
    use PaymentStatus::*;
    match to {
        TransactionStatus::Paid => &[(Pending, Confirmed)],
        TransactionStatus::Cancelled => &[(Pending, Cancelled)],
        TransactionStatus::Refunded => &[(Confirmed, Refunded), (Completed, Refunded)],
        _ => &[],
    }
}

/// Moves a locked transaction to `to`, cascading to its orders and payments
/// and, on cancellation, restoring reserved stock.
///
/// The caller must already hold the transaction row lock through `uow`.
pub(crate) async fn apply_transaction_transition(
    uow: &mut dyn UnitOfWork,
    tx: &mut TransactionRecord,
    to: TransactionStatus,
    now: DateTime<Utc>,
) -> Result<Vec<OrderRecord>> {
    status::validate(tx.status, to)?;

    let mut orders = uow.get_orders_for_transaction(&tx.tx_id).await?;
    let cascade = order_cascade(to);
    let mut restock: BTreeMap<LockKey, i32> = BTreeMap::new();

    for order in orders.iter_mut() {
        let Some((_, steps)) = cascade.iter().find(|(from, _)| *from == order.status) else {
            continue;
        };
        for step in *steps {
            status::validate(order.status, *step)?;
            order.status = *step;
        }
        order.updated_at = now;
        uow.update_order_status(&order.id, order.status, now).await?;
        metrics::counter!("status_transitions_total", "entity" => "order", "to" => order.status.as_str())
            .increment(1);

        if order.status == OrderStatus::Cancelled {
            *restock
                .entry((order.product_id, order.color_variant_id, order.size_variant_id))
                .or_default() += order.quantity;
        }
    }

    // BTreeMap iteration is the checkout lock order.
    for ((_, _, size_variant_id), quantity) in restock {
        let variant = uow
            .load_variant_for_update(size_variant_id)
            .await?
            .ok_or_else(|| DomainError::not_found("size variant", size_variant_id))?;
        uow.update_variant_stock(size_variant_id, variant.stock + quantity)
            .await?;
        tracing::debug!(%size_variant_id, quantity, "stock restored");
    }

    let payment_steps = payment_cascade(to);
    if !payment_steps.is_empty() {
        for listed in uow.get_payments_for_transaction(&tx.tx_id).await? {
            let Some((_, next)) = payment_steps.iter().find(|(from, _)| *from == listed.status)
            else {
                continue;
            };
            // Payment rows are locked after their transaction.
            let mut payment = uow
                .load_payment_for_update(listed.id)
                .await?
                .ok_or_else(|| DomainError::not_found("payment", listed.id))?;
            status::validate(payment.status, *next)?;
            payment.status = *next;
            payment.updated_at = now;
            uow.update_payment(&payment).await?;
            metrics::counter!("status_transitions_total", "entity" => "payment", "to" => next.as_str())
                .increment(1);
            tracing::debug!(payment_id = %payment.id, status = %next, "payment followed transaction");
        }
    }

    uow.update_transaction_status(&tx.tx_id, to, now).await?;
    metrics::counter!("status_transitions_total", "entity" => "transaction", "to" => to.as_str())
        .increment(1);
    tracing::info!(tx_id = %tx.tx_id, from = %tx.status, %to, "transaction status changed");

    tx.status = to;
    tx.updated_at = now;
    Ok(orders)
}

/// Admin status updates and customer cancellations.
pub struct LifecycleService {
    store: Arc<dyn Store>,
    authz: Arc<AuthorizationResolver>,
    clock: Arc<dyn Clock>,
    queries: TransactionQueries,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn Store>,
        authz: Arc<AuthorizationResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queries = TransactionQueries::new(store.clone(), authz.clone());
        Self {
            store,
            authz,
            clock,
            queries,
        }
    }

    /// Admin status update. Requesting the current status is a no-op that
    /// returns the current view.
    #[tracing::instrument(skip(self))]
    pub async fn advance_transaction(
        &self,
        actor: UserId,
        tx_id: &TxId,
        to: TransactionStatus,
    ) -> Result<TransactionView> {
        self.authz
            .require(actor, resources::TRANSACTIONS, actions::UPDATE)
            .await?;

        let mut uow = self.store.begin().await?;
        let mut tx = uow
            .load_transaction_for_update(tx_id)
            .await?
            .ok_or_else(|| DomainError::not_found("transaction", tx_id))?;

        if tx.status == to {
            drop(uow);
            tracing::debug!(%tx_id, status = %to, "status unchanged");
            return self.queries.compose(tx).await;
        }

        let orders =
            apply_transaction_transition(uow.as_mut(), &mut tx, to, self.clock.now()).await?;
        uow.commit().await?;

        self.queries.compose_with_orders(tx, orders).await
    }

    /// Cancels a transaction on behalf of its owner or an admin.
    ///
    /// `waiting_payment` becomes `cancelled` with stock restored; `paid`
    /// becomes `refund_requested`. Anything else is an illegal transition.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_transaction(&self, actor: UserId, tx_id: &TxId) -> Result<TransactionView> {
        self.authz
            .require_or_own(actor, resources::TRANSACTIONS, actions::CANCEL, tx_id.as_str())
            .await?;
        self.cancel_authorized(tx_id).await
    }

    /// Cancels the transaction an order belongs to.
    ///
    /// Orders are never cancelled on their own; the whole parent transaction
    /// is cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, actor: UserId, order_id: &OrderId) -> Result<TransactionView> {
        self.authz
            .require_or_own(actor, resources::ORDERS, actions::CANCEL, order_id.as_str())
            .await?;
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        self.cancel_authorized(&order.tx_id).await
    }

    async fn cancel_authorized(&self, tx_id: &TxId) -> Result<TransactionView> {
        let mut uow = self.store.begin().await?;
        let mut tx = uow
            .load_transaction_for_update(tx_id)
            .await?
            .ok_or_else(|| DomainError::not_found("transaction", tx_id))?;

        let to = match tx.status {
            TransactionStatus::Paid => TransactionStatus::RefundRequested,
            _ => TransactionStatus::Cancelled,
        };
        let orders =
            apply_transaction_transition(uow.as_mut(), &mut tx, to, self.clock.now()).await?;
        uow.commit().await?;

        self.queries.compose_with_orders(tx, orders).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_steps_are_legal_order_transitions() {
        for to in TransactionStatus::ALL {
            for (from, steps) in order_cascade(*to) {
                let mut current = *from;
                for step in *steps {
                    assert!(status::can_transition(current, *step));
                    current = *step;
                }
            }
        }
    }

    #[test]
    fn test_only_paid_shipped_completed_cancelled_cascade() {
        let cascading: Vec<_> = TransactionStatus::ALL
            .iter()
            .filter(|s| !order_cascade(**s).is_empty())
            .copied()
            .collect();
        assert_eq!(
            cascading,
            vec![
                TransactionStatus::Paid,
                TransactionStatus::Shipped,
                TransactionStatus::Completed,
                TransactionStatus::Cancelled,
            ]
        );
    }
}
