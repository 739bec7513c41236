//! Payment submission and review.
//!
//! Payments are proof-of-transfer records. A transaction has at most one
//! open payment; a rejected one is resubmitted by moving it back to
//! `pending`.

use std::sync::Arc;

use common::{Clock, Money, PaymentId, PaymentStatus, TransactionStatus, TxId, UserId};
use serde::Deserialize;
use store::{PaymentRecord, Store};

use crate::authz::{AuthorizationResolver, actions, resources};
use crate::error::{DomainError, Result};
use crate::lifecycle::apply_transaction_transition;
use crate::status::{self, Status, TransitionError};

/// Body of a payment submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayment {
    pub transaction_id: TxId,
    pub total_payment: Money,
}

/// What a payment review does to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionEffect {
    /// The transaction stays where it is.
    Hold,
    /// The transaction moves to this status in the same unit of work.
    Advance(TransactionStatus),
}

/// The effect of a payment entering `to` while its transaction is in `tx`,
/// or `None` when the two statuses would contradict each other.
fn transaction_effect(to: PaymentStatus, tx: TransactionStatus) -> Option<TransactionEffect> {
    use TransactionStatus as Tx;
    match (to, tx) {
        (PaymentStatus::Confirmed, Tx::WaitingPayment) => Some(TransactionEffect::Advance(Tx::Paid)),
        (PaymentStatus::Pending | PaymentStatus::Rejected | PaymentStatus::Cancelled, Tx::WaitingPayment)
        | (PaymentStatus::Completed, Tx::Paid | Tx::Packed | Tx::Shipped | Tx::Completed) => {
            Some(TransactionEffect::Hold)
        }
        (PaymentStatus::Refunded, Tx::RefundRequested) => {
            Some(TransactionEffect::Advance(Tx::Refunded))
        }
        _ => None,
    }
}

/// Customer submissions and admin review of payments.
pub struct PaymentService {
    store: Arc<dyn Store>,
    authz: Arc<AuthorizationResolver>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        authz: Arc<AuthorizationResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            authz,
            clock,
        }
    }

    /// Records a payment for a transaction awaiting payment.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self, actor: UserId, request: SubmitPayment) -> Result<PaymentRecord> {
        let tx_id = &request.transaction_id;
        self.authz
            .require_or_own(actor, resources::TRANSACTIONS, actions::PAY, tx_id.as_str())
            .await?;
        if request.total_payment.is_negative() {
            return Err(DomainError::InvalidInput {
                field: "totalPayment",
                message: "must not be negative".to_string(),
            });
        }

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let tx = uow
            .load_transaction_for_update(tx_id)
            .await?
            .ok_or_else(|| DomainError::not_found("transaction", tx_id))?;

        if tx.status != TransactionStatus::WaitingPayment {
            return Err(DomainError::InvalidInput {
                field: "transactionId",
                message: format!("transaction is {}, not waiting_payment", tx.status),
            });
        }
        if request.total_payment != tx.total_price {
            return Err(DomainError::InvalidInput {
                field: "totalPayment",
                message: "total payment does not match".to_string(),
            });
        }

        let existing = uow.get_payments_for_transaction(tx_id).await?;
        if let Some(open) = existing
            .iter()
            .find(|p| !p.status.is_terminal() && p.status != PaymentStatus::Rejected)
        {
            return Err(DomainError::Conflict(format!(
                "transaction {tx_id} already has payment {} in {}",
                open.id, open.status
            )));
        }

        let payment = match existing.iter().find(|p| p.status == PaymentStatus::Rejected) {
            Some(rejected) => {
                let mut payment = uow
                    .load_payment_for_update(rejected.id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("payment", rejected.id))?;
                status::validate(payment.status, PaymentStatus::Pending)?;
                payment.status = PaymentStatus::Pending;
                payment.total_payment = request.total_payment;
                payment.updated_at = now;
                uow.update_payment(&payment).await?;
                payment
            }
            None => {
                let payment = PaymentRecord {
                    id: PaymentId::new(),
                    tx_id: tx_id.clone(),
                    total_payment: request.total_payment,
                    status: PaymentStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                uow.insert_payment(&payment).await?;
                payment
            }
        };
        uow.commit().await?;

        metrics::counter!("status_transitions_total", "entity" => "payment", "to" => payment.status.as_str())
            .increment(1);
        tracing::info!(payment_id = %payment.id, %tx_id, "payment submitted");
        Ok(payment)
    }

    /// Admin review of a payment.
    ///
    /// Confirming moves a `waiting_payment` transaction to `paid`; refunding
    /// moves a `refund_requested` transaction to `refunded`. A change the
    /// transaction's state does not admit is an illegal transition.
    /// Requesting the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        actor: UserId,
        payment_id: PaymentId,
        to: PaymentStatus,
    ) -> Result<PaymentRecord> {
        self.authz
            .require(actor, resources::PAYMENTS, actions::UPDATE)
            .await?;
        let current = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment", payment_id))?;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        // Transaction row first, then the payment, as every writer does.
        let mut tx = uow
            .load_transaction_for_update(&current.tx_id)
            .await?
            .ok_or_else(|| DomainError::not_found("transaction", &current.tx_id))?;
        let mut payment = uow
            .load_payment_for_update(payment_id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment", payment_id))?;

        if payment.status == to {
            return Ok(payment);
        }
        status::validate(payment.status, to)?;
        let effect = transaction_effect(to, tx.status).ok_or(TransitionError::ParentState {
            entity: PaymentStatus::ENTITY,
            to: to.as_str(),
            parent: TransactionStatus::ENTITY,
            parent_state: tx.status.as_str(),
        })?;

        payment.status = to;
        payment.updated_at = now;
        uow.update_payment(&payment).await?;

        if let TransactionEffect::Advance(next) = effect {
            apply_transaction_transition(uow.as_mut(), &mut tx, next, now).await?;
        }
        uow.commit().await?;

        metrics::counter!("status_transitions_total", "entity" => "payment", "to" => to.as_str())
            .increment(1);
        tracing::info!(%payment_id, status = %to, tx_status = %tx.status, "payment reviewed");
        Ok(payment)
    }

    /// Returns a payment to the owner of its transaction or an admin.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, actor: UserId, payment_id: PaymentId) -> Result<PaymentRecord> {
        self.authz
            .require_or_own(
                actor,
                resources::PAYMENTS,
                actions::READ,
                &payment_id.to_string(),
            )
            .await?;
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment", payment_id))
    }
}
