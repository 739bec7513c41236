//! Read-side composition of transaction views.

use std::sync::Arc;

use common::{TxId, UserId};
use store::{OrderRecord, Store, TransactionRecord};

use crate::authz::{AuthorizationResolver, actions, resources};
use crate::checkout::{References, TransactionView};
use crate::error::{DomainError, Result};

/// Loads transactions for display.
pub struct TransactionQueries {
    store: Arc<dyn Store>,
    authz: Arc<AuthorizationResolver>,
}

impl TransactionQueries {
    pub fn new(store: Arc<dyn Store>, authz: Arc<AuthorizationResolver>) -> Self {
        Self { store, authz }
    }

    /// Returns a transaction to its owner or an admin.
    ///
    /// A caller without read access gets `Forbidden` whether or not the
    /// transaction exists.
    #[tracing::instrument(skip(self))]
    pub async fn get_transaction(&self, actor: UserId, tx_id: &TxId) -> Result<TransactionView> {
        self.authz
            .require_or_own(actor, resources::TRANSACTIONS, actions::READ, tx_id.as_str())
            .await?;
        let tx = self
            .store
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| DomainError::not_found("transaction", tx_id))?;
        self.compose(tx).await
    }

    pub(crate) async fn compose(&self, tx: TransactionRecord) -> Result<TransactionView> {
        let orders = self.store.get_orders_for_transaction(&tx.tx_id).await?;
        self.compose_with_orders(tx, orders).await
    }

    pub(crate) async fn compose_with_orders(
        &self,
        tx: TransactionRecord,
        orders: Vec<OrderRecord>,
    ) -> Result<TransactionView> {
        let (address, shipping, payment_method) = tokio::try_join!(
            self.store.get_address(tx.address_id),
            self.store.get_shipping(tx.shipping_id),
            self.store.get_payment_method(tx.payment_method_id),
        )?;
        let refs = References {
            address: address.ok_or_else(|| DomainError::not_found("address", tx.address_id))?,
            shipping: shipping.ok_or_else(|| DomainError::not_found("shipping", tx.shipping_id))?,
            payment_method: payment_method
                .ok_or_else(|| DomainError::not_found("payment method", tx.payment_method_id))?,
        };
        Ok(TransactionView::compose(&tx, &orders, refs))
    }
}
