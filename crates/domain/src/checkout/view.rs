//! Composed transaction views returned to callers.

use chrono::{DateTime, Utc};
use common::{
    ColorVariantId, Money, OrderId, OrderStatus, ProductId, SizeVariantId, TransactionStatus, TxId,
};
use serde::Serialize;
use store::{Address, OrderRecord, PaymentMethod, Shipping, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub product_id: ProductId,
    pub color_variant_id: ColorVariantId,
    pub size_variant_id: SizeVariantId,
    pub unit_price: Money,
    pub quantity: i32,
    pub subtotal: Money,
    pub status: OrderStatus,
}

impl From<&OrderRecord> for OrderView {
    fn from(order: &OrderRecord) -> Self {
        Self {
            id: order.id.clone(),
            product_id: order.product_id,
            color_variant_id: order.color_variant_id,
            size_variant_id: order.size_variant_id,
            unit_price: order.unit_price,
            quantity: order.quantity,
            subtotal: order.subtotal,
            status: order.status,
        }
    }
}

/// A transaction with its address, shipping and payment method embedded and
/// its orders inlined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub tx_id: TxId,
    pub status: TransactionStatus,
    pub shipping_price: Money,
    pub total_price: Money,
    pub address: Address,
    pub shipping: Shipping,
    pub payment_method: PaymentMethod,
    pub orders: Vec<OrderView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The records a [`TransactionView`] is built from.
#[derive(Debug, Clone)]
pub struct References {
    pub address: Address,
    pub shipping: Shipping,
    pub payment_method: PaymentMethod,
}

impl TransactionView {
    pub fn compose(tx: &TransactionRecord, orders: &[OrderRecord], refs: References) -> Self {
        Self {
            tx_id: tx.tx_id.clone(),
            status: tx.status,
            shipping_price: tx.shipping_price,
            total_price: tx.total_price,
            address: refs.address,
            shipping: refs.shipping,
            payment_method: refs.payment_method,
            orders: orders.iter().map(OrderView::from).collect(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }

    /// Returns true if the listed orders sum to the total.
    pub fn total_is_consistent(&self) -> bool {
        let subtotals: Money = self.orders.iter().map(|o| o.subtotal).sum();
        subtotals + self.shipping_price == self.total_price
    }
}
