//! Checkout input.

use std::collections::HashSet;

use common::{AddressId, ColorVariantId, Money, PaymentMethodId, ProductId, ShippingId, SizeVariantId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Ordering key under which variant row locks are taken.
pub type LockKey = (ProductId, ColorVariantId, SizeVariantId);

/// One requested line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketLine {
    pub product_id: ProductId,
    pub color_variant_id: ColorVariantId,
    pub size_variant_id: SizeVariantId,
    pub quantity: i32,
}

impl BasketLine {
    pub fn lock_key(&self) -> LockKey {
        (self.product_id, self.color_variant_id, self.size_variant_id)
    }
}

/// A basket submitted to checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basket {
    pub address_id: AddressId,
    pub shipping_id: ShippingId,
    pub payment_method_id: PaymentMethodId,
    pub shipping_price: Money,
    pub lines: Vec<BasketLine>,
}

impl Basket {
    /// Validates the basket shape and returns its lines in lock order.
    ///
    /// Nothing here touches the store; references are resolved later.
    pub fn lines_in_lock_order(&self) -> Result<Vec<BasketLine>> {
        if self.shipping_price.is_negative() {
            return Err(DomainError::InvalidInput {
                field: "shippingPrice",
                message: "must not be negative".to_string(),
            });
        }
        if self.lines.is_empty() {
            return Err(DomainError::InvalidBasket("basket has no lines".to_string()));
        }

        let mut seen = HashSet::with_capacity(self.lines.len());
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(DomainError::InvalidBasket(format!(
                    "quantity for size variant {} must be at least 1",
                    line.size_variant_id
                )));
            }
            if !seen.insert(line.lock_key()) {
                return Err(DomainError::InvalidBasket(format!(
                    "size variant {} appears more than once",
                    line.size_variant_id
                )));
            }
        }

        let mut lines = self.lines.clone();
        lines.sort_by_key(BasketLine::lock_key);
        Ok(lines)
    }
}
