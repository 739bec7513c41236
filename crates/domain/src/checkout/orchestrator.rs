use std::sync::Arc;
use std::time::Instant;

use common::{
    AddressId, Clock, Money, OrderId, OrderStatus, PaymentMethodId, ShippingId, TransactionStatus,
    TxId, UserId,
};
use store::{
    Address, OrderRecord, PaymentMethod, Shipping, Store, TransactionRecord, UnitOfWork,
};

use super::{Basket, BasketLine, CheckoutConfig, References, TransactionView};
use crate::authz::{AuthorizationResolver, actions, resources};
use crate::error::{DomainError, Result};

/// Converts baskets into persisted transactions without overselling.
pub struct CheckoutOrchestrator {
    store: Arc<dyn Store>,
    authz: Arc<AuthorizationResolver>,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        authz: Arc<AuthorizationResolver>,
        clock: Arc<dyn Clock>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            authz,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Checks out `basket` on behalf of `actor`.
    ///
    /// All-or-nothing: on any error no transaction, order or stock change is
    /// visible. The whole call, reference loads included, is bounded by
    /// [`CheckoutConfig::timeout`].
    #[tracing::instrument(skip(self, basket), fields(lines = basket.lines.len()))]
    pub async fn checkout(&self, actor: UserId, basket: Basket) -> Result<TransactionView> {
        metrics::counter!("checkout_total").increment(1);
        let start = Instant::now();

        let result = match tokio::time::timeout(self.config.timeout, self.run(actor, &basket)).await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout(self.config.timeout)),
        };

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(view) => {
                tracing::info!(tx_id = %view.tx_id, total = %view.total_price, "checkout committed");
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "kind" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(kind = %e.kind(), error = %e, "checkout failed");
            }
        }
        result
    }

    async fn run(&self, actor: UserId, basket: &Basket) -> Result<TransactionView> {
        self.authz
            .require(actor, resources::TRANSACTIONS, actions::CREATE)
            .await?;
        let lines = basket.lines_in_lock_order()?;

        let (address, shipping, payment_method) = tokio::try_join!(
            self.load_address(actor, basket.address_id),
            self.load_shipping(basket.shipping_id),
            self.load_payment_method(basket.payment_method_id),
        )?;
        let refs = References {
            address,
            shipping,
            payment_method,
        };

        let mut attempt = 0;
        loop {
            match self.reserve(basket, &lines).await {
                Err(DomainError::Conflict(reason)) if attempt < self.config.lock_retries => {
                    attempt += 1;
                    metrics::counter!("checkout_lock_retries_total").increment(1);
                    tracing::warn!(attempt, %reason, "checkout lost a lock race, retrying");
                }
                Err(DomainError::Conflict(reason)) => {
                    return Err(DomainError::Conflict(format!(
                        "lock retry limit exceeded: {reason}"
                    )));
                }
                Err(e) => return Err(e),
                Ok((tx, orders)) => return Ok(TransactionView::compose(&tx, &orders, refs)),
            }
        }
    }

    async fn load_address(&self, actor: UserId, id: AddressId) -> Result<Address> {
        let address = self
            .store
            .get_address(id)
            .await?
            .ok_or_else(|| DomainError::not_found("address", id))?;
        if address.user_id != actor {
            return Err(DomainError::forbidden(format!(
                "address {id} is not owned by {actor}"
            )));
        }
        Ok(address)
    }

    async fn load_shipping(&self, id: ShippingId) -> Result<Shipping> {
        let shipping = self
            .store
            .get_shipping(id)
            .await?
            .ok_or_else(|| DomainError::not_found("shipping", id))?;
        if !shipping.is_active() {
            return Err(DomainError::forbidden(format!("shipping {id} is inactive")));
        }
        Ok(shipping)
    }

    async fn load_payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod> {
        let method = self
            .store
            .get_payment_method(id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment method", id))?;
        if !method.is_active {
            return Err(DomainError::forbidden(format!(
                "payment method {id} is inactive"
            )));
        }
        Ok(method)
    }

    /// One attempt inside one store transaction. Dropping the unit of work on
    /// an early return rolls everything back.
    async fn reserve(
        &self,
        basket: &Basket,
        lines: &[BasketLine],
    ) -> Result<(TransactionRecord, Vec<OrderRecord>)> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;

        let mut tx = TransactionRecord {
            tx_id: TxId::generate(now),
            address_id: basket.address_id,
            shipping_id: basket.shipping_id,
            payment_method_id: basket.payment_method_id,
            shipping_price: basket.shipping_price,
            total_price: Money::zero(),
            status: TransactionStatus::WaitingPayment,
            created_at: now,
            updated_at: now,
        };
        uow.insert_transaction(&tx).await?;

        let mut orders = Vec::with_capacity(lines.len());
        for line in lines {
            let order = reserve_line(uow.as_mut(), &tx.tx_id, line, now).await?;
            orders.push(order);
        }

        let total = orders
            .iter()
            .try_fold(tx.shipping_price, |acc, o| acc.checked_add(o.subtotal))
            .ok_or_else(|| DomainError::InvalidInput {
                field: "lines",
                message: "total price overflows".to_string(),
            })?;
        uow.update_transaction_total(&tx.tx_id, total, now).await?;
        uow.commit().await?;

        tx.total_price = total;
        Ok((tx, orders))
    }
}

/// Locks one variant, checks the chain and stock, writes the order and the
/// decremented stock.
async fn reserve_line(
    uow: &mut dyn UnitOfWork,
    tx_id: &TxId,
    line: &BasketLine,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<OrderRecord> {
    let product = uow
        .get_product(line.product_id)
        .await?
        .filter(|p| !p.is_deleted())
        .ok_or_else(|| DomainError::not_found("product", line.product_id))?;
    let color = uow
        .get_color_variant(line.color_variant_id)
        .await?
        .ok_or_else(|| DomainError::not_found("color variant", line.color_variant_id))?;
    let size = uow
        .load_variant_for_update(line.size_variant_id)
        .await?
        .ok_or_else(|| DomainError::not_found("size variant", line.size_variant_id))?;

    if color.product_id != product.id {
        return Err(DomainError::InvalidBasket(format!(
            "color variant {} does not belong to product {}",
            color.id, product.id
        )));
    }
    if size.color_variant_id != color.id {
        return Err(DomainError::InvalidBasket(format!(
            "size variant {} does not belong to color variant {}",
            size.id, color.id
        )));
    }
    if size.stock < line.quantity {
        return Err(DomainError::InsufficientStock {
            product_id: product.id,
            size_variant_id: size.id,
            requested: line.quantity,
            available: size.stock,
        });
    }

    let subtotal = product
        .base_price
        .checked_mul(line.quantity)
        .ok_or_else(|| DomainError::InvalidInput {
            field: "quantity",
            message: "line total overflows".to_string(),
        })?;
    let order = OrderRecord {
        id: OrderId::generate(now),
        tx_id: tx_id.clone(),
        product_id: product.id,
        color_variant_id: color.id,
        size_variant_id: size.id,
        unit_price: product.base_price,
        quantity: line.quantity,
        subtotal,
        status: OrderStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    uow.insert_order(&order).await?;
    uow.update_variant_stock(size.id, size.stock - line.quantity)
        .await?;

    Ok(order)
}
