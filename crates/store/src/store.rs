use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, ColorVariantId, Money, OrderId, OrderStatus, PaymentId, PaymentMethodId, ProductId,
    RoleId, ShippingId, SizeVariantId, TransactionStatus, TxId, UserId,
};

use crate::Result;
use crate::model::{
    ActivityLog, Address, ColorVariant, OrderRecord, PaymentMethod, PaymentRecord, Permission,
    Product, Role, Shipping, SizeVariant, TransactionRecord, User,
};

/// Pooled access to the store.
///
/// Reads here take no locks and see committed data only. Every mutation of
/// transactional state goes through a [`UnitOfWork`] obtained from
/// [`Store::begin`]. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Starts a store transaction.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>>;

    /// Returns every permission granted to a role, in one query.
    async fn get_role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>>;

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>>;

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>>;

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>>;

    async fn get_size_variant(&self, id: SizeVariantId) -> Result<Option<SizeVariant>>;

    async fn get_transaction(&self, tx_id: &TxId) -> Result<Option<TransactionRecord>>;

    /// Returns the orders of a transaction, oldest first.
    async fn get_orders_for_transaction(&self, tx_id: &TxId) -> Result<Vec<OrderRecord>>;

    async fn get_order(&self, id: &OrderId) -> Result<Option<OrderRecord>>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>>;

    /// Returns the payments of a transaction, oldest first.
    async fn get_payments_for_transaction(&self, tx_id: &TxId) -> Result<Vec<PaymentRecord>>;

    /// Owner of an address. `None` when the address does not exist.
    async fn address_owner(&self, id: AddressId) -> Result<Option<UserId>>;

    /// Owner of a transaction, through its address.
    async fn transaction_owner(&self, tx_id: &TxId) -> Result<Option<UserId>>;

    /// Owner of an order, through transaction and address.
    async fn order_owner(&self, id: &OrderId) -> Result<Option<UserId>>;

    /// Owner of a payment, through transaction and address.
    async fn payment_owner(&self, id: PaymentId) -> Result<Option<UserId>>;

    async fn append_activity(&self, entry: ActivityLog) -> Result<()>;
}

/// One store transaction.
///
/// Locks taken by the `*_for_update` methods are held until [`commit`]
/// returns. Dropping a unit of work without committing rolls back every
/// write made through it and releases its locks.
///
/// [`commit`]: UnitOfWork::commit
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn get_color_variant(&mut self, id: ColorVariantId) -> Result<Option<ColorVariant>>;

    /// Reads a size variant and takes an exclusive lock on its row.
    async fn load_variant_for_update(&mut self, id: SizeVariantId) -> Result<Option<SizeVariant>>;

    /// Writes a new stock level. The row must be locked by this unit of work.
    async fn update_variant_stock(&mut self, id: SizeVariantId, stock: i32) -> Result<()>;

    async fn insert_transaction(&mut self, tx: &TransactionRecord) -> Result<()>;

    /// Reads a transaction and takes an exclusive lock on its row.
    async fn load_transaction_for_update(
        &mut self,
        tx_id: &TxId,
    ) -> Result<Option<TransactionRecord>>;

    async fn update_transaction_total(
        &mut self,
        tx_id: &TxId,
        total: Money,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn update_transaction_status(
        &mut self,
        tx_id: &TxId,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    async fn get_orders_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<OrderRecord>>;

    async fn update_order_status(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_payments_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<PaymentRecord>>;

    /// Reads a payment and takes an exclusive lock on its row.
    async fn load_payment_for_update(&mut self, id: PaymentId) -> Result<Option<PaymentRecord>>;

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<()>;

    /// Writes status, amount and `updated_at` of an existing payment.
    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<()>;

    /// Makes every write visible and releases all locks.
    async fn commit(self: Box<Self>) -> Result<()>;
}
