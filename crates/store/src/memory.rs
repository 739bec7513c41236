use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, ColorVariantId, Money, OrderId, OrderStatus, PaymentId, PaymentMethodId,
    PermissionId, ProductId, RoleId, ShippingId, SizeVariantId, TransactionStatus, TxId, UserId,
};
use tokio::sync::RwLock;

use crate::locks::{RowGuard, RowKey, RowLocks};
use crate::model::{
    ActivityLog, Address, ColorVariant, OrderRecord, PaymentMethod, PaymentRecord, Permission,
    Product, Role, Shipping, SizeVariant, TransactionRecord, User,
};
use crate::store::{Store, UnitOfWork};
use crate::{Result, StoreError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    role_permissions: HashMap<RoleId, HashSet<PermissionId>>,
    products: HashMap<ProductId, Product>,
    color_variants: HashMap<ColorVariantId, ColorVariant>,
    size_variants: HashMap<SizeVariantId, SizeVariant>,
    addresses: HashMap<AddressId, Address>,
    shippings: HashMap<ShippingId, Shipping>,
    payment_methods: HashMap<PaymentMethodId, PaymentMethod>,
    transactions: HashMap<TxId, TransactionRecord>,
    orders: BTreeMap<OrderId, OrderRecord>,
    payments: HashMap<PaymentId, PaymentRecord>,
    activity: Vec<ActivityLog>,
}

impl Tables {
    fn transaction_owner(&self, tx_id: &TxId) -> Option<UserId> {
        let tx = self.transactions.get(tx_id)?;
        self.addresses.get(&tx.address_id).map(|a| a.user_id)
    }
}

/// In-memory store for tests and local runs.
///
/// Committed rows live behind one `RwLock`. Row locks are per-row async
/// mutexes, so two units of work touching the same size variant serialize
/// exactly like `SELECT … FOR UPDATE` does, while unrelated rows proceed in
/// parallel. A unit of work stages its writes and publishes them on commit,
/// before releasing its locks.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<RowLocks>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            locks: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a unit of work waits for a row lock before failing
    /// with [`StoreError::Conflict`].
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub async fn insert_role(&self, role: Role) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .roles
            .values()
            .any(|r| r.id != role.id && r.name == role.name)
        {
            return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
        }
        tables.roles.insert(role.id, role);
        Ok(())
    }

    pub async fn insert_permission(&self, permission: Permission) {
        self.tables
            .write()
            .await
            .permissions
            .insert(permission.id, permission);
    }

    pub async fn grant_permission(&self, role_id: RoleId, permission_id: PermissionId) {
        self.tables
            .write()
            .await
            .role_permissions
            .entry(role_id)
            .or_default()
            .insert(permission_id);
    }

    pub async fn revoke_permission(&self, role_id: RoleId, permission_id: PermissionId) {
        if let Some(granted) = self.tables.write().await.role_permissions.get_mut(&role_id) {
            granted.remove(&permission_id);
        }
    }

    pub async fn insert_user(&self, user: User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StoreError::UniqueViolation("users_username_key".to_string()));
        }
        tables.users.insert(user.id, user);
        Ok(())
    }

    pub async fn set_user_active(&self, id: UserId, is_active: bool) {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.is_active = is_active;
        }
    }

    pub async fn insert_product(&self, product: Product) {
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Changes a product's base price, as an admin edit would.
    pub async fn set_product_price(&self, id: ProductId, price: Money) {
        if let Some(product) = self.tables.write().await.products.get_mut(&id) {
            product.base_price = price;
        }
    }

    pub async fn insert_color_variant(&self, variant: ColorVariant) -> Result<()> {
        let mut tables = self.tables.write().await;
        let name = variant.name.to_lowercase();
        if tables.color_variants.values().any(|c| {
            c.id != variant.id && c.product_id == variant.product_id && c.name.to_lowercase() == name
        }) {
            return Err(StoreError::UniqueViolation(
                "color_variants_product_name_key".to_string(),
            ));
        }
        tables.color_variants.insert(variant.id, variant);
        Ok(())
    }

    pub async fn insert_size_variant(&self, variant: SizeVariant) -> Result<()> {
        let mut tables = self.tables.write().await;
        let label = variant.size_label.to_uppercase();
        if tables.size_variants.values().any(|s| {
            s.id != variant.id
                && s.color_variant_id == variant.color_variant_id
                && s.size_label.to_uppercase() == label
        }) {
            return Err(StoreError::UniqueViolation(
                "size_variants_color_label_key".to_string(),
            ));
        }
        tables.size_variants.insert(variant.id, variant);
        Ok(())
    }

    pub async fn insert_address(&self, address: Address) {
        self.tables
            .write()
            .await
            .addresses
            .insert(address.id, address);
    }

    pub async fn insert_shipping(&self, shipping: Shipping) {
        self.tables
            .write()
            .await
            .shippings
            .insert(shipping.id, shipping);
    }

    pub async fn insert_payment_method(&self, method: PaymentMethod) {
        self.tables
            .write()
            .await
            .payment_methods
            .insert(method.id, method);
    }

    /// Returns every activity entry written so far.
    pub async fn activity_log(&self) -> Vec<ActivityLog> {
        self.tables.read().await.activity.clone()
    }

    /// Returns the total number of committed transactions.
    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }

    /// Returns the total number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork::new(self.clone())))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn get_role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        let Some(granted) = tables.role_permissions.get(&role_id) else {
            return Ok(Vec::new());
        };
        Ok(granted
            .iter()
            .filter_map(|id| tables.permissions.get(id).cloned())
            .collect())
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        Ok(self.tables.read().await.addresses.get(&id).cloned())
    }

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>> {
        Ok(self.tables.read().await.shippings.get(&id).cloned())
    }

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        Ok(self.tables.read().await.payment_methods.get(&id).cloned())
    }

    async fn get_size_variant(&self, id: SizeVariantId) -> Result<Option<SizeVariant>> {
        Ok(self.tables.read().await.size_variants.get(&id).cloned())
    }

    async fn get_transaction(&self, tx_id: &TxId) -> Result<Option<TransactionRecord>> {
        Ok(self.tables.read().await.transactions.get(tx_id).cloned())
    }

    async fn get_orders_for_transaction(&self, tx_id: &TxId) -> Result<Vec<OrderRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| &o.tx_id == tx_id)
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.tables.read().await.orders.get(id).cloned())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn get_payments_for_transaction(&self, tx_id: &TxId) -> Result<Vec<PaymentRecord>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables
            .payments
            .values()
            .filter(|p| &p.tx_id == tx_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn address_owner(&self, id: AddressId) -> Result<Option<UserId>> {
        Ok(self.tables.read().await.addresses.get(&id).map(|a| a.user_id))
    }

    async fn transaction_owner(&self, tx_id: &TxId) -> Result<Option<UserId>> {
        Ok(self.tables.read().await.transaction_owner(tx_id))
    }

    async fn order_owner(&self, id: &OrderId) -> Result<Option<UserId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .get(id)
            .and_then(|o| tables.transaction_owner(&o.tx_id)))
    }

    async fn payment_owner(&self, id: PaymentId) -> Result<Option<UserId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .get(&id)
            .and_then(|p| tables.transaction_owner(&p.tx_id)))
    }

    async fn append_activity(&self, entry: ActivityLog) -> Result<()> {
        self.tables.write().await.activity.push(entry);
        Ok(())
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Writes are staged locally and overlay committed rows for reads made
/// through this unit of work.
pub struct InMemoryUnitOfWork {
    store: InMemoryStore,
    guards: HashMap<RowKey, RowGuard>,
    stock: HashMap<SizeVariantId, i32>,
    transactions: HashMap<TxId, TransactionRecord>,
    orders: BTreeMap<OrderId, OrderRecord>,
    payments: HashMap<PaymentId, PaymentRecord>,
}

impl InMemoryUnitOfWork {
    fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            guards: HashMap::new(),
            stock: HashMap::new(),
            transactions: HashMap::new(),
            orders: BTreeMap::new(),
            payments: HashMap::new(),
        }
    }

    async fn lock(&mut self, key: RowKey) -> Result<()> {
        if !self.guards.contains_key(&key) {
            let guard = self
                .store
                .locks
                .acquire(&key, self.store.lock_timeout)
                .await?;
            self.guards.insert(key, guard);
        }
        Ok(())
    }

    fn ensure_locked(&self, key: &RowKey) -> Result<()> {
        if self.guards.contains_key(key) {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                reason: format!("write to {key} without holding its lock"),
            })
        }
    }

    async fn current_transaction(&self, tx_id: &TxId) -> Option<TransactionRecord> {
        if let Some(tx) = self.transactions.get(tx_id) {
            return Some(tx.clone());
        }
        self.store.tables.read().await.transactions.get(tx_id).cloned()
    }

    async fn current_order(&self, id: &OrderId) -> Option<OrderRecord> {
        if let Some(order) = self.orders.get(id) {
            return Some(order.clone());
        }
        self.store.tables.read().await.orders.get(id).cloned()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.store.tables.read().await.products.get(&id).cloned())
    }

    async fn get_color_variant(&mut self, id: ColorVariantId) -> Result<Option<ColorVariant>> {
        Ok(self.store.tables.read().await.color_variants.get(&id).cloned())
    }

    async fn load_variant_for_update(&mut self, id: SizeVariantId) -> Result<Option<SizeVariant>> {
        self.lock(RowKey::SizeVariant(id)).await?;
        let committed = self.store.tables.read().await.size_variants.get(&id).cloned();
        Ok(committed.map(|mut variant| {
            if let Some(stock) = self.stock.get(&id) {
                variant.stock = *stock;
            }
            variant
        }))
    }

    async fn update_variant_stock(&mut self, id: SizeVariantId, stock: i32) -> Result<()> {
        self.ensure_locked(&RowKey::SizeVariant(id))?;
        if stock < 0 {
            return Err(StoreError::Decode(format!(
                "negative stock {stock} for size variant {id}"
            )));
        }
        self.stock.insert(id, stock);
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: &TransactionRecord) -> Result<()> {
        if self.current_transaction(&tx.tx_id).await.is_some() {
            return Err(StoreError::UniqueViolation("transactions_pkey".to_string()));
        }
        self.transactions.insert(tx.tx_id.clone(), tx.clone());
        Ok(())
    }

    async fn load_transaction_for_update(
        &mut self,
        tx_id: &TxId,
    ) -> Result<Option<TransactionRecord>> {
        self.lock(RowKey::Transaction(tx_id.clone())).await?;
        Ok(self.current_transaction(tx_id).await)
    }

    async fn update_transaction_total(
        &mut self,
        tx_id: &TxId,
        total: Money,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .current_transaction(tx_id)
            .await
            .ok_or_else(|| StoreError::Decode(format!("transaction {tx_id} does not exist")))?;
        tx.total_price = total;
        tx.updated_at = at;
        self.transactions.insert(tx_id.clone(), tx);
        Ok(())
    }

    async fn update_transaction_status(
        &mut self,
        tx_id: &TxId,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_locked(&RowKey::Transaction(tx_id.clone()))?;
        let mut tx = self
            .current_transaction(tx_id)
            .await
            .ok_or_else(|| StoreError::Decode(format!("transaction {tx_id} does not exist")))?;
        tx.status = status;
        tx.updated_at = at;
        self.transactions.insert(tx_id.clone(), tx);
        Ok(())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        if self.current_order(&order.id).await.is_some() {
            return Err(StoreError::UniqueViolation("orders_pkey".to_string()));
        }
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_orders_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<OrderRecord>> {
        let mut merged: BTreeMap<OrderId, OrderRecord> = self
            .store
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| &o.tx_id == tx_id)
            .map(|o| (o.id.clone(), o.clone()))
            .collect();
        for order in self.orders.values().filter(|o| &o.tx_id == tx_id) {
            merged.insert(order.id.clone(), order.clone());
        }
        Ok(merged.into_values().collect())
    }

    async fn update_order_status(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut order = self
            .current_order(id)
            .await
            .ok_or_else(|| StoreError::Decode(format!("order {id} does not exist")))?;
        self.ensure_locked(&RowKey::Transaction(order.tx_id.clone()))?;
        order.status = status;
        order.updated_at = at;
        self.orders.insert(id.clone(), order);
        Ok(())
    }

    async fn get_payments_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<PaymentRecord>> {
        let mut merged: HashMap<PaymentId, PaymentRecord> = self
            .store
            .tables
            .read()
            .await
            .payments
            .values()
            .filter(|p| &p.tx_id == tx_id)
            .map(|p| (p.id, p.clone()))
            .collect();
        for payment in self.payments.values().filter(|p| &p.tx_id == tx_id) {
            merged.insert(payment.id, payment.clone());
        }
        let mut payments: Vec<_> = merged.into_values().collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn load_payment_for_update(&mut self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        self.lock(RowKey::Payment(id)).await?;
        if let Some(payment) = self.payments.get(&id) {
            return Ok(Some(payment.clone()));
        }
        Ok(self.store.tables.read().await.payments.get(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        self.ensure_locked(&RowKey::Payment(payment.id))?;
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork {
            store,
            guards,
            stock,
            transactions,
            orders,
            payments,
        } = *self;

        {
            let mut tables = store.tables.write().await;
            for (id, level) in stock {
                if let Some(variant) = tables.size_variants.get_mut(&id) {
                    variant.stock = level;
                }
            }
            tables.transactions.extend(transactions);
            tables.orders.extend(orders);
            tables.payments.extend(payments);
        }

        // Locks go last so waiters observe the committed rows.
        drop(guards);
        Ok(())
    }
}
