use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, ColorVariantId, Money, OrderId, OrderStatus, PaymentId, PaymentMethodId, ProductId,
    RoleId, ShippingId, SizeVariantId, TransactionStatus, TxId, UserId,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::model::{
    ActivityLog, Address, ColorVariant, OrderRecord, PaymentMethod, PaymentRecord, Permission,
    Product, Role, Shipping, ShippingState, SizeVariant, TransactionRecord, User,
};
use crate::store::{Store, UnitOfWork};
use crate::{Result, StoreError};

const TRANSACTION_COLUMNS: &str = "tx_id, address_id, shipping_id, payment_method_id, shipping_price, total_price, status, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, tx_id, product_id, color_variant_id, size_variant_id, unit_price, quantity, subtotal, status, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, tx_id, total_payment, status, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the `lock_timeout` applied to every store transaction.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn decode_err(column: &str, value: &str) -> StoreError {
    StoreError::Decode(format!("unexpected value {value:?} in column {column}"))
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role_id: RoleId::from_uuid(row.try_get::<Uuid, _>("role_id")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_role(row: PgRow) -> Result<Role> {
    Ok(Role {
        id: RoleId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_system_role: row.try_get("is_system_role")?,
        level: row.try_get("level")?,
    })
}

fn row_to_permission(row: PgRow) -> Result<Permission> {
    Ok(Permission {
        id: common::PermissionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        resource: row.try_get("resource")?,
        action: row.try_get("action")?,
        description: row.try_get("description")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        category_id: row
            .try_get::<Option<Uuid>, _>("category_id")?
            .map(common::CategoryId::from_uuid),
        base_price: Money::from_minor(row.try_get("base_price")?),
        description: row.try_get("description")?,
        rating: row.try_get("rating")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_color_variant(row: PgRow) -> Result<ColorVariant> {
    Ok(ColorVariant {
        id: ColorVariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        name: row.try_get("name")?,
        color_code: row.try_get("color_code")?,
        image_url: row.try_get("image_url")?,
    })
}

fn row_to_size_variant(row: PgRow) -> Result<SizeVariant> {
    Ok(SizeVariant {
        id: SizeVariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
        color_variant_id: ColorVariantId::from_uuid(row.try_get::<Uuid, _>("color_variant_id")?),
        size_label: row.try_get("size_label")?,
        stock: row.try_get("stock")?,
    })
}

fn row_to_address(row: PgRow) -> Result<Address> {
    Ok(Address {
        id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        recipient_name: row.try_get("recipient_name")?,
        phone: row.try_get("phone")?,
        province: row.try_get("province")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        postal_code: row.try_get("postal_code")?,
        full_address: row.try_get("full_address")?,
    })
}

fn row_to_shipping(row: PgRow) -> Result<Shipping> {
    let state: String = row.try_get("state")?;
    Ok(Shipping {
        id: ShippingId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_minor(row.try_get("price")?),
        state: ShippingState::parse(&state).ok_or_else(|| decode_err("state", &state))?,
    })
}

fn row_to_payment_method(row: PgRow) -> Result<PaymentMethod> {
    Ok(PaymentMethod {
        id: PaymentMethodId::from_uuid(row.try_get::<Uuid, _>("id")?),
        account_name: row.try_get("account_name")?,
        account_number: row.try_get("account_number")?,
        bank_name: row.try_get("bank_name")?,
        image_url: row.try_get("image_url")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<TransactionRecord> {
    let tx_id: String = row.try_get("tx_id")?;
    let status: String = row.try_get("status")?;
    Ok(TransactionRecord {
        tx_id: tx_id.parse().map_err(|_| decode_err("tx_id", &tx_id))?,
        address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("address_id")?),
        shipping_id: ShippingId::from_uuid(row.try_get::<Uuid, _>("shipping_id")?),
        payment_method_id: PaymentMethodId::from_uuid(row.try_get::<Uuid, _>("payment_method_id")?),
        shipping_price: Money::from_minor(row.try_get("shipping_price")?),
        total_price: Money::from_minor(row.try_get("total_price")?),
        status: status.parse::<TransactionStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let id: String = row.try_get("id")?;
    let tx_id: String = row.try_get("tx_id")?;
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: id.parse().map_err(|_| decode_err("id", &id))?,
        tx_id: tx_id.parse().map_err(|_| decode_err("tx_id", &tx_id))?,
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        color_variant_id: ColorVariantId::from_uuid(row.try_get::<Uuid, _>("color_variant_id")?),
        size_variant_id: SizeVariantId::from_uuid(row.try_get::<Uuid, _>("size_variant_id")?),
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        quantity: row.try_get("quantity")?,
        subtotal: Money::from_minor(row.try_get("subtotal")?),
        status: status.parse::<OrderStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
    let tx_id: String = row.try_get("tx_id")?;
    let status: String = row.try_get("status")?;
    Ok(PaymentRecord {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        tx_id: tx_id.parse().map_err(|_| decode_err("tx_id", &tx_id))?,
        total_payment: Money::from_minor(row.try_get("total_payment")?),
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn fetch_owner(pool: &PgPool, sql: &str, key: &str) -> Result<Option<UserId>> {
    let owner: Option<Uuid> = sqlx::query_scalar(sql)
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(owner.map(UserId::from_uuid))
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we format.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query(
            "SELECT id, email, username, password_hash, role_id, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_user)
        .transpose()
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        sqlx::query("SELECT id, name, description, is_system_role, level FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_role)
            .transpose()
    }

    async fn get_role_permissions(&self, role_id: RoleId) -> Result<Vec<Permission>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.resource, p.action, p.description
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_permission).collect()
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        sqlx::query(
            r#"
            SELECT id, user_id, recipient_name, phone, province, city, district, postal_code, full_address
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_address)
        .transpose()
    }

    async fn get_shipping(&self, id: ShippingId) -> Result<Option<Shipping>> {
        sqlx::query("SELECT id, name, price, state FROM shippings WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_shipping)
            .transpose()
    }

    async fn get_payment_method(&self, id: PaymentMethodId) -> Result<Option<PaymentMethod>> {
        sqlx::query(
            "SELECT id, account_name, account_number, bank_name, image_url, is_active FROM payment_methods WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_payment_method)
        .transpose()
    }

    async fn get_size_variant(&self, id: SizeVariantId) -> Result<Option<SizeVariant>> {
        sqlx::query("SELECT id, color_variant_id, size_label, stock FROM size_variants WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_size_variant)
            .transpose()
    }

    async fn get_transaction(&self, tx_id: &TxId) -> Result<Option<TransactionRecord>> {
        sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE tx_id = $1"
        ))
        .bind(tx_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_transaction)
        .transpose()
    }

    async fn get_orders_for_transaction(&self, tx_id: &TxId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tx_id = $1 ORDER BY id ASC"
        ))
        .bind(tx_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<OrderRecord>> {
        sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_order)
            .transpose()
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_payment)
            .transpose()
    }

    async fn get_payments_for_transaction(&self, tx_id: &TxId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE tx_id = $1 ORDER BY created_at ASC"
        ))
        .bind(tx_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn address_owner(&self, id: AddressId) -> Result<Option<UserId>> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM addresses WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(UserId::from_uuid))
    }

    async fn transaction_owner(&self, tx_id: &TxId) -> Result<Option<UserId>> {
        fetch_owner(
            &self.pool,
            r#"
            SELECT a.user_id
            FROM transactions t
            JOIN addresses a ON a.id = t.address_id
            WHERE t.tx_id = $1
            "#,
            tx_id.as_str(),
        )
        .await
    }

    async fn order_owner(&self, id: &OrderId) -> Result<Option<UserId>> {
        fetch_owner(
            &self.pool,
            r#"
            SELECT a.user_id
            FROM orders o
            JOIN transactions t ON t.tx_id = o.tx_id
            JOIN addresses a ON a.id = t.address_id
            WHERE o.id = $1
            "#,
            id.as_str(),
        )
        .await
    }

    async fn payment_owner(&self, id: PaymentId) -> Result<Option<UserId>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT a.user_id
            FROM payments p
            JOIN transactions t ON t.tx_id = p.tx_id
            JOIN addresses a ON a.id = t.address_id
            WHERE p.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner.map(UserId::from_uuid))
    }

    async fn append_activity(&self, entry: ActivityLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, user_id, action, resource, details, ip_address, user_agent, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Unit of work over one PostgreSQL transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn execute_expecting_row(
        &mut self,
        query: sqlx::query::Query<'_, Postgres, PgArguments>,
        what: &str,
    ) -> Result<()> {
        let result = query.execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Decode(format!("no {what} row was updated")));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query(
            "SELECT id, name, category_id, base_price, description, rating, deleted_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_product)
        .transpose()
    }

    async fn get_color_variant(&mut self, id: ColorVariantId) -> Result<Option<ColorVariant>> {
        sqlx::query(
            "SELECT id, product_id, name, color_code, image_url FROM color_variants WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_color_variant)
        .transpose()
    }

    async fn load_variant_for_update(&mut self, id: SizeVariantId) -> Result<Option<SizeVariant>> {
        sqlx::query(
            "SELECT id, color_variant_id, size_label, stock FROM size_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_size_variant)
        .transpose()
    }

    async fn update_variant_stock(&mut self, id: SizeVariantId, stock: i32) -> Result<()> {
        let query = sqlx::query("UPDATE size_variants SET stock = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(stock);
        self.execute_expecting_row(query, "size variant").await
    }

    async fn insert_transaction(&mut self, tx: &TransactionRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(tx.tx_id.as_str())
        .bind(tx.address_id.as_uuid())
        .bind(tx.shipping_id.as_uuid())
        .bind(tx.payment_method_id.as_uuid())
        .bind(tx.shipping_price.minor())
        .bind(tx.total_price.minor())
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn load_transaction_for_update(
        &mut self,
        tx_id: &TxId,
    ) -> Result<Option<TransactionRecord>> {
        sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE tx_id = $1 FOR UPDATE"
        ))
        .bind(tx_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_transaction)
        .transpose()
    }

    async fn update_transaction_total(
        &mut self,
        tx_id: &TxId,
        total: Money,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query =
            sqlx::query("UPDATE transactions SET total_price = $2, updated_at = $3 WHERE tx_id = $1")
                .bind(tx_id.as_str())
                .bind(total.minor())
                .bind(at);
        self.execute_expecting_row(query, "transaction").await
    }

    async fn update_transaction_status(
        &mut self,
        tx_id: &TxId,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query =
            sqlx::query("UPDATE transactions SET status = $2, updated_at = $3 WHERE tx_id = $1")
                .bind(tx_id.as_str())
                .bind(status.as_str())
                .bind(at);
        self.execute_expecting_row(query, "transaction").await
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.as_str())
        .bind(order.tx_id.as_str())
        .bind(order.product_id.as_uuid())
        .bind(order.color_variant_id.as_uuid())
        .bind(order.size_variant_id.as_uuid())
        .bind(order.unit_price.minor())
        .bind(order.quantity)
        .bind(order.subtotal.minor())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_orders_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tx_id = $1 ORDER BY id ASC"
        ))
        .bind(tx_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn update_order_status(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(status.as_str())
            .bind(at);
        self.execute_expecting_row(query, "order").await
    }

    async fn get_payments_for_transaction(&mut self, tx_id: &TxId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE tx_id = $1 ORDER BY created_at ASC"
        ))
        .bind(tx_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn load_payment_for_update(&mut self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_payment)
        .transpose()
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.tx_id.as_str())
        .bind(payment.total_payment.minor())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        let query = sqlx::query(
            "UPDATE payments SET total_payment = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.total_payment.minor())
        .bind(payment.status.as_str())
        .bind(payment.updated_at);
        self.execute_expecting_row(query, "payment").await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
