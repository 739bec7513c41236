//! Persisted entity records.
//!
//! Each record mirrors one table row. Relations are carried as ids only;
//! nothing here is loaded implicitly.

use chrono::{DateTime, Utc};
use common::{
    ActivityId, AddressId, CategoryId, ColorVariantId, Money, OrderId, OrderStatus, PaymentId,
    PaymentMethodId, PaymentStatus, PermissionId, ProductId, RoleId, ShippingId, SizeVariantId,
    TransactionStatus, TxId, UserId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: RoleId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    /// Seeded roles: name-immutable, undeletable while assigned.
    pub is_system_role: bool,
    /// Higher levels may manage users holding lower levels.
    pub level: i32,
}

/// A permission named `{resource}.{action}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: String,
}

impl Permission {
    /// Builds a permission whose name is derived from resource and action.
    pub fn new(resource: &str, action: &str) -> Self {
        Self {
            id: PermissionId::new(),
            name: format!("{resource}.{action}"),
            resource: resource.to_string(),
            action: action.to_string(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub base_price: Money,
    pub description: String,
    pub rating: f64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorVariant {
    pub id: ColorVariantId,
    pub product_id: ProductId,
    pub name: String,
    pub color_code: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeVariant {
    pub id: SizeVariantId,
    pub color_variant_id: ColorVariantId,
    pub size_label: String,
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
    pub full_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingState {
    Active,
    Inactive,
}

impl ShippingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingState::Active => "active",
            ShippingState::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ShippingState::Active),
            "inactive" => Some(ShippingState::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipping {
    pub id: ShippingId,
    pub name: String,
    pub price: Money,
    pub state: ShippingState,
}

impl Shipping {
    pub fn is_active(&self) -> bool {
        self.state == ShippingState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub account_name: String,
    pub account_number: String,
    pub bank_name: String,
    pub image_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub tx_id: TxId,
    pub address_id: AddressId,
    pub shipping_id: ShippingId,
    pub payment_method_id: PaymentMethodId,
    pub shipping_price: Money,
    pub total_price: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line item of a transaction. Immutable after creation except `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: OrderId,
    pub tx_id: TxId,
    pub product_id: ProductId,
    pub color_variant_id: ColorVariantId,
    pub size_variant_id: SizeVariantId,
    /// Product base price observed at checkout.
    pub unit_price: Money,
    pub quantity: i32,
    pub subtotal: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub tx_id: TxId,
    pub total_payment: Money,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: ActivityId,
    pub user_id: UserId,
    pub action: String,
    pub resource: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}
