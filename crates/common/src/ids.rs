//! Entity identifiers.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| IdParseError::new(stringify!($name), s))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a user account.
    UserId
);
uuid_id!(
    /// Identifier of a role.
    RoleId
);
uuid_id!(
    /// Identifier of a permission.
    PermissionId
);
uuid_id!(
    /// Identifier of a product category.
    CategoryId
);
uuid_id!(
    /// Identifier of a product.
    ProductId
);
uuid_id!(
    /// Identifier of a product color variant.
    ColorVariantId
);
uuid_id!(
    /// Identifier of a size variant, the unit that carries stock.
    SizeVariantId
);
uuid_id!(
    /// Identifier of a customer address.
    AddressId
);
uuid_id!(
    /// Identifier of a shipping option.
    ShippingId
);
uuid_id!(
    /// Identifier of a payment method (bank account).
    PaymentMethodId
);
uuid_id!(
    /// Identifier of a payment record.
    PaymentId
);
uuid_id!(
    /// Identifier of an activity log entry.
    ActivityId
);

/// Error returned when an identifier string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

impl IdParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

const SUFFIX_LEN: usize = 20;
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHIJKLMNOPQRSTUV";

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Builds a 20 character, lexically sortable suffix.
///
/// Layout (96 bits): 32-bit unix seconds, 24-bit process-wide sequence,
/// 40 random bits. Encoded with the base32hex alphabet, which preserves
/// byte order under string comparison.
fn sortable_suffix(now: DateTime<Utc>) -> String {
    let secs = u32::try_from(now.timestamp().max(0)).unwrap_or(u32::MAX);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;
    let random = Uuid::new_v4();

    let mut raw = [0u8; 12];
    raw[..4].copy_from_slice(&secs.to_be_bytes());
    raw[4..7].copy_from_slice(&seq.to_be_bytes()[1..]);
    raw[7..].copy_from_slice(&random.as_bytes()[..5]);

    let mut out = String::with_capacity(SUFFIX_LEN);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in raw {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1F) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1F) as usize] as char);
    }
    out
}

fn is_suffix(s: &str) -> bool {
    s.len() == SUFFIX_LEN && s.bytes().all(|b| ALPHABET.contains(&b))
}

/// Transaction identifier: `TRX-` followed by a sortable suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxId(String);

impl TxId {
    pub const PREFIX: &'static str = "TRX-";

    /// Generates a new transaction id stamped with `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self(format!("{}{}", Self::PREFIX, sortable_suffix(now)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TxId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(Self::PREFIX) {
            Some(suffix) if is_suffix(suffix) => Ok(Self(s.to_string())),
            _ => Err(IdParseError::new("TxId", s)),
        }
    }
}

impl TryFrom<String> for TxId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.0
    }
}

/// Order (line item) identifier: `TXO` followed by a sortable suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    pub const PREFIX: &'static str = "TXO";

    /// Generates a new order id stamped with `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self(format!("{}{}", Self::PREFIX, sortable_suffix(now)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(Self::PREFIX) {
            Some(suffix) if is_suffix(suffix) => Ok(Self(s.to_string())),
            _ => Err(IdParseError::new("OrderId", s)),
        }
    }
}

impl TryFrom<String> for OrderId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}
