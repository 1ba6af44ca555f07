//! Order ledger domain types.
//!
//! Defines the order record as it flows through the reconciler and the
//! two rolling collections it evolves: the recency-ordered recent-orders
//! buffer and the open-orders collection.
//!
//! Orders are loose: only `id` and `status` are interpreted,
//! every other field (price, amount, symbol, ...) is carried through as an
//! opaque JSON map so exchange payloads survive a round trip untouched.
//! Neither `id` nor `status` is validated; any JSON value is accepted.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ────────────────────────────────────────────
// Type aliases
// ────────────────────────────────────────────

/// Recency-ordered buffer of recently touched orders (most recent at the tail).
pub type RecentOrders = VecDeque<Order>;

/// Orders currently believed to be open. May hold duplicate ids.
pub type OpenOrders = Vec<Order>;

// ────────────────────────────────────────────
// Order id
// ────────────────────────────────────────────

/// Opaque exchange-assigned order identifier.
///
/// Kept as the raw JSON value so numeric ids serialize back as numbers.
/// Ids match only on exact value equality: `7` and `"7"` are different ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Value);

impl OrderId {
    /// The id as text, if it was sent as a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for OrderId {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(Value::String(s))
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(Value::from(s))
    }
}

impl From<u64> for OrderId {
    fn from(n: u64) -> Self {
        Self(Value::from(n))
    }
}

impl From<i64> for OrderId {
    fn from(n: i64) -> Self {
        Self(Value::from(n))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

// ────────────────────────────────────────────
// Order status
// ────────────────────────────────────────────

/// Lifecycle status reported for an order.
///
/// Only the four variants below drive open-order membership. Every other
/// status string (`partially_filled`, `filled`, `new`, ...) is preserved
/// verbatim in `Other`; non-string values (`null`, numbers, ...) in `Raw`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum OrderStatus {
    /// Resting on the book.
    Open,
    /// Fully filled and closed.
    Closed,
    /// Cancelled by the user or the venue.
    Canceled,
    /// Expired by time-in-force.
    Expired,
    /// Any status string the reconciler does not act on.
    Other(String),
    /// A status that is not a string at all.
    Raw(Value),
    /// No status field was sent.
    #[default]
    Missing,
}

impl OrderStatus {
    /// Statuses that remove an order from the open set.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Canceled | Self::Expired)
    }

    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Status text; empty for non-string and missing statuses.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Other(s) => s,
            Self::Raw(_) | Self::Missing => "",
        }
    }
}

impl From<Value> for OrderStatus {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::from(s),
            other => Self::Raw(other),
        }
    }
}

impl From<OrderStatus> for Value {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Raw(v) => v,
            OrderStatus::Missing => Self::Null,
            text => Self::String(text.into()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "canceled" => Self::Canceled,
            "expired" => Self::Expired,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Other(s) => s,
            OrderStatus::Raw(v) => v.to_string(),
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(v) => write!(f, "{v}"),
            _ => f.write_str(self.as_str()),
        }
    }
}

// ────────────────────────────────────────────
// Order
// ────────────────────────────────────────────

/// A single order update as received from the exchange stream.
///
/// A missing or `null` `id` is tolerated: such an order never matches an
/// existing entry and is therefore always treated as a fresh insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange order ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
    /// Reported lifecycle status.
    #[serde(default, skip_serializing_if = "OrderStatus::is_missing")]
    pub status: OrderStatus,
    /// Remaining payload, opaque to the reconciler.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Order {
    /// Create an order with the given id and status and no extra fields.
    pub fn new(id: impl Into<OrderId>, status: impl Into<OrderStatus>) -> Self {
        Self {
            id: Some(id.into()),
            status: status.into(),
            fields: Map::new(),
        }
    }

    /// Attach an opaque payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub const fn id(&self) -> Option<&OrderId> {
        self.id.as_ref()
    }

    /// Whether this order carries the given id. A missing id on either
    /// side never matches.
    pub fn has_id(&self, id: Option<&OrderId>) -> bool {
        match (self.id(), id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }
}

// ────────────────────────────────────────────
// Reconciliation state
// ────────────────────────────────────────────

/// The pair of collections threaded through every reconciliation.
///
/// Owned by exactly one caller between calls; the reconciler consumes it
/// and hands back the successor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationState {
    /// Recency-ordered recent orders.
    #[serde(default)]
    pub orders: RecentOrders,
    /// Orders believed open.
    #[serde(default)]
    pub open_orders: OpenOrders,
}

impl ReconciliationState {
    pub fn new(orders: impl IntoIterator<Item = Order>, open_orders: OpenOrders) -> Self {
        Self {
            orders: orders.into_iter().collect(),
            open_orders,
        }
    }

    /// Ids in the recent buffer as text, oldest first. Missing ids are skipped.
    pub fn recent_ids(&self) -> Vec<String> {
        self.orders
            .iter()
            .filter_map(Order::id)
            .map(OrderId::to_string)
            .collect()
    }

    /// Ids in the open collection as text, in stored order (duplicates included).
    pub fn open_ids(&self) -> Vec<String> {
        self.open_orders
            .iter()
            .filter_map(Order::id)
            .map(OrderId::to_string)
            .collect()
    }
}
