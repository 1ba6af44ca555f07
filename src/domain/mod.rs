//! Domain layer - Order ledger model and reconciliation.
//!
//! Pure, synchronous logic with no I/O (hexagonal architecture inner
//! ring). Everything here is serializable and testable in isolation.

pub mod order;
pub mod reconciler;

// Re-export core types for convenience
pub use order::{OpenOrders, Order, OrderId, OrderStatus, RecentOrders, ReconciliationState};
pub use reconciler::{
    OpenOrdersChange, ReconcileOutcome, Reconciler, Reconciliation, Upsert,
    RECENT_ORDERS_CAPACITY, reconcile,
};
