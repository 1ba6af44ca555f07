//! Order Ledger Reconciler - Bounded Recency Merge
//!
//! Folds one order update into a `ReconciliationState`:
//! 1. Locate the order id in the recent buffer (linear scan)
//! 2. Upsert it at the tail (move-to-most-recent on update)
//! 3. Evict at most one entry from the head when over capacity
//! 4. Adjust open-order membership from the reported status
//!
//! Pure and infallible. The state is taken by value and the successor
//! returned, so no snapshot is ever shared between caller and worker.

use serde::{Deserialize, Serialize};

use super::order::{Order, OrderId, ReconciliationState};

/// Capacity of the recent-orders buffer.
pub const RECENT_ORDERS_CAPACITY: usize = 40;

/// How the recent buffer absorbed the incoming order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Upsert {
    /// Unknown id, appended at the tail.
    Inserted,
    /// Known id, replaced and relocated from `from_index` to the tail.
    Moved { from_index: usize },
}

/// What happened to the open-orders collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenOrdersChange {
    /// Incoming order appended.
    Appended,
    /// Existing entry replaced in place (strict mode only).
    Replaced,
    /// `count` entries with the order's id removed (may be zero).
    Removed { count: usize },
    /// Status not acted on.
    Untouched,
}

/// Summary of a single reconciliation, for logging and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub upsert: Upsert,
    /// Entry dropped from the head of the recent buffer, if any.
    pub evicted: Option<Order>,
    pub open_orders: OpenOrdersChange,
}

/// Successor state plus the outcome that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub state: ReconciliationState,
    pub outcome: ReconcileOutcome,
}

/// Merge policy for order updates.
///
/// The default (`strict_open_set = false`) reproduces the observed
/// behaviour exactly: `open` appends without a duplicate check and
/// non-terminal, non-open statuses leave open orders untouched.
/// Strict mode keeps open orders keyed by id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciler {
    capacity: usize,
    strict_open_set: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(RECENT_ORDERS_CAPACITY)
    }
}

impl Reconciler {
    /// Create a reconciler with the given recent-buffer capacity.
    ///
    /// A zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            strict_open_set: false,
        }
    }

    /// Toggle id-keyed open-order semantics.
    #[must_use]
    pub const fn with_strict_open_set(mut self, strict: bool) -> Self {
        self.strict_open_set = strict;
        self
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn is_strict(&self) -> bool {
        self.strict_open_set
    }

    /// Apply `incoming` to `state` and return the successor state.
    pub fn reconcile(&self, state: ReconciliationState, incoming: Order) -> ReconciliationState {
        self.apply(state, incoming).state
    }

    /// Apply `incoming` to `state`, reporting what changed.
    pub fn apply(&self, mut state: ReconciliationState, incoming: Order) -> Reconciliation {
        let id = incoming.id.clone();
        let id = id.as_ref();

        // Recent buffer: replace + move to tail, or append.
        let upsert = match state.orders.iter().position(|o| o.has_id(id)) {
            Some(from_index) => {
                state.orders.remove(from_index);
                Upsert::Moved { from_index }
            }
            None => Upsert::Inserted,
        };
        state.orders.push_back(incoming.clone());

        // At most one insertion per call, so at most one eviction.
        let evicted = if state.orders.len() > self.capacity {
            state.orders.pop_front()
        } else {
            None
        };

        let open_orders = if self.strict_open_set {
            Self::update_open_strict(&mut state, incoming, id)
        } else {
            Self::update_open(&mut state, incoming, id)
        };

        Reconciliation {
            state,
            outcome: ReconcileOutcome {
                upsert,
                evicted,
                open_orders,
            },
        }
    }

    fn update_open(
        state: &mut ReconciliationState,
        incoming: Order,
        id: Option<&OrderId>,
    ) -> OpenOrdersChange {
        if incoming.status.is_terminal() {
            OpenOrdersChange::Removed {
                count: Self::remove_open(state, id),
            }
        } else if incoming.status.is_open() {
            state.open_orders.push(incoming);
            OpenOrdersChange::Appended
        } else {
            OpenOrdersChange::Untouched
        }
    }

    fn update_open_strict(
        state: &mut ReconciliationState,
        incoming: Order,
        id: Option<&OrderId>,
    ) -> OpenOrdersChange {
        if !incoming.status.is_open() {
            return OpenOrdersChange::Removed {
                count: Self::remove_open(state, id),
            };
        }

        if !state.open_orders.iter().any(|o| o.has_id(id)) {
            state.open_orders.push(incoming);
            return OpenOrdersChange::Appended;
        }

        // Keep the first slot, drop any duplicates left by lenient mode.
        let mut seen = false;
        state.open_orders.retain(|o| {
            if !o.has_id(id) {
                return true;
            }
            !std::mem::replace(&mut seen, true)
        });
        if let Some(slot) = state.open_orders.iter_mut().find(|o| o.has_id(id)) {
            *slot = incoming;
        }
        OpenOrdersChange::Replaced
    }

    fn remove_open(state: &mut ReconciliationState, id: Option<&OrderId>) -> usize {
        let before = state.open_orders.len();
        state.open_orders.retain(|o| !o.has_id(id));
        before - state.open_orders.len()
    }
}

/// Reconcile with the default policy (capacity 40, lenient open orders).
pub fn reconcile(state: ReconciliationState, incoming: Order) -> ReconciliationState {
    Reconciler::default().reconcile(state, incoming)
}
