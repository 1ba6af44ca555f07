//! Property-based tests for reconciler invariants
//!
//! Uses `proptest` to check the reconciler against a straightforward
//! model over random event sequences: the recent buffer is always the
//! most recently touched distinct ids, and open-order multiplicity
//! follows the open/terminal history of each id.

use std::collections::HashMap;

use proptest::prelude::*;

use order_ledger_watch::domain::{
    Order, RECENT_ORDERS_CAPACITY, Reconciler, ReconciliationState,
};

const STATUSES: &[&str] = &[
    "open",
    "closed",
    "canceled",
    "expired",
    "partially_filled",
    "filled",
];

fn event() -> impl Strategy<Value = (u8, usize)> {
    (0u8..60, 0..STATUSES.len())
}

fn run(reconciler: Reconciler, events: &[(u8, usize)]) -> ReconciliationState {
    events.iter().fold(ReconciliationState::default(), |state, (id, status)| {
        reconciler.reconcile(state, Order::new(id.to_string(), STATUSES[*status]))
    })
}

/// Ids ordered by last touch, keeping the newest `capacity`.
fn expected_recent(events: &[(u8, usize)], capacity: usize) -> Vec<String> {
    let mut last_touch: HashMap<u8, usize> = HashMap::new();
    for (i, (id, _)) in events.iter().enumerate() {
        last_touch.insert(*id, i);
    }
    let mut ids: Vec<(usize, u8)> = last_touch.into_iter().map(|(id, t)| (t, id)).collect();
    ids.sort_unstable();
    let skip = ids.len().saturating_sub(capacity);
    ids.into_iter().skip(skip).map(|(_, id)| id.to_string()).collect()
}

/// Open-order multiplicity per id: `open` adds one, terminal clears.
fn expected_open_counts(events: &[(u8, usize)]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (id, status) in events {
        match STATUSES[*status] {
            "open" => *counts.entry(id.to_string()).or_default() += 1,
            "closed" | "canceled" | "expired" => {
                counts.remove(&id.to_string());
            }
            _ => {}
        }
    }
    counts
}

fn open_counts(state: &ReconciliationState) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in state.open_ids() {
        *counts.entry(id).or_default() += 1;
    }
    counts
}

// ── Recent buffer ───────────────────────────────────────────

proptest! {
    /// Never more than 40 entries, and exactly the newest distinct ids.
    #[test]
    fn recent_buffer_is_newest_distinct_ids(
        events in prop::collection::vec(event(), 0..200),
    ) {
        let state = run(Reconciler::default(), &events);
        prop_assert!(state.orders.len() <= RECENT_ORDERS_CAPACITY);

        let actual: Vec<String> = state.recent_ids();
        prop_assert_eq!(actual, expected_recent(&events, RECENT_ORDERS_CAPACITY));
    }

    /// The tail always carries the last event verbatim.
    #[test]
    fn tail_is_last_event(
        events in prop::collection::vec(event(), 1..100),
    ) {
        let state = run(Reconciler::default(), &events);
        let (id, status) = events[events.len() - 1];
        let expected = Order::new(id.to_string(), STATUSES[status]);
        prop_assert_eq!(state.orders.back(), Some(&expected));
    }

    /// Smaller capacities bound the buffer the same way.
    #[test]
    fn custom_capacity_is_respected(
        capacity in 1usize..20,
        events in prop::collection::vec(event(), 0..120),
    ) {
        let state = run(Reconciler::new(capacity), &events);
        prop_assert!(state.orders.len() <= capacity);
        let actual: Vec<String> = state.recent_ids();
        prop_assert_eq!(actual, expected_recent(&events, capacity));
    }
}

// ── Open orders ─────────────────────────────────────────────

proptest! {
    /// Open-order multiplicity follows the open/terminal history.
    #[test]
    fn open_orders_follow_status_history(
        events in prop::collection::vec(event(), 0..200),
    ) {
        let state = run(Reconciler::default(), &events);
        prop_assert_eq!(open_counts(&state), expected_open_counts(&events));
    }

    /// Strict mode keeps open orders unique and only for ids last seen open.
    #[test]
    fn strict_open_set_has_unique_ids(
        events in prop::collection::vec(event(), 0..200),
    ) {
        let state = run(Reconciler::default().with_strict_open_set(true), &events);
        let counts = open_counts(&state);
        prop_assert!(counts.values().all(|&n| n == 1));

        let mut last_status: HashMap<String, &str> = HashMap::new();
        for (id, status) in &events {
            last_status.insert(id.to_string(), STATUSES[*status]);
        }
        for id in counts.keys() {
            prop_assert_eq!(last_status.get(id).copied(), Some("open"));
        }
        let open_now = last_status.values().filter(|s| **s == "open").count();
        prop_assert_eq!(counts.len(), open_now);
    }
}
