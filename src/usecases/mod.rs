//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates the pure reconciler with the port interfaces.
//!
//! Use cases:
//! - `WatchWorker`: One-shot isolated reconciliation of a single event
//! - `LedgerService`: Per-stream ledgers, persistence and update fan-out

pub mod error;
pub mod ledger_service;
pub mod watch_worker;

pub use error::LedgerError;
pub use ledger_service::{DroppedEvent, LedgerService, LedgerUpdate};
pub use watch_worker::{ReconcileReply, ReconcileRequest, WatchWorker};
