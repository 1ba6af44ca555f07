//! Persistence Adapters - Ledger Snapshot Storage
//!
//! Implements the `SnapshotRepository` port with atomic per-stream JSON
//! files, plus an in-memory variant for tests and dry runs.
//! No database dependency; files are replaced atomically.

pub mod memory;
pub mod state;

pub use memory::InMemoryRepository;
pub use state::StateStore;
