//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `OrderEventSource`: Ingestion of single-order update events
//! - `SnapshotRepository`: Per-stream ledger snapshot persistence

pub mod order_feed;
pub mod repository;
