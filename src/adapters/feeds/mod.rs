//! Order Feed Adapters
//!
//! Concrete `OrderEventSource` implementations. The exchange-facing
//! ingestion lives outside this crate and hands events over as JSON Lines.

pub mod jsonl;

pub use jsonl::JsonlFeed;
