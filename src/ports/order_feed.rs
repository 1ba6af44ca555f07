//! Order Feed Port - Order Update Ingestion Interface
//!
//! Defines the event envelope delivered by the ingestion side and the
//! trait an event source implements. The source only delivers events;
//! ordering per stream is whatever order it yields them in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Order;

/// Stream name used when an event does not name one.
pub const DEFAULT_STREAM: &str = "default";

/// One order update addressed to a named order stream.
///
/// A stream is typically one account/symbol pair; each stream owns an
/// independent ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
  /// Ledger this update belongs to.
  #[serde(default = "default_stream")]
  pub stream: String,
  /// The order update itself.
  pub order: Order,
}

impl OrderEvent {
  pub fn new(stream: impl Into<String>, order: Order) -> Self {
    Self {
      stream: stream.into(),
      order,
    }
  }
}

fn default_stream() -> String {
  DEFAULT_STREAM.to_string()
}

/// Trait for order update providers.
///
/// Implementors wrap an exchange order stream, a message queue or a
/// file and yield events one at a time.
#[async_trait]
pub trait OrderEventSource: Send + 'static {
  /// Next event, or `None` once the source is exhausted.
  ///
  /// # Errors
  /// Returns error on transport failure. Undecodable events should be
  /// skipped by the implementor, not surfaced here.
  async fn next_event(&mut self) -> anyhow::Result<Option<OrderEvent>>;

  /// Events skipped because they could not be decoded.
  fn skipped(&self) -> u64;
}
