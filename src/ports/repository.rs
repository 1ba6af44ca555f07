//! Repository Port - Ledger Snapshot Persistence Interface
//!
//! The reconciler owns no state between events; the caller persists the
//! returned snapshot after each one. This trait is where it goes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ReconciliationState;

/// Persisted ledger of one order stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
  /// Stream this ledger belongs to.
  pub stream: String,
  /// Number of events reconciled into this ledger so far.
  #[serde(default)]
  pub events_applied: u64,
  /// When the snapshot was taken.
  pub updated_at: DateTime<Utc>,
  /// `orders` and `openOrders`.
  #[serde(flatten)]
  pub state: ReconciliationState,
}

impl LedgerSnapshot {
  /// Snapshot `state` for `stream`, stamped with the current time.
  pub fn new(stream: impl Into<String>, events_applied: u64, state: ReconciliationState) -> Self {
    Self {
      stream: stream.into(),
      events_applied,
      updated_at: Utc::now(),
      state,
    }
  }
}

/// Trait for snapshot persistence providers.
#[async_trait]
pub trait SnapshotRepository: Send + Sync + 'static {
  /// Load the latest snapshot for a stream, `None` if never saved.
  async fn load(&self, stream: &str) -> anyhow::Result<Option<LedgerSnapshot>>;

  /// Replace the stored snapshot for `snapshot.stream`.
  async fn save(&self, snapshot: &LedgerSnapshot) -> anyhow::Result<()>;

  /// Names of all streams with a stored snapshot.
  async fn list_streams(&self) -> anyhow::Result<Vec<String>>;

  /// Check if the repository is healthy (disk space, permissions).
  async fn is_healthy(&self) -> bool;
}
