//! Errors raised around the reconciler: worker handoff and snapshot I/O.
//!
//! The merge itself never fails; everything here comes from the host
//! plumbing that feeds it.

use thiserror::Error;

/// Errors that can occur while dispatching or persisting a reconciliation.
#[derive(Error, Debug)]
pub enum LedgerError {
  /// The one-shot worker task panicked before replying
  #[error("Reconcile worker panicked: {0}")]
  WorkerPanicked(String),

  /// The worker task ended without sending its reply
  #[error("Reconcile worker exited without replying")]
  WorkerDropped,

  /// A reconcile message could not be decoded or encoded
  #[error("Invalid reconcile message: {0}")]
  Message(#[from] serde_json::Error),

  /// Loading a stream snapshot failed; the event was not applied
  #[error("Snapshot restore failed for stream {stream}: {message}")]
  Restore { stream: String, message: String },

  /// Saving or listing stream snapshots failed
  #[error("Snapshot persistence failed for stream {stream}: {message}")]
  Persistence { stream: String, message: String },
}

impl LedgerError {
  pub(crate) fn restore(stream: &str, err: &anyhow::Error) -> Self {
    Self::Restore {
      stream: stream.to_string(),
      message: format!("{err:#}"),
    }
  }

  pub(crate) fn persistence(stream: &str, err: &anyhow::Error) -> Self {
    Self::Persistence {
      stream: stream.to_string(),
      message: format!("{err:#}"),
    }
  }
}
