//! Watch Worker - One-shot Isolated Reconciliation
//!
//! Every order event is reconciled on its own short-lived task from the
//! runtime's blocking pool:
//! - the task receives the full snapshot by value,
//! - replies exactly once over a one-shot channel,
//! - and is gone once the reply is sent.
//!
//! No worker identity survives between events, so the async event loop
//! never runs the merge itself and never shares a snapshot with it.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, instrument};

use super::error::LedgerError;
use crate::domain::{
  OpenOrders, Order, RecentOrders, Reconciler, Reconciliation, ReconciliationState,
};

/// Message handed to a worker: current snapshot plus the incoming update.
///
/// Wire shape: `{ "orders": [...], "openOrders": [...], "order": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
  /// Current recent-orders snapshot.
  #[serde(default)]
  pub orders: RecentOrders,
  /// Current open-orders snapshot.
  #[serde(default)]
  pub open_orders: OpenOrders,
  /// The incoming order update.
  pub order: Order,
}

impl ReconcileRequest {
  pub fn new(state: ReconciliationState, order: Order) -> Self {
    Self {
      orders: state.orders,
      open_orders: state.open_orders,
      order,
    }
  }

  fn into_parts(self) -> (ReconciliationState, Order) {
    let state = ReconciliationState {
      orders: self.orders,
      open_orders: self.open_orders,
    };
    (state, self.order)
  }
}

/// Message posted back by a worker: the updated snapshots.
///
/// Wire shape: `{ "orders": [...], "openOrders": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReply {
  pub orders: RecentOrders,
  pub open_orders: OpenOrders,
}

impl From<ReconciliationState> for ReconcileReply {
  fn from(state: ReconciliationState) -> Self {
    Self {
      orders: state.orders,
      open_orders: state.open_orders,
    }
  }
}

impl From<ReconcileReply> for ReconciliationState {
  fn from(reply: ReconcileReply) -> Self {
    Self {
      orders: reply.orders,
      open_orders: reply.open_orders,
    }
  }
}

/// Dispatches reconcile requests to fresh one-shot worker tasks.
///
/// Cheap to copy; holds only the merge policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchWorker {
  reconciler: Reconciler,
}

impl WatchWorker {
  pub const fn new(reconciler: Reconciler) -> Self {
    Self { reconciler }
  }

  pub const fn reconciler(&self) -> Reconciler {
    self.reconciler
  }

  /// Reconcile one request on a fresh blocking task and await its reply.
  ///
  /// # Errors
  /// `WorkerPanicked` if the task panicked, `WorkerDropped` if it ended
  /// without replying.
  #[instrument(skip_all, fields(order_id = ?request.order.id, status = %request.order.status))]
  pub async fn dispatch(&self, request: ReconcileRequest) -> Result<Reconciliation, LedgerError> {
    let reconciler = self.reconciler;
    let (reply_tx, reply_rx) = oneshot::channel();

    let handle = tokio::task::spawn_blocking(move || {
      let (state, order) = request.into_parts();
      // Receiver gone means the caller stopped waiting.
      let _ = reply_tx.send(reconciler.apply(state, order));
    });

    match reply_rx.await {
      Ok(reconciliation) => {
        debug!(
          orders = reconciliation.state.orders.len(),
          open_orders = reconciliation.state.open_orders.len(),
          evicted = reconciliation.outcome.evicted.is_some(),
          "Worker replied"
        );
        Ok(reconciliation)
      }
      Err(_) => match handle.await {
        Err(e) if e.is_panic() => {
          error!(error = %e, "Reconcile worker panicked");
          Err(LedgerError::WorkerPanicked(e.to_string()))
        }
        _ => Err(LedgerError::WorkerDropped),
      },
    }
  }

  /// Message-passing entry point: JSON request in, JSON reply out.
  ///
  /// # Errors
  /// `Message` if the request is not a valid reconcile message, plus any
  /// error from [`Self::dispatch`].
  pub async fn handle_json(&self, message: &str) -> Result<String, LedgerError> {
    let request: ReconcileRequest = serde_json::from_str(message)?;
    let reconciliation = self.dispatch(request).await?;
    let reply = ReconcileReply::from(reconciliation.state);
    Ok(serde_json::to_string(&reply)?)
  }
}
