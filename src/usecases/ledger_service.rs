//! Ledger Service - Per-stream Order Ledger Orchestration
//!
//! Owns one `ReconciliationState` per named order stream and threads it
//! through the watch worker one event at a time:
//! - Restores a stream's snapshot from the repository on first touch
//! - Serializes events per stream (exactly one in flight)
//! - Persists the successor snapshot after every event
//! - Re-broadcasts each update to subscribers
//! - Reports events the run loop had to drop
//!
//! Distinct streams are independent and may reconcile concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument, warn};

use super::error::LedgerError;
use super::watch_worker::{ReconcileRequest, WatchWorker};
use crate::config::LedgerConfig;
use crate::domain::{
  OpenOrdersChange, Order, OrderId, OrderStatus, Reconciler, Reconciliation, ReconciliationState,
  Upsert,
};
use crate::ports::order_feed::OrderEventSource;
use crate::ports::repository::{LedgerSnapshot, SnapshotRepository};

/// Notification emitted after every reconciled event.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
  /// Stream the event was applied to.
  pub stream: String,
  /// Id of the incoming order.
  pub order_id: Option<OrderId>,
  /// Status of the incoming order.
  pub status: OrderStatus,
  /// How the recent buffer absorbed it.
  pub upsert: Upsert,
  /// Id of the order evicted from the recent buffer, if any.
  pub evicted: Option<OrderId>,
  /// What happened to open orders.
  pub open_orders_change: OpenOrdersChange,
  /// Events reconciled into this stream so far.
  pub events_applied: u64,
  /// Successor snapshot.
  pub state: ReconciliationState,
}

/// Notification emitted when the run loop drops an event for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEvent {
  /// Stream the event was addressed to.
  pub stream: String,
  /// Id of the dropped order.
  pub order_id: Option<OrderId>,
  /// Rendered error.
  pub reason: String,
}

/// In-memory ledger of one stream.
#[derive(Debug, Default)]
struct StreamLedger {
  state: ReconciliationState,
  events_applied: u64,
}

/// Reconciles order events into per-stream ledgers.
pub struct LedgerService<R: SnapshotRepository> {
  /// One-shot worker dispatcher.
  worker: WatchWorker,
  /// Snapshot persistence port.
  repository: Arc<R>,
  /// Save a snapshot after every event.
  persist: bool,
  /// Stream name → ledger. The inner lock is the per-stream serializer.
  ledgers: Mutex<HashMap<String, Arc<Mutex<StreamLedger>>>>,
  /// Update broadcaster.
  update_tx: broadcast::Sender<LedgerUpdate>,
  /// Dropped-event broadcaster.
  drop_tx: broadcast::Sender<DroppedEvent>,
}

impl<R: SnapshotRepository> LedgerService<R> {
  /// Create a ledger service from config.
  pub fn new(repository: Arc<R>, config: &LedgerConfig, persist: bool) -> Self {
    let reconciler =
      Reconciler::new(config.recent_capacity).with_strict_open_set(config.strict_open_set);
    let (update_tx, _) = broadcast::channel(config.update_channel_capacity.max(1));
    let (drop_tx, _) = broadcast::channel(config.update_channel_capacity.max(1));

    Self {
      worker: WatchWorker::new(reconciler),
      repository,
      persist,
      ledgers: Mutex::new(HashMap::new()),
      update_tx,
      drop_tx,
    }
  }

  /// Subscribe to ledger updates.
  pub fn subscribe(&self) -> broadcast::Receiver<LedgerUpdate> {
    self.update_tx.subscribe()
  }

  /// Subscribe to events dropped by [`Self::run`].
  pub fn subscribe_drops(&self) -> broadcast::Receiver<DroppedEvent> {
    self.drop_tx.subscribe()
  }

  pub const fn worker(&self) -> WatchWorker {
    self.worker
  }

  /// Reconcile one order update into `stream`'s ledger.
  ///
  /// Concurrent calls for the same stream are applied one at a time in
  /// lock-acquisition (FIFO) order. If persistence fails the in-memory
  /// ledger has already advanced; the error is returned so the caller
  /// can decide whether to retry the save.
  ///
  /// # Errors
  /// Worker failures, `Restore` when the stream's snapshot cannot be
  /// loaded (nothing applied) and `Persistence` when the save fails.
  #[instrument(skip(self, order), fields(stream = %stream, order_id = ?order.id, status = %order.status))]
  pub async fn apply(&self, stream: &str, order: Order) -> Result<LedgerUpdate, LedgerError> {
    let ledger = self.ledger(stream).await?;
    let mut ledger = ledger.lock().await;

    let order_id = order.id.clone();
    let status = order.status.clone();

    // The worker gets its own copy; the held snapshot is only replaced
    // once a reply arrives.
    let request = ReconcileRequest::new(ledger.state.clone(), order);
    let Reconciliation { state, outcome } = self.worker.dispatch(request).await?;

    ledger.state = state;
    ledger.events_applied += 1;

    let evicted = outcome.evicted.and_then(|o| o.id);
    if let Some(id) = &evicted {
      debug!(evicted = %id, "Evicted oldest recent order");
    }

    debug!(
      orders = ledger.state.orders.len(),
      open_orders = ledger.state.open_orders.len(),
      upsert = ?outcome.upsert,
      open_change = ?outcome.open_orders,
      "Order reconciled"
    );

    let update = LedgerUpdate {
      stream: stream.to_string(),
      order_id,
      status,
      upsert: outcome.upsert,
      evicted,
      open_orders_change: outcome.open_orders,
      events_applied: ledger.events_applied,
      state: ledger.state.clone(),
    };

    // No subscribers is fine.
    let _ = self.update_tx.send(update.clone());

    if self.persist {
      let snapshot = LedgerSnapshot::new(stream, ledger.events_applied, ledger.state.clone());
      self
        .repository
        .save(&snapshot)
        .await
        .map_err(|e| LedgerError::persistence(stream, &e))?;
    }

    Ok(update)
  }

  /// Current in-memory snapshot of a stream, `None` if never touched.
  pub async fn snapshot(&self, stream: &str) -> Option<ReconciliationState> {
    let ledger = self.ledgers.lock().await.get(stream).cloned()?;
    let ledger = ledger.lock().await;
    Some(ledger.state.clone())
  }

  /// Names of all streams held in memory, sorted.
  pub async fn streams(&self) -> Vec<String> {
    let mut names: Vec<String> = self.ledgers.lock().await.keys().cloned().collect();
    names.sort();
    names
  }

  /// Load every stream the repository knows about.
  ///
  /// Returns the number of streams now held in memory.
  ///
  /// # Errors
  /// Fails if the repository cannot list or load a stream.
  #[instrument(skip(self))]
  pub async fn restore_all(&self) -> Result<usize, LedgerError> {
    let streams = self
      .repository
      .list_streams()
      .await
      .map_err(|e| LedgerError::persistence("*", &e))?;

    for stream in &streams {
      self.ledger(stream).await?;
    }

    let held = self.ledgers.lock().await.len();
    info!(restored = streams.len(), held, "Ledgers restored");
    Ok(held)
  }

  /// Apply events from `source` until it is exhausted or shutdown fires.
  ///
  /// Per-event failures are logged, reported to drop subscribers and
  /// skipped; only a source failure ends the loop with an error. Returns
  /// the number of events applied.
  ///
  /// # Errors
  /// Propagates transport errors from the event source.
  #[instrument(skip(self, source, shutdown_rx), name = "ledger_loop")]
  pub async fn run<S: OrderEventSource>(
    &self,
    source: &mut S,
    mut shutdown_rx: broadcast::Receiver<()>,
  ) -> Result<u64> {
    info!("Ledger loop started");
    let mut applied = 0_u64;

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Ledger loop received shutdown signal");
          break;
        }
        event = source.next_event() => {
          match event? {
            Some(event) => {
              let order_id = event.order.id.clone();
              match self.apply(&event.stream, event.order).await {
                Ok(_) => applied += 1,
                Err(e @ LedgerError::Persistence { .. }) => {
                  applied += 1;
                  warn!(error = %e, "Snapshot not persisted");
                }
                Err(e) => {
                  error!(stream = %event.stream, error = %e, "Event dropped");
                  let _ = self.drop_tx.send(DroppedEvent {
                    stream: event.stream,
                    order_id,
                    reason: e.to_string(),
                  });
                }
              }
            }
            None => {
              info!("Order event source exhausted");
              break;
            }
          }
        }
      }
    }

    info!(applied, skipped = source.skipped(), "Ledger loop stopped");
    Ok(applied)
  }

  /// Get or create the ledger for `stream`, restoring it on first touch.
  ///
  /// The stream map is not locked while the repository loads, so a slow
  /// restore only holds up events for its own stream. If two first touches
  /// race, the first ledger inserted wins.
  async fn ledger(&self, stream: &str) -> Result<Arc<Mutex<StreamLedger>>, LedgerError> {
    let held = self.ledgers.lock().await.get(stream).cloned();
    if let Some(ledger) = held {
      return Ok(ledger);
    }

    let restored = self
      .repository
      .load(stream)
      .await
      .map_err(|e| LedgerError::restore(stream, &e))?;

    let ledger = match restored {
      Some(snapshot) => {
        info!(
          stream = %stream,
          orders = snapshot.state.orders.len(),
          open_orders = snapshot.state.open_orders.len(),
          events_applied = snapshot.events_applied,
          "Ledger restored from snapshot"
        );
        StreamLedger {
          state: snapshot.state,
          events_applied: snapshot.events_applied,
        }
      }
      None => {
        debug!(stream = %stream, "New ledger");
        StreamLedger::default()
      }
    };

    let mut ledgers = self.ledgers.lock().await;
    let ledger = ledgers
      .entry(stream.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(ledger)));
    Ok(Arc::clone(ledger))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::adapters::persistence::InMemoryRepository;
  use tokio::sync::Notify;

  /// Repository whose load of the `slow` stream parks until released.
  #[derive(Default)]
  struct GatedRepository {
    inner: InMemoryRepository,
    entered: Notify,
    release: Notify,
  }

  #[async_trait::async_trait]
  impl SnapshotRepository for GatedRepository {
    async fn load(&self, stream: &str) -> Result<Option<LedgerSnapshot>> {
      if stream == "slow" {
        self.entered.notify_one();
        self.release.notified().await;
      }
      self.inner.load(stream).await
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
      self.inner.save(snapshot).await
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
      self.inner.list_streams().await
    }

    async fn is_healthy(&self) -> bool {
      true
    }
  }

  fn service(capacity: usize) -> LedgerService<InMemoryRepository> {
    let config = LedgerConfig {
      recent_capacity: capacity,
      ..LedgerConfig::default()
    };
    LedgerService::new(Arc::new(InMemoryRepository::new()), &config, true)
  }

  #[tokio::test]
  async fn test_streams_are_independent() {
    let svc = service(40);
    svc.apply("acct-a", Order::new("1", "open")).await.unwrap();
    svc.apply("acct-b", Order::new("2", "open")).await.unwrap();

    let a = svc.snapshot("acct-a").await.unwrap();
    let b = svc.snapshot("acct-b").await.unwrap();
    assert_eq!(a.recent_ids(), vec!["1"]);
    assert_eq!(b.recent_ids(), vec!["2"]);
    assert_eq!(svc.streams().await, vec!["acct-a", "acct-b"]);
    assert!(svc.snapshot("acct-c").await.is_none());
  }

  #[tokio::test]
  async fn test_apply_persists_snapshot() {
    let repo = Arc::new(InMemoryRepository::new());
    let svc = LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), true);

    svc.apply("s", Order::new("a", "open")).await.unwrap();
    svc.apply("s", Order::new("a", "closed")).await.unwrap();

    let stored = repo.load("s").await.unwrap().unwrap();
    assert_eq!(stored.events_applied, 2);
    assert_eq!(stored.state.recent_ids(), vec!["a"]);
    assert!(stored.state.open_orders.is_empty());
  }

  #[tokio::test]
  async fn test_persistence_disabled_skips_save() {
    let repo = Arc::new(InMemoryRepository::new());
    let svc = LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), false);
    svc.apply("s", Order::new("a", "open")).await.unwrap();
    assert!(repo.load("s").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_restores_existing_snapshot_on_first_touch() {
    let repo = Arc::new(InMemoryRepository::new());
    let seeded = ReconciliationState::new(
      vec![Order::new("old", "open")],
      vec![Order::new("old", "open")],
    );
    repo.save(&LedgerSnapshot::new("s", 7, seeded)).await.unwrap();

    let svc = LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), true);
    let update = svc.apply("s", Order::new("old", "canceled")).await.unwrap();

    assert_eq!(update.events_applied, 8);
    assert_eq!(update.state.recent_ids(), vec!["old"]);
    assert!(update.state.open_orders.is_empty());
    assert_eq!(update.open_orders_change, OpenOrdersChange::Removed { count: 1 });
  }

  #[tokio::test]
  async fn test_restore_all_loads_every_stream() {
    let repo = Arc::new(InMemoryRepository::new());
    for stream in ["x", "y"] {
      repo
        .save(&LedgerSnapshot::new(stream, 1, ReconciliationState::default()))
        .await
        .unwrap();
    }
    let svc = LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), true);
    assert_eq!(svc.restore_all().await.unwrap(), 2);
    assert_eq!(svc.streams().await, vec!["x", "y"]);
  }

  #[tokio::test]
  async fn test_updates_are_broadcast_with_eviction() {
    let svc = service(2);
    let mut rx = svc.subscribe();

    for id in ["1", "2", "3"] {
      svc.apply("s", Order::new(id, "open")).await.unwrap();
    }

    let first = rx.recv().await.unwrap();
    assert_eq!(first.order_id, Some(OrderId::from("1")));
    assert!(first.evicted.is_none());
    let _ = rx.recv().await.unwrap();
    let third = rx.recv().await.unwrap();
    assert_eq!(third.evicted, Some(OrderId::from("1")));
    assert_eq!(third.state.recent_ids(), vec!["2", "3"]);
    assert_eq!(third.state.open_ids(), vec!["1", "2", "3"]);
  }

  #[tokio::test]
  async fn test_concurrent_applies_on_one_stream_are_serialized() {
    let svc = Arc::new(service(40));
    let mut handles = Vec::new();
    for i in 0..20 {
      let svc = Arc::clone(&svc);
      handles.push(tokio::spawn(async move {
        svc.apply("s", Order::new(i.to_string(), "open")).await.unwrap();
      }));
    }
    for handle in handles {
      handle.await.unwrap();
    }

    let state = svc.snapshot("s").await.unwrap();
    assert_eq!(state.orders.len(), 20);
    assert_eq!(state.open_orders.len(), 20);
  }

  #[tokio::test]
  async fn test_slow_restore_does_not_block_other_streams() {
    let repo = Arc::new(GatedRepository::default());
    let svc = Arc::new(LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), true));

    let slow = {
      let svc = Arc::clone(&svc);
      tokio::spawn(async move { svc.apply("slow", Order::new("s1", "open")).await })
    };
    repo.entered.notified().await;

    let fast = tokio::time::timeout(
      Duration::from_secs(5),
      svc.apply("fast", Order::new("f1", "open")),
    )
    .await;
    assert!(matches!(fast, Ok(Ok(_))));
    assert_eq!(svc.streams().await, vec!["fast"]);

    repo.release.notify_one();
    let update = slow.await.unwrap().unwrap();
    assert_eq!(update.events_applied, 1);
    assert_eq!(svc.streams().await, vec!["fast", "slow"]);
  }

  #[tokio::test]
  async fn test_concurrent_first_touch_shares_one_ledger() {
    let repo = Arc::new(GatedRepository::default());
    let svc = Arc::new(LedgerService::new(Arc::clone(&repo), &LedgerConfig::default(), true));

    let mut handles = Vec::new();
    for id in ["a", "b"] {
      let svc = Arc::clone(&svc);
      handles.push(tokio::spawn(async move { svc.apply("slow", Order::new(id, "open")).await }));
    }
    repo.entered.notified().await;
    repo.release.notify_one();
    repo.entered.notified().await;
    repo.release.notify_one();
    for handle in handles {
      handle.await.unwrap().unwrap();
    }

    let state = svc.snapshot("slow").await.unwrap();
    assert_eq!(state.recent_ids(), vec!["a", "b"]);
    assert_eq!(state.open_ids(), vec!["a", "b"]);
  }
}
