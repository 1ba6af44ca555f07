//! Prometheus Metrics Registry - Ledger Observability
//!
//! Tracks reconciliation throughput, evictions, dropped events and the
//! size of each stream's collections. Fed from the ledger broadcasts so
//! the use-case layer never touches Prometheus directly.

use std::sync::Arc;

use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::{OpenOrdersChange, Order, OrderId};
use crate::usecases::{DroppedEvent, LedgerUpdate};

/// Centralized Prometheus metrics for the ledger service.
///
/// All metrics follow the naming convention `order_ledger_*` and carry a
/// `stream` label.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Events reconciled, by stream and incoming status.
    pub events_reconciled: IntCounterVec,
    /// Recent-buffer evictions.
    pub evictions: IntCounterVec,
    /// Open-order entries removed by terminal statuses.
    pub open_orders_removed: IntCounterVec,
    /// Current recent-buffer length.
    pub recent_orders: GaugeVec,
    /// Current open-orders length.
    pub open_orders: GaugeVec,
    /// Open-order entries whose id appears more than once.
    pub duplicate_open_orders: GaugeVec,
    /// Events the ledger loop dropped without applying.
    pub events_dropped: IntCounterVec,
    /// Updates the metrics task missed because it lagged.
    pub updates_lagged: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_reconciled = IntCounterVec::new(
            Opts::new(
                "order_ledger_events_reconciled_total",
                "Order events reconciled",
            ),
            &["stream", "status"],
        )?;

        let evictions = IntCounterVec::new(
            Opts::new(
                "order_ledger_evictions_total",
                "Orders evicted from the recent-orders buffer",
            ),
            &["stream"],
        )?;

        let open_orders_removed = IntCounterVec::new(
            Opts::new(
                "order_ledger_open_orders_removed_total",
                "Open-order entries removed by closed/canceled/expired updates",
            ),
            &["stream"],
        )?;

        let recent_orders = GaugeVec::new(
            Opts::new("order_ledger_recent_orders", "Recent-orders buffer length"),
            &["stream"],
        )?;

        let open_orders = GaugeVec::new(
            Opts::new("order_ledger_open_orders", "Open-orders collection length"),
            &["stream"],
        )?;

        let duplicate_open_orders = GaugeVec::new(
            Opts::new(
                "order_ledger_duplicate_open_orders",
                "Open-order entries sharing an id with an earlier entry",
            ),
            &["stream"],
        )?;

        let events_dropped = IntCounterVec::new(
            Opts::new(
                "order_ledger_events_dropped_total",
                "Order events dropped because their ledger could not be restored or reconciled",
            ),
            &["stream"],
        )?;

        let updates_lagged = IntCounter::new(
            "order_ledger_metrics_updates_lagged_total",
            "Ledger updates skipped by the metrics task",
        )?;

        // Register all metrics
        registry.register(Box::new(events_reconciled.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(open_orders_removed.clone()))?;
        registry.register(Box::new(recent_orders.clone()))?;
        registry.register(Box::new(open_orders.clone()))?;
        registry.register(Box::new(duplicate_open_orders.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(updates_lagged.clone()))?;

        Ok(Self {
            registry,
            events_reconciled,
            evictions,
            open_orders_removed,
            recent_orders,
            open_orders,
            duplicate_open_orders,
            events_dropped,
            updates_lagged,
        })
    }

    /// Fold one ledger update into the metrics.
    pub fn record(&self, update: &LedgerUpdate) {
        let stream = update.stream.as_str();

        self.events_reconciled
            .with_label_values(&[stream, update.status.as_str()])
            .inc();
        if update.evicted.is_some() {
            self.evictions.with_label_values(&[stream]).inc();
        }
        if let OpenOrdersChange::Removed { count } = update.open_orders_change {
            self.open_orders_removed
                .with_label_values(&[stream])
                .inc_by(count as u64);
        }

        self.recent_orders
            .with_label_values(&[stream])
            .set(update.state.orders.len() as f64);
        self.open_orders
            .with_label_values(&[stream])
            .set(update.state.open_orders.len() as f64);

        let ids: Vec<&OrderId> = update
            .state
            .open_orders
            .iter()
            .filter_map(Order::id)
            .collect();
        let duplicates = ids
            .iter()
            .enumerate()
            .filter(|&(i, id)| ids[..i].contains(id))
            .count();
        self.duplicate_open_orders
            .with_label_values(&[stream])
            .set(duplicates as f64);
    }

    /// Count one dropped event.
    pub fn record_drop(&self, dropped: &DroppedEvent) {
        self.events_dropped
            .with_label_values(&[dropped.stream.as_str()])
            .inc();
    }

    /// Consume ledger updates and drop reports until shutdown or the
    /// update channel closes.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        mut update_rx: broadcast::Receiver<LedgerUpdate>,
        mut drop_rx: broadcast::Receiver<DroppedEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Metrics recorder started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                update = update_rx.recv() => match update {
                    Ok(update) => self.record(&update),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "Metrics recorder lagged");
                        self.updates_lagged.inc_by(n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                dropped = drop_rx.recv() => match dropped {
                    Ok(dropped) => self.record_drop(&dropped),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "Metrics recorder lagged on drop reports");
                        self.updates_lagged.inc_by(n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("Metrics recorder stopped");
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
