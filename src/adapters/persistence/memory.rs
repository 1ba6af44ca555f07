//! In-memory snapshot repository for tests and dry runs.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::repository::{LedgerSnapshot, SnapshotRepository};

/// Keeps the latest snapshot per stream in a map. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    snapshots: RwLock<HashMap<String, LedgerSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryRepository {
    async fn load(&self, stream: &str) -> Result<Option<LedgerSnapshot>> {
        Ok(self.snapshots.read().await.get(stream).cloned())
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.stream.clone(), snapshot.clone());
        Ok(())
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let mut streams: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        streams.sort();
        Ok(streams)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
