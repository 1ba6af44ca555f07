//! State Store - Atomic JSON Ledger Snapshots
//!
//! Saves one snapshot per order stream to `ledgers/<encoded stream>.json`
//! using atomic writes (write to tmp file, then rename). A crash mid-save
//! leaves either the previous snapshot or the new one, never a partial.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::ports::repository::{LedgerSnapshot, SnapshotRepository};

/// File-backed snapshot repository.
///
/// Stream names are mapped to file names by percent-encoding every byte
/// outside `[A-Za-z0-9_-]`, so distinct streams never share a file. The
/// stream name itself is stored inside the snapshot and is what
/// `list_streams` reports.
pub struct StateStore {
    /// Directory holding one JSON file per stream.
    ledgers_dir: PathBuf,
}

impl StateStore {
    /// Create a new state store in the given data directory.
    ///
    /// Creates `data_dir/ledgers` if it doesn't exist.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let ledgers_dir = data_dir.as_ref().join("ledgers");
        fs::create_dir_all(&ledgers_dir)
            .await
            .context("Failed to create ledgers directory")?;

        Ok(Self { ledgers_dir })
    }

    fn snapshot_path(&self, stream: &str) -> PathBuf {
        self.ledgers_dir.join(format!("{}.json", file_stem(stream)))
    }

    async fn read_snapshot(path: &Path) -> Result<LedgerSnapshot> {
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }
}

/// Filesystem-safe, injective stem for a stream name.
///
/// `%` is always encoded, so the empty name maps to a bare `%` that no
/// other name can produce.
fn file_stem(stream: &str) -> String {
    if stream.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(stream.len());
    for byte in stream.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl SnapshotRepository for StateStore {
    #[instrument(skip(self))]
    async fn load(&self, stream: &str) -> Result<Option<LedgerSnapshot>> {
        let path = self.snapshot_path(stream);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            debug!(stream, "No snapshot on disk");
            return Ok(None);
        }

        let snapshot = Self::read_snapshot(&path).await?;
        ensure!(
            snapshot.stream == stream,
            "Snapshot {} belongs to stream {:?}, not {:?}",
            path.display(),
            snapshot.stream,
            stream
        );
        info!(
            stream,
            orders = snapshot.state.orders.len(),
            open_orders = snapshot.state.open_orders.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    #[instrument(skip(self, snapshot), fields(stream = %snapshot.stream))]
    async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.stream);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize snapshot")?;

        // Write to tmp file
        fs::write(&tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;

        // Atomic rename
        fs::rename(&tmp_path, &path)
            .await
            .context("Failed to rename snapshot file")?;

        debug!(
            path = %path.display(),
            events_applied = snapshot.events_applied,
            "Snapshot saved"
        );
        Ok(())
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let mut streams = Vec::new();
        let mut entries = fs::read_dir(&self.ledgers_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_snapshot(&path).await {
                Ok(snapshot) => streams.push(snapshot.stream),
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        error = %e,
                        "Skipping unreadable snapshot"
                    );
                }
            }
        }

        streams.sort();
        Ok(streams)
    }

    /// Check if the ledgers directory is writable.
    async fn is_healthy(&self) -> bool {
        let test_path = self.ledgers_dir.join(".health_check");
        let result = fs::write(&test_path, b"ok").await;
        let _ = fs::remove_file(&test_path).await;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, ReconciliationState};
    use tempfile::tempdir;

    #[test]
    fn test_file_stem_encodes() {
        assert_eq!(file_stem("binance:BTC/USDT"), "binance%3ABTC%2FUSDT");
        assert_eq!(file_stem("acct-1.spot"), "acct-1%2Espot");
        assert_eq!(file_stem("acct_1"), "acct_1");
        assert_eq!(file_stem(""), "%");
        assert_eq!(file_stem(".."), "%2E%2E");
        assert_eq!(file_stem("%"), "%25");
        assert_ne!(file_stem("acct/1"), file_stem("acct_1"));
    }

    #[tokio::test]
    async fn test_similar_stream_names_keep_separate_snapshots() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();

        for (stream, id) in [("acct/1", "from-slash"), ("acct_1", "from-underscore")] {
            let state = ReconciliationState::new(vec![Order::new(id, "open")], Vec::new());
            store.save(&LedgerSnapshot::new(stream, 1, state)).await.unwrap();
        }

        let slash = store.load("acct/1").await.unwrap().unwrap();
        assert_eq!(slash.stream, "acct/1");
        assert_eq!(slash.state.recent_ids(), vec!["from-slash"]);
        let underscore = store.load("acct_1").await.unwrap().unwrap();
        assert_eq!(underscore.state.recent_ids(), vec!["from-underscore"]);
        assert_eq!(store.list_streams().await.unwrap(), vec!["acct/1", "acct_1"]);
    }

    #[tokio::test]
    async fn test_load_rejects_snapshot_of_another_stream() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();
        store
            .save(&LedgerSnapshot::new("other", 1, ReconciliationState::default()))
            .await
            .unwrap();
        std::fs::rename(
            dir.path().join("ledgers/other.json"),
            dir.path().join("ledgers/mine.json"),
        )
        .unwrap();

        let err = store.load("mine").await.unwrap_err();
        assert!(err.to_string().contains("belongs to stream"));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();

        let state = ReconciliationState::new(
            vec![Order::new("a", "open").with_field("price", 1.5)],
            vec![Order::new("a", "open").with_field("price", 1.5)],
        );
        let snapshot = LedgerSnapshot::new("binance:BTC/USDT", 3, state.clone());
        store.save(&snapshot).await.unwrap();

        let loaded = store.load("binance:BTC/USDT").await.unwrap().unwrap();
        assert_eq!(loaded.stream, "binance:BTC/USDT");
        assert_eq!(loaded.events_applied, 3);
        assert_eq!(loaded.state, state);
        assert!(dir.path().join("ledgers/binance%3ABTC%2FUSDT.json").exists());
        assert!(!dir.path().join("ledgers/binance%3ABTC%2FUSDT.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_missing_stream() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_streams_skips_garbage() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).await.unwrap();
        for stream in ["b", "a/1"] {
            store
                .save(&LedgerSnapshot::new(stream, 0, ReconciliationState::default()))
                .await
                .unwrap();
        }
        std::fs::write(dir.path().join("ledgers/broken.json"), "{").unwrap();

        assert_eq!(store.list_streams().await.unwrap(), vec!["a/1", "b"]);
        assert!(store.is_healthy().await);
    }
}
