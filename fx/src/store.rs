//! Persistence of the cached rate table as a single key-value record.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use convertpal_common::{CurrencyCode, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheEntry;
use crate::error::{FxError, FxResult};
use crate::table::{RateTable, Rates};

/// Key under which the snapshot record is stored.
pub const SNAPSHOT_KEY: &str = "exchangeRatesCache";

/// Serialized form of a [`CacheEntry`]. Always holds the reference-currency
/// rates, never a normalized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub reference: CurrencyCode,
    pub rates: Rates,
    pub fetched_at: Timestamp,
}

impl Snapshot {
    /// Validate the stored rates and rebuild the cache entry.
    pub fn into_entry(self) -> FxResult<CacheEntry> {
        let table = RateTable::from_reference(self.reference, self.rates)?;
        Ok(CacheEntry::new(table, self.fetched_at))
    }

    fn encode(&self) -> FxResult<String> {
        serde_json::to_string(self)
            .map_err(|e| FxError::Storage(format!("failed to encode snapshot: {}", e)))
    }

    fn decode(raw: &str) -> FxResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| FxError::MalformedResponse(format!("cached snapshot: {}", e)))
    }
}

impl From<&CacheEntry> for Snapshot {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            reference: entry.table.reference().clone(),
            rates: entry.table.reference_rates().clone(),
            fetched_at: entry.fetched_at,
        }
    }
}

/// Storage for the single cached snapshot. Reads and writes are whole-record.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, `None` if nothing was stored yet.
    async fn load(&self) -> FxResult<Option<Snapshot>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &Snapshot) -> FxResult<()>;

    /// Remove the stored snapshot.
    async fn clear(&self) -> FxResult<()>;
}

/// JSON file store. Writes go to a sibling temp file that is renamed over the
/// target, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| SNAPSHOT_KEY.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> FxResult<Option<Snapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                debug!(path = %self.path.display(), "Loaded rate snapshot");
                Snapshot::decode(&raw).map(Some)
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(FxError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> FxResult<()> {
        let raw = snapshot.encode()?;
        let storage_err =
            |e: std::io::Error| FxError::Storage(format!("failed to write {}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, raw).await.map_err(storage_err)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(storage_err)?;

        debug!(path = %self.path.display(), "Saved rate snapshot");
        Ok(())
    }

    async fn clear(&self) -> FxResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(FxError::Storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-memory key-value store holding the encoded record.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: DashMap<String, String>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw record, bypassing encoding.
    pub fn put_raw(&self, raw: impl Into<String>) {
        self.records.insert(SNAPSHOT_KEY.to_string(), raw.into());
    }

    /// The raw stored record, if any.
    pub fn raw(&self) -> Option<String> {
        self.records.get(SNAPSHOT_KEY).map(|r| r.value().clone())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> FxResult<Option<Snapshot>> {
        self.raw().map(|raw| Snapshot::decode(&raw)).transpose()
    }

    async fn save(&self, snapshot: &Snapshot) -> FxResult<()> {
        let raw = snapshot.encode()?;
        self.records.insert(SNAPSHOT_KEY.to_string(), raw);
        Ok(())
    }

    async fn clear(&self) -> FxResult<()> {
        self.records.remove(SNAPSHOT_KEY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::sample_table;
    use chrono::Duration;

    fn sample_snapshot() -> Snapshot {
        let entry = CacheEntry::new(sample_table(), convertpal_common::now() - Duration::seconds(60));
        Snapshot::from(&entry)
    }

    fn temp_file() -> PathBuf {
        std::env::temp_dir()
            .join(format!("convertpal-{}", uuid::Uuid::new_v4()))
            .join("rates.json")
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(snapshot));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_corrupt_record() {
        let store = MemorySnapshotStore::new();
        store.put_raw(r#"{"rates": "#);

        let result = store.load().await;
        assert!(matches!(result, Err(FxError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let path = temp_file();
        let store = FileSnapshotStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().await.unwrap(), Some(snapshot));

        store.clear().await.unwrap();
        assert!(!path.exists());
        store.clear().await.unwrap();

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let path = temp_file();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        let store = FileSnapshotStore::new(&path);
        let result = store.load().await;
        assert!(matches!(result, Err(FxError::MalformedResponse(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_snapshot_keeps_reference_rates() {
        let engine = crate::conversion::ConversionEngine::new();
        let eur = engine.normalize(&sample_table(), &CurrencyCode::eur()).unwrap();
        let entry = CacheEntry::new(eur, convertpal_common::now());

        let snapshot = Snapshot::from(&entry);

        assert_eq!(snapshot.reference, CurrencyCode::usd());
        assert_eq!(snapshot.rates.get(&CurrencyCode::eur()), Some(&0.85));
    }

    #[test]
    fn test_snapshot_with_invalid_rates() {
        let mut snapshot = sample_snapshot();
        snapshot.rates.insert(CurrencyCode::new("BAD"), 0.0);

        let result = snapshot.into_entry();
        assert!(matches!(result, Err(FxError::MalformedResponse(_))));
    }
}
