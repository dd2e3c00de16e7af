//! Document-style record store over a key-value medium.
//!
//! Each collection is one JSON array stored under its key, the same layout a
//! browser front-end keeps in local storage. Every operation reads the whole
//! collection, changes it in memory and writes it back with `write_all`.
//! Operations run on the blocking pool, one at a time per store.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use nodeweather_core::DatabaseError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::{RecordStore, StoreError, StoreResult};
use crate::stats::rank_cities;
use crate::types::{
    format_date, CityCount, Collection, FavoriteCity, HistoryEntry, HistoryRecord, Totals,
};

/// Anything that can get and set a string payload by key.
pub trait KeyValueMedium: Send + Sync {
    /// Returns `None` when nothing is stored under `key`.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Replace the payload stored under `key`.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// In-process medium. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Use `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueMedium for FileMedium {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);

        // Each write gets its own temp file; readers only ever see the old or
        // the new payload. A failed write leaves no temp file behind.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).with_context(|| {
            format!("Failed to create a temp file in {}", self.dir.display())
        })?;
        tmp.write_all(value.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Record store backed by a key-value medium.
///
/// Clones share the medium and the operation lock.
#[derive(Debug)]
pub struct LocalStore<M> {
    medium: Arc<M>,
    /// Held for a whole read-modify-write cycle.
    op_lock: Arc<Mutex<()>>,
}

impl<M> Clone for LocalStore<M> {
    fn clone(&self) -> Self {
        Self {
            medium: self.medium.clone(),
            op_lock: self.op_lock.clone(),
        }
    }
}

impl LocalStore<MemoryMedium> {
    /// Store that lives only in memory (tests, ephemeral sessions).
    pub fn in_memory() -> Self {
        Self::new(MemoryMedium::new())
    }
}

impl LocalStore<FileMedium> {
    /// Store persisted as JSON files in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        Ok(Self::new(FileMedium::new(dir)?))
    }
}

impl<M: KeyValueMedium> LocalStore<M> {
    pub fn new(medium: M) -> Self {
        Self {
            medium: Arc::new(medium),
            op_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying medium.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Read a whole collection.
    ///
    /// A missing payload is an empty collection. So is a payload that does
    /// not parse: it is logged and otherwise ignored, so stale or hand-edited
    /// data never blocks a reader.
    ///
    /// # Errors
    /// Returns a storage error only when the medium itself fails.
    pub fn read_all<T: DeserializeOwned>(&self, collection: Collection) -> StoreResult<Vec<T>> {
        let key = collection.key();
        let payload = self
            .medium
            .get(key)
            .map_err(|e| StoreError::query(format!("Failed to read {}: {:#}", key, e)))?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        if payload.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&payload) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable {} payload: {}",
                    key,
                    DatabaseError::Corruption(e.to_string())
                );
                Ok(Vec::new())
            }
        }
    }

    /// Replace a whole collection.
    ///
    /// # Errors
    /// Returns a storage error when serialization or the medium write fails.
    pub fn write_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> StoreResult<()> {
        let key = collection.key();
        let payload = serde_json::to_string(records)
            .map_err(|e| StoreError::write(format!("Failed to encode {}: {}", key, e)))?;

        self.medium
            .set(key, &payload)
            .map_err(|e| StoreError::write(format!("Failed to write {}: {:#}", key, e)))?;

        tracing::debug!("Wrote {} {} records", records.len(), key);
        Ok(())
    }

    /// Run `f` on the blocking pool with the operation lock held.
    async fn with_collections<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Self) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
        M: 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = store.op_lock.lock();
            f(&store)
        })
        .await
        .map_err(|e| StoreError::Other(anyhow::anyhow!("Local store task failed: {}", e)))?
    }

    fn favorites(&self) -> StoreResult<Vec<FavoriteCity>> {
        self.read_all(Collection::Favorites)
    }

    fn history(&self) -> StoreResult<Vec<HistoryEntry>> {
        self.read_all(Collection::History)
    }
}

impl<M: KeyValueMedium + 'static> RecordStore for LocalStore<M> {
    async fn list_favorites(&self) -> StoreResult<Vec<FavoriteCity>> {
        self.with_collections(|store| store.favorites()).await
    }

    async fn insert_favorite(&self, city: FavoriteCity) -> StoreResult<FavoriteCity> {
        self.with_collections(move |store| {
            let mut favorites = store.favorites()?;

            if let Some(existing) = favorites.iter().find(|f| f.name == city.name) {
                tracing::debug!("Favorite already stored: {}", city.name);
                return Ok(existing.clone());
            }

            favorites.push(city.clone());
            store.write_all(Collection::Favorites, &favorites)?;
            Ok(city)
        })
        .await
    }

    async fn delete_favorite(&self, name: &str) -> StoreResult<u64> {
        let name = name.to_string();
        self.with_collections(move |store| {
            let mut favorites = store.favorites()?;
            let before = favorites.len();
            favorites.retain(|f| f.name != name);
            let removed = (before - favorites.len()) as u64;

            if removed > 0 {
                store.write_all(Collection::Favorites, &favorites)?;
            }
            Ok(removed)
        })
        .await
    }

    async fn clear_favorites(&self) -> StoreResult<u64> {
        self.with_collections(|store| {
            let removed = store.favorites()?.len() as u64;
            store.write_all::<FavoriteCity>(Collection::Favorites, &[])?;
            Ok(removed)
        })
        .await
    }

    async fn insert_history(&self, record: HistoryRecord, cap: usize) -> StoreResult<HistoryEntry> {
        self.with_collections(move |store| {
            let mut history = store.history()?;
            let id = history.iter().map(|h| h.id).max().unwrap_or(0) + 1;
            let entry = record.into_entry(id);

            history.insert(0, entry.clone());
            history.truncate(cap);

            // Insert and eviction land in a single write.
            store.write_all(Collection::History, &history)?;
            Ok(entry)
        })
        .await
    }

    async fn list_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        self.with_collections(move |store| {
            let mut history = store.history()?;
            history.truncate(limit);
            Ok(history)
        })
        .await
    }

    async fn clear_history(&self) -> StoreResult<u64> {
        self.with_collections(|store| {
            let removed = store.history()?.len() as u64;
            store.write_all::<HistoryEntry>(Collection::History, &[])?;
            Ok(removed)
        })
        .await
    }

    async fn delete_history_before(&self, cutoff: NaiveDate) -> StoreResult<u64> {
        self.with_collections(move |store| {
            let mut history = store.history()?;
            let before = history.len();
            history.retain(|h| h.date >= cutoff);
            let removed = (before - history.len()) as u64;

            if removed > 0 {
                store.write_all(Collection::History, &history)?;
            }
            Ok(removed)
        })
        .await
    }

    async fn top_cities(&self, limit: usize) -> StoreResult<Vec<CityCount>> {
        self.with_collections(move |store| {
            let history = store.history()?;
            Ok(rank_cities(history.iter().map(|h| h.city.as_str()), limit))
        })
        .await
    }

    async fn totals(&self) -> StoreResult<Totals> {
        self.with_collections(|store| {
            Ok(Totals {
                total_history: store.history()?.len() as u64,
                total_favorites: store.favorites()?.len() as u64,
            })
        })
        .await
    }

    async fn count_history_on(&self, date: &str) -> StoreResult<u64> {
        let date = date.to_string();
        self.with_collections(move |store| {
            let history = store.history()?;
            Ok(history.iter().filter(|h| format_date(h.date) == date).count() as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn record(city: &str, date: &str) -> HistoryRecord {
        HistoryRecord {
            date: crate::types::parse_date(date).unwrap(),
            city: city.to_string(),
            temp: None,
            conditions: String::new(),
        }
    }

    fn kyiv() -> FavoriteCity {
        FavoriteCity {
            name: "Kyiv".to_string(),
            lat: 50.45,
            lon: 30.52,
        }
    }

    /// Medium whose reads and writes always fail.
    struct BrokenMedium;

    impl KeyValueMedium for BrokenMedium {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("disk unplugged")
        }

        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk unplugged")
        }
    }

    #[test]
    fn test_missing_payload_reads_empty() {
        let store = LocalStore::in_memory();
        let favorites: Vec<FavoriteCity> = store.read_all(Collection::Favorites).unwrap();
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_corrupted_payload_reads_empty() {
        let store = LocalStore::in_memory();
        store.medium().set("favorites", "{not json").unwrap();
        store.medium().set("history", r#"[{"city":"Kyiv","date":"yesterday"}]"#).unwrap();

        let favorites: Vec<FavoriteCity> = store.read_all(Collection::Favorites).unwrap();
        let history: Vec<HistoryEntry> = store.read_all(Collection::History).unwrap();
        assert!(favorites.is_empty());
        assert!(history.is_empty());
    }

    #[test]
    fn test_medium_failure_is_surfaced() {
        let store = LocalStore::new(BrokenMedium);
        let result: StoreResult<Vec<FavoriteCity>> = store.read_all(Collection::Favorites);
        assert!(matches!(result, Err(StoreError::Database(_))));

        let result = store.write_all(Collection::Favorites, &[kyiv()]);
        assert!(matches!(
            result,
            Err(StoreError::Database(DatabaseError::WriteFailed(_)))
        ));
    }

    #[test]
    fn test_write_all_replaces_collection() {
        let store = LocalStore::in_memory();
        store.write_all(Collection::Favorites, &[kyiv()]).unwrap();
        store.write_all::<FavoriteCity>(Collection::Favorites, &[]).unwrap();

        let favorites: Vec<FavoriteCity> = store.read_all(Collection::Favorites).unwrap();
        assert!(favorites.is_empty());
    }

    #[tokio::test]
    async fn test_insert_favorite_ignores_duplicate() {
        let store = LocalStore::in_memory();
        store.insert_favorite(kyiv()).await.unwrap();

        let duplicate = FavoriteCity {
            lat: 0.0,
            ..kyiv()
        };
        let stored = store.insert_favorite(duplicate).await.unwrap();

        assert_eq!(stored, kyiv());
        assert_eq!(store.list_favorites().await.unwrap(), vec![kyiv()]);
    }

    #[tokio::test]
    async fn test_favorites_keep_insertion_order() {
        let store = LocalStore::in_memory();
        for name in ["Kyiv", "Lviv", "Odesa"] {
            store
                .insert_favorite(FavoriteCity {
                    name: name.to_string(),
                    lat: 1.0,
                    lon: 2.0,
                })
                .await
                .unwrap();
        }

        let names: Vec<_> = store
            .list_favorites()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["Kyiv", "Lviv", "Odesa"]);
    }

    #[tokio::test]
    async fn test_insert_history_caps_and_orders() {
        let store = LocalStore::in_memory();
        for i in 0..5 {
            store
                .insert_history(record(&format!("City{}", i), "2026-10-01"), 3)
                .await
                .unwrap();
        }

        let history = store.list_history(10).await.unwrap();
        let cities: Vec<_> = history.iter().map(|h| h.city.as_str()).collect();
        assert_eq!(cities, ["City4", "City3", "City2"]);
        assert_eq!(history[0].id, 5);
    }

    #[tokio::test]
    async fn test_delete_history_before_cutoff() {
        let store = LocalStore::in_memory();
        store.insert_history(record("Old", "2026-01-01"), 10).await.unwrap();
        store.insert_history(record("Edge", "2026-02-01"), 10).await.unwrap();
        store.insert_history(record("New", "2026-03-01"), 10).await.unwrap();

        let cutoff = crate::types::parse_date("2026-02-01").unwrap();
        assert_eq!(store.delete_history_before(cutoff).await.unwrap(), 1);

        let cities: Vec<_> = store
            .list_history(10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.city)
            .collect();
        assert_eq!(cities, ["New", "Edge"]);
    }

    #[tokio::test]
    async fn test_legacy_payload_is_readable() {
        let store = LocalStore::in_memory();
        store
            .medium()
            .set(
                "history",
                r#"[{"date":"2026-10-19","city":"Kyiv","temp":12.1,"conditions":"Rain"}]"#,
            )
            .unwrap();

        assert_eq!(store.count_history_on("2026-10-19").await.unwrap(), 1);
        let entry = store.insert_history(record("Lviv", "2026-10-19"), 10).await.unwrap();
        assert_eq!(entry.id, 1);
    }

    #[tokio::test]
    async fn test_file_medium_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path()).unwrap();
            store.insert_favorite(kyiv()).await.unwrap();
        }

        assert!(dir.path().join("favorites.json").exists());

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.list_favorites().await.unwrap(), vec![kyiv()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_every_favorite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for n in 0..10 {
                    store
                        .insert_favorite(FavoriteCity {
                            name: format!("City{}-{}", worker, n),
                            lat: 1.0,
                            lon: 2.0,
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let on_disk = std::fs::read_to_string(dir.path().join("favorites.json")).unwrap();
        let favorites: Vec<FavoriteCity> = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(favorites.len(), 80);
        assert_eq!(store.totals().await.unwrap().total_favorites, 80);
    }

    #[test]
    fn test_file_medium_parallel_sets_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let medium = Arc::new(FileMedium::new(dir.path()).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|worker| {
                let medium = medium.clone();
                std::thread::spawn(move || {
                    for n in 0..25 {
                        let payload = serde_json::json!([{ "worker": worker, "n": n }]);
                        medium.set("history", &payload.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let payload = medium.get("history").unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);

        // No temp files are left next to the payload.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, ["history.json"]);
    }

    #[tokio::test]
    async fn test_file_medium_corrupted_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("history.json"), "[[[").unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.list_history(10).await.unwrap().is_empty());
        assert_eq!(store.totals().await.unwrap(), Totals::default());
    }
}
