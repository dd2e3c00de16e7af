//! Capped, newest-first search history.

use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::backend::{validate_city_name, validate_history, RecordStore, StoreResult};
use crate::types::{today, HistoryEntry, NewHistoryEntry, PruneReport};

/// Entries kept when no cap is configured.
pub const DEFAULT_HISTORY_CAP: usize = 10;

/// Entries returned by `list` when no valid limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Age used by `prune_older_than` when no valid day count is given.
pub const DEFAULT_PRUNE_DAYS: i64 = 30;

/// Limit passed to the store when every retained entry is needed.
const RETAINED_SCAN_LIMIT: usize = i64::MAX as usize;

/// Record, list and prune history on an injected store.
#[derive(Debug)]
pub struct HistoryManager<S> {
    store: Arc<S>,
    cap: usize,
}

impl<S> Clone for HistoryManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cap: self.cap,
        }
    }
}

impl<S: RecordStore> HistoryManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_cap(store, DEFAULT_HISTORY_CAP)
    }

    /// A cap of 0 is treated as 1.
    pub fn with_cap(store: Arc<S>, cap: usize) -> Self {
        Self {
            store,
            cap: cap.max(1),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Record a lookup. The oldest entries beyond the cap are evicted in the
    /// same operation.
    ///
    /// # Errors
    /// `StoreError::Validation` for a blank city or a malformed date.
    pub async fn add(&self, input: NewHistoryEntry) -> StoreResult<HistoryEntry> {
        let record = validate_history(input)?;
        let entry = self.store.insert_history(record, self.cap).await?;
        tracing::info!("History entry {} added for {} on {}", entry.id, entry.city, entry.date);
        Ok(entry)
    }

    /// The newest `limit` entries. Absent or non-positive limits use the default.
    pub async fn list(&self, limit: Option<i64>) -> StoreResult<Vec<HistoryEntry>> {
        let limit = limit
            .filter(|l| *l > 0)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIST_LIMIT);
        self.store.list_history(limit).await
    }

    /// Retained entries for one city, newest first. Scans the whole stored
    /// history, not just this manager's cap.
    ///
    /// # Errors
    /// `StoreError::Validation` for a blank city.
    pub async fn by_city(&self, city: &str) -> StoreResult<Vec<HistoryEntry>> {
        let city = validate_city_name(city)?;
        let entries = self.store.list_history(RETAINED_SCAN_LIMIT).await?;
        Ok(entries.into_iter().filter(|h| h.city == city).collect())
    }

    /// Delete every entry. Returns the count removed.
    pub async fn clear(&self) -> StoreResult<u64> {
        let removed = self.store.clear_history().await?;
        tracing::info!("Cleared {} history entries", removed);
        Ok(removed)
    }

    /// Delete entries dated before `today - days`.
    ///
    /// `days = 0` keeps only today's entries. Absent or negative values use
    /// `DEFAULT_PRUNE_DAYS`. Day counts reaching past the earliest
    /// representable date clamp the cutoff to `NaiveDate::MIN`.
    pub async fn prune_older_than(&self, days: Option<i64>) -> StoreResult<PruneReport> {
        let days = days
            .and_then(|d| u64::try_from(d).ok())
            .unwrap_or(DEFAULT_PRUNE_DAYS as u64);
        let cutoff = today()
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN);
        self.prune_before(cutoff).await
    }

    /// Delete entries dated strictly before `cutoff`.
    pub async fn prune_before(&self, cutoff: NaiveDate) -> StoreResult<PruneReport> {
        let deleted = self.store.delete_history_before(cutoff).await?;
        tracing::info!("Pruned {} history entries dated before {}", deleted, cutoff);
        Ok(PruneReport {
            deleted,
            before_date: cutoff,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::backend::StoreError;
    use crate::local::{LocalStore, MemoryMedium};
    use crate::sqlite::SqliteStore;
    use crate::types::format_date;
    use chrono::Duration;

    fn local() -> HistoryManager<LocalStore<MemoryMedium>> {
        HistoryManager::new(Arc::new(LocalStore::in_memory()))
    }

    fn sqlite() -> HistoryManager<SqliteStore> {
        HistoryManager::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn dated(city: &str, date: NaiveDate) -> NewHistoryEntry {
        NewHistoryEntry {
            date: Some(format_date(date)),
            ..NewHistoryEntry::for_city(city)
        }
    }

    async fn cap_keeps_newest<S: RecordStore>(manager: HistoryManager<S>) {
        for n in 1..=13 {
            manager
                .add(NewHistoryEntry::for_city(format!("City{}", n)))
                .await
                .unwrap();

            let history = manager.list(Some(100)).await.unwrap();
            assert_eq!(history.len(), n.min(10));
            assert_eq!(history[0].city, format!("City{}", n));
        }

        let history = manager.list(Some(100)).await.unwrap();
        let cities: Vec<_> = history.iter().map(|h| h.city.as_str()).collect();
        assert_eq!(
            cities,
            [
                "City13", "City12", "City11", "City10", "City9", "City8", "City7", "City6",
                "City5", "City4"
            ]
        );
    }

    async fn prune_zero_days_keeps_today<S: RecordStore>(manager: HistoryManager<S>) {
        let today = today();
        manager.add(dated("Old", today - Duration::days(40))).await.unwrap();
        manager.add(dated("Yesterday", today - Duration::days(1))).await.unwrap();
        manager.add(dated("Today", today)).await.unwrap();

        let report = manager.prune_older_than(Some(0)).await.unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.before_date, today);

        let history = manager.list(None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].city, "Today");
    }

    async fn defaults_are_applied<S: RecordStore>(manager: HistoryManager<S>) {
        let entry = manager.add(NewHistoryEntry::for_city("Kyiv")).await.unwrap();
        assert_eq!(format_date(entry.date), format_date(today()));
        assert_eq!(format_date(entry.date).len(), 10);
        assert_eq!(entry.temp, None);
        assert_eq!(entry.conditions, "");

        let stored = manager.list(None).await.unwrap();
        assert_eq!(stored, vec![entry]);
    }

    #[tokio::test]
    async fn test_cap_keeps_newest_local() {
        cap_keeps_newest(local()).await;
    }

    #[tokio::test]
    async fn test_cap_keeps_newest_sqlite() {
        cap_keeps_newest(sqlite()).await;
    }

    #[tokio::test]
    async fn test_prune_zero_days_keeps_today_local() {
        prune_zero_days_keeps_today(local()).await;
    }

    #[tokio::test]
    async fn test_prune_zero_days_keeps_today_sqlite() {
        prune_zero_days_keeps_today(sqlite()).await;
    }

    #[tokio::test]
    async fn test_defaults_are_applied_local() {
        defaults_are_applied(local()).await;
    }

    #[tokio::test]
    async fn test_defaults_are_applied_sqlite() {
        defaults_are_applied(sqlite()).await;
    }

    #[tokio::test]
    async fn test_add_requires_city() {
        let manager = sqlite();
        let result = manager.add(NewHistoryEntry::default()).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(manager.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_defaults_to_thirty_days() {
        let manager = local();
        let today = today();
        manager.add(dated("Ancient", today - Duration::days(31))).await.unwrap();
        manager.add(dated("Recent", today - Duration::days(30))).await.unwrap();

        for days in [None, Some(-5)] {
            let report = manager.prune_older_than(days).await.unwrap();
            assert_eq!(report.before_date, today - Duration::days(30));
        }

        let cities: Vec<_> = manager
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.city)
            .collect();
        assert_eq!(cities, ["Recent"]);
    }

    #[tokio::test]
    async fn test_list_limit_falls_back_to_default() {
        let manager = HistoryManager::with_cap(Arc::new(SqliteStore::in_memory().unwrap()), 20);
        for n in 0..15 {
            manager
                .add(NewHistoryEntry::for_city(format!("City{}", n)))
                .await
                .unwrap();
        }

        assert_eq!(manager.list(None).await.unwrap().len(), DEFAULT_LIST_LIMIT);
        assert_eq!(manager.list(Some(0)).await.unwrap().len(), DEFAULT_LIST_LIMIT);
        assert_eq!(manager.list(Some(-3)).await.unwrap().len(), DEFAULT_LIST_LIMIT);
        assert_eq!(manager.list(Some(3)).await.unwrap().len(), 3);
        assert_eq!(manager.list(Some(50)).await.unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_by_city_filters_exact_name() {
        let manager = local();
        for city in ["Kyiv", "Lviv", "Kyiv", "kyiv"] {
            manager.add(NewHistoryEntry::for_city(city)).await.unwrap();
        }

        let entries = manager.by_city("Kyiv").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|h| h.city == "Kyiv"));
    }

    #[tokio::test]
    async fn test_by_city_sees_beyond_manager_cap() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let writer = HistoryManager::with_cap(store.clone(), 20);
        writer.add(NewHistoryEntry::for_city("Odesa")).await.unwrap();
        for n in 0..5 {
            writer
                .add(NewHistoryEntry::for_city(format!("City{}", n)))
                .await
                .unwrap();
        }

        let reader = HistoryManager::with_cap(store, 2);
        let entries = reader.by_city("Odesa").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].city, "Odesa");
    }

    async fn huge_day_count_clamps<S: RecordStore>(manager: HistoryManager<S>) {
        manager.add(NewHistoryEntry::for_city("Kyiv")).await.unwrap();

        let report = manager.prune_older_than(Some(i64::MAX)).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.before_date, NaiveDate::MIN);
        assert_eq!(manager.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_huge_day_count_clamps_local() {
        huge_day_count_clamps(local()).await;
    }

    #[tokio::test]
    async fn test_prune_huge_day_count_clamps_sqlite() {
        huge_day_count_clamps(sqlite()).await;
    }

    #[tokio::test]
    async fn test_zero_cap_keeps_one() {
        let manager = HistoryManager::with_cap(Arc::new(LocalStore::in_memory()), 0);
        assert_eq!(manager.cap(), 1);
        manager.add(NewHistoryEntry::for_city("Kyiv")).await.unwrap();
        manager.add(NewHistoryEntry::for_city("Lviv")).await.unwrap();
        let history = manager.list(None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].city, "Lviv");
    }
}
