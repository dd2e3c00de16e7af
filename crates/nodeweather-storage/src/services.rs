//! The three managers wired to one shared store.

use std::sync::Arc;

use crate::backend::RecordStore;
use crate::favorites::FavoritesManager;
use crate::history::HistoryManager;
use crate::backend::StoreResult;
use crate::stats::StatsAggregator;
use crate::types::ResetReport;

/// Favorites, history and stats over the same store instance.
#[derive(Debug)]
pub struct Services<S> {
    pub favorites: FavoritesManager<S>,
    pub history: HistoryManager<S>,
    pub stats: StatsAggregator<S>,
    store: Arc<S>,
}

impl<S> Clone for Services<S> {
    fn clone(&self) -> Self {
        Self {
            favorites: self.favorites.clone(),
            history: self.history.clone(),
            stats: self.stats.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: RecordStore> Services<S> {
    /// Build the managers around `store`, keeping at most `history_cap`
    /// history entries.
    pub fn new(store: S, history_cap: usize) -> Self {
        let store = Arc::new(store);
        Self {
            favorites: FavoritesManager::new(store.clone()),
            history: HistoryManager::with_cap(store.clone(), history_cap),
            stats: StatsAggregator::new(store.clone()),
            store,
        }
    }

    /// The shared store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Delete every favorite and every history entry.
    pub async fn reset(&self) -> StoreResult<ResetReport> {
        let report = ResetReport {
            favorites: self.favorites.clear().await?,
            history: self.history.clear().await?,
        };
        tracing::info!(
            "Reset storage: {} favorites, {} history entries removed",
            report.favorites,
            report.history
        );
        Ok(report)
    }
}
