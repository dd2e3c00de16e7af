//! Favorites and history persistence for nodeweather.
//!
//! Managers in this crate hold an injected [`RecordStore`]; the backend
//! (local key-value payloads, SQLite or the REST API) is chosen once when
//! [`Services`] is built.

pub mod backend;
pub mod favorites;
pub mod history;
pub mod local;
pub mod remote;
pub mod services;
pub mod sqlite;
pub mod stats;
pub mod types;

pub use backend::{
    validate_city_name, validate_favorite, validate_history, RecordStore, StoreError, StoreResult,
};
pub use favorites::FavoritesManager;
pub use history::{HistoryManager, DEFAULT_HISTORY_CAP, DEFAULT_LIST_LIMIT, DEFAULT_PRUNE_DAYS};
pub use local::{FileMedium, KeyValueMedium, LocalStore, MemoryMedium};
pub use remote::RemoteStore;
pub use services::Services;
pub use sqlite::SqliteStore;
pub use stats::{rank_cities, StatsAggregator, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT};
pub use types::{
    format_date, parse_date, today, CityCount, DeleteResponse, FavoriteCity, HistoryEntry,
    HistoryRecord, NewFavorite, NewHistoryEntry, PruneReport, ResetReport, TodayStats, Totals,
};
