//! SQLite-based record storage.
//!
//! This module provides `SqliteStore`, the server-side implementation of
//! `RecordStore` over two tables:
//!
//! - `favorites(id, name UNIQUE, lat, lon)`
//! - `history(id, date, city, temp, conditions)`
//!
//! rusqlite is blocking, so every call runs on tokio's blocking pool behind a
//! shared connection mutex.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use nodeweather_core::RusqliteErrorExt;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::backend::{RecordStore, StoreError, StoreResult};
use crate::types::{
    format_date, parse_date, CityCount, FavoriteCity, HistoryEntry, HistoryRecord, Totals,
};

/// Map a rusqlite error into a store fault.
fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.into_database_error())
}

/// SQLite-based record storage.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    ///
    /// Creates the schema if it doesn't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!("Connected to SQLite database: {}", path.display());
        Self::with_connection(conn)
    }

    /// Create an in-memory store (tests, throwaway servers).
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                city TEXT NOT NULL,
                temp REAL,
                conditions TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_date ON history(date);
            CREATE INDEX IF NOT EXISTS idx_history_city ON history(city);
            "#,
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Other(anyhow::anyhow!("SQLite task failed: {}", e)))?
    }

    fn row_to_favorite(row: &rusqlite::Row) -> rusqlite::Result<FavoriteCity> {
        Ok(FavoriteCity {
            name: row.get(0)?,
            lat: row.get(1)?,
            lon: row.get(2)?,
        })
    }

    fn find_favorite(conn: &Connection, name: &str) -> StoreResult<Option<FavoriteCity>> {
        let mut stmt = conn
            .prepare("SELECT name, lat, lon FROM favorites WHERE name = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![name]).map_err(db_err)?;

        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(Self::row_to_favorite(row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    /// Read history rows, skipping any whose date is not `YYYY-MM-DD`.
    fn query_history(conn: &Connection, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, date, city, temp, conditions
                 FROM history
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, date, city, temp, conditions) = row.map_err(db_err)?;
            match parse_date(&date) {
                Some(date) => entries.push(HistoryEntry {
                    id,
                    date,
                    city,
                    temp,
                    conditions: conditions.unwrap_or_default(),
                }),
                None => tracing::warn!("Skipping history row {} with malformed date '{}'", id, date),
            }
        }
        Ok(entries)
    }

    fn count(conn: &Connection, sql: &str, date: Option<&str>) -> StoreResult<u64> {
        let count: i64 = match date {
            Some(date) => conn.query_row(sql, params![date], |row| row.get(0)),
            None => conn.query_row(sql, [], |row| row.get(0)),
        }
        .map_err(db_err)?;
        Ok(count as u64)
    }
}

impl RecordStore for SqliteStore {
    async fn list_favorites(&self) -> StoreResult<Vec<FavoriteCity>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, lat, lon FROM favorites ORDER BY id DESC")
                .map_err(db_err)?;
            let rows = stmt.query_map([], Self::row_to_favorite).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
        .await
    }

    async fn insert_favorite(&self, city: FavoriteCity) -> StoreResult<FavoriteCity> {
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO favorites (name, lat, lon) VALUES (?1, ?2, ?3)",
                    params![city.name, city.lat, city.lon],
                )
                .map_err(db_err)?;
            tracing::debug!("Inserted {} favorite row(s) for {}", inserted, city.name);

            Self::find_favorite(conn, &city.name)?.ok_or_else(|| {
                StoreError::query(format!("Favorite {} missing after insert", city.name))
            })
        })
        .await
    }

    async fn delete_favorite(&self, name: &str) -> StoreResult<u64> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM favorites WHERE name = ?1", params![name])
                .map_err(db_err)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn clear_favorites(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM favorites", []).map_err(db_err)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn insert_history(&self, record: HistoryRecord, cap: usize) -> StoreResult<HistoryEntry> {
        self.with_conn(move |conn| {
            // Insert and trim commit together, so the table never sits above the cap.
            let tx = conn.transaction().map_err(db_err)?;

            tx.execute(
                "INSERT INTO history (date, city, temp, conditions) VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_date(record.date),
                    record.city,
                    record.temp,
                    record.conditions
                ],
            )
            .map_err(db_err)?;
            let id = tx.last_insert_rowid();

            let evicted = tx
                .execute(
                    "DELETE FROM history
                     WHERE id NOT IN (
                         SELECT id FROM history
                         ORDER BY id DESC
                         LIMIT ?1
                     )",
                    params![cap as i64],
                )
                .map_err(db_err)?;

            tx.commit().map_err(db_err)?;

            if evicted > 0 {
                tracing::debug!("Evicted {} history row(s) beyond cap {}", evicted, cap);
            }
            Ok(record.into_entry(id))
        })
        .await
    }

    async fn list_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        self.with_conn(move |conn| Self::query_history(conn, limit)).await
    }

    async fn clear_history(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM history", []).map_err(db_err)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn delete_history_before(&self, cutoff: NaiveDate) -> StoreResult<u64> {
        let cutoff = format_date(cutoff);
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM history WHERE date < ?1", params![cutoff])
                .map_err(db_err)?;
            Ok(removed as u64)
        })
        .await
    }

    async fn top_cities(&self, limit: usize) -> StoreResult<Vec<CityCount>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT city, COUNT(*) AS count
                     FROM history
                     GROUP BY city
                     ORDER BY count DESC, city ASC
                     LIMIT ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(CityCount {
                        city: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
        .await
    }

    async fn totals(&self) -> StoreResult<Totals> {
        self.with_conn(|conn| {
            Ok(Totals {
                total_history: Self::count(conn, "SELECT COUNT(*) FROM history", None)?,
                total_favorites: Self::count(conn, "SELECT COUNT(*) FROM favorites", None)?,
            })
        })
        .await
    }

    async fn count_history_on(&self, date: &str) -> StoreResult<u64> {
        let date = date.to_string();
        self.with_conn(move |conn| {
            Self::count(conn, "SELECT COUNT(*) FROM history WHERE date = ?1", Some(&date))
        })
        .await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(db_err)?;
            Ok(true)
        })
        .await
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}
