//! Record store trait and error types.
//!
//! This module defines the `RecordStore` trait that abstracts over the
//! backing media (local key-value payloads, SQLite, the REST API), plus the
//! validation rules every manager applies before touching a store.

use std::future::Future;

use chrono::NaiveDate;
use nodeweather_core::{AppError, DatabaseError, NetworkError};
use thiserror::Error;

use crate::types::{
    parse_date, today, CityCount, FavoriteCity, HistoryEntry, HistoryRecord, NewFavorite,
    NewHistoryEntry, Totals,
};

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller supplied malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local medium failure (SQLite, files).
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Remote store unreachable or replied with an unexpected status.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a query failure.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Database(DatabaseError::QueryFailed(message.into()))
    }

    /// Create a write failure.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Database(DatabaseError::WriteFailed(message.into()))
    }

    /// True when the caller, not the store, is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => AppError::Validation(message),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Network(e) => AppError::Network(e),
            StoreError::Other(e) => AppError::Other(e),
        }
    }
}

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for favorites and history.
///
/// Implementations are chosen once at construction time and injected into
/// the managers. None of them cache: every call goes to the backing medium.
/// Inputs reaching a store are already validated.
pub trait RecordStore: Send + Sync {
    /// All favorites. Ordering is backend specific.
    fn list_favorites(&self) -> impl Future<Output = StoreResult<Vec<FavoriteCity>>> + Send;

    /// Insert a favorite unless one with the same name exists.
    ///
    /// Returns the stored record, which is the existing one on a duplicate.
    fn insert_favorite(
        &self,
        city: FavoriteCity,
    ) -> impl Future<Output = StoreResult<FavoriteCity>> + Send;

    /// Delete the favorite with this exact name. Returns 0 or 1.
    fn delete_favorite(&self, name: &str) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Delete every favorite. Returns the count removed.
    fn clear_favorites(&self) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Insert at the head of history and evict everything beyond `cap`.
    fn insert_history(
        &self,
        record: HistoryRecord,
        cap: usize,
    ) -> impl Future<Output = StoreResult<HistoryEntry>> + Send;

    /// Up to `limit` entries, newest first.
    fn list_history(&self, limit: usize)
        -> impl Future<Output = StoreResult<Vec<HistoryEntry>>> + Send;

    /// Delete all history. Returns the count removed.
    fn clear_history(&self) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Delete entries dated strictly before `cutoff`.
    fn delete_history_before(
        &self,
        cutoff: NaiveDate,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Cities by lookup count descending, then name ascending.
    fn top_cities(&self, limit: usize) -> impl Future<Output = StoreResult<Vec<CityCount>>> + Send;

    /// Row counts of both collections.
    fn totals(&self) -> impl Future<Output = StoreResult<Totals>> + Send;

    /// Entries whose stored `YYYY-MM-DD` date equals `date` exactly.
    fn count_history_on(&self, date: &str) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Whether the medium is reachable.
    fn health_check(&self) -> impl Future<Output = StoreResult<bool>> + Send {
        async { Ok(true) }
    }
}

/// Validate a favorite and normalize its name.
///
/// # Errors
/// Returns `StoreError::Validation` if:
/// - The name is missing, empty or whitespace-only.
/// - Latitude or longitude is missing or not finite.
pub fn validate_favorite(input: NewFavorite) -> StoreResult<FavoriteCity> {
    let name = input
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StoreError::validation("Invalid city payload: name is required"))?;

    let lat = input
        .lat
        .filter(|v| v.is_finite())
        .ok_or_else(|| StoreError::validation("Invalid city payload: lat must be a number"))?;
    let lon = input
        .lon
        .filter(|v| v.is_finite())
        .ok_or_else(|| StoreError::validation("Invalid city payload: lon must be a number"))?;

    Ok(FavoriteCity {
        name: name.to_string(),
        lat,
        lon,
    })
}

/// Validate a city name used as a lookup key.
///
/// # Errors
/// Returns `StoreError::Validation` if the name is empty or whitespace-only.
pub fn validate_city_name(name: &str) -> StoreResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation("Invalid city name"));
    }
    Ok(trimmed)
}

/// Validate a history entry and fill in its defaults.
///
/// A blank or missing date becomes today's date; a missing temperature stays
/// `None`; missing conditions become an empty string.
///
/// # Errors
/// Returns `StoreError::Validation` if:
/// - The city is missing, empty or whitespace-only.
/// - The date is present but not a valid `YYYY-MM-DD` date.
pub fn validate_history(input: NewHistoryEntry) -> StoreResult<HistoryRecord> {
    let city = input
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| StoreError::validation("City is required"))?
        .to_string();

    let date = match input.date.as_deref().map(str::trim) {
        None | Some("") => today(),
        Some(raw) => parse_date(raw).ok_or_else(|| {
            StoreError::validation(format!("Invalid date '{}': expected YYYY-MM-DD", raw))
        })?,
    };

    Ok(HistoryRecord {
        date,
        city,
        temp: input.temp.filter(|t| t.is_finite()),
        conditions: input.conditions.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_validate_favorite_trims_name() {
        let city = validate_favorite(NewFavorite::new("  Kyiv ", 50.45, 30.52)).unwrap();
        assert_eq!(city.name, "Kyiv");
        assert_eq!(city.lat, 50.45);
        assert_eq!(city.lon, 30.52);
    }

    #[test]
    fn test_validate_favorite_blank_name() {
        let result = validate_favorite(NewFavorite::new("   ", 1.0, 2.0));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_validate_favorite_missing_coordinates() {
        let input = NewFavorite {
            name: Some("Kyiv".to_string()),
            lat: Some(50.45),
            lon: None,
        };
        assert!(validate_favorite(input).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_favorite_non_finite() {
        let result = validate_favorite(NewFavorite::new("Kyiv", f64::NAN, 30.52));
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let result = validate_favorite(NewFavorite::new("Kyiv", 50.45, f64::INFINITY));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_validate_city_name() {
        assert_eq!(validate_city_name(" Odesa ").unwrap(), "Odesa");
        assert!(validate_city_name("").is_err());
        assert!(validate_city_name("\t").is_err());
    }

    #[test]
    fn test_validate_history_defaults() {
        let record = validate_history(NewHistoryEntry::for_city("Kyiv")).unwrap();
        assert_eq!(record.city, "Kyiv");
        assert_eq!(record.date, today());
        assert_eq!(record.temp, None);
        assert_eq!(record.conditions, "");
    }

    #[test]
    fn test_validate_history_blank_date_is_today() {
        let input = NewHistoryEntry {
            date: Some("  ".to_string()),
            ..NewHistoryEntry::for_city("Kyiv")
        };
        assert_eq!(validate_history(input).unwrap().date, today());
    }

    #[test]
    fn test_validate_history_keeps_explicit_values() {
        let input = NewHistoryEntry {
            city: Some("Lviv".to_string()),
            date: Some("2026-01-30".to_string()),
            temp: Some(-3.5),
            conditions: Some("Snow".to_string()),
        };
        let record = validate_history(input).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 1, 30).unwrap());
        assert_eq!(record.temp, Some(-3.5));
        assert_eq!(record.conditions, "Snow");
    }

    #[test]
    fn test_validate_history_rejects_bad_date() {
        let input = NewHistoryEntry {
            date: Some("30/01/2026".to_string()),
            ..NewHistoryEntry::for_city("Kyiv")
        };
        assert!(validate_history(input).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_history_requires_city() {
        assert!(validate_history(NewHistoryEntry::default()).is_err());
        assert!(validate_history(NewHistoryEntry::for_city(" ")).is_err());
    }

    #[test]
    fn test_store_error_into_app_error() {
        let app: AppError = StoreError::validation("City is required").into();
        assert!(app.is_validation());

        let app: AppError = StoreError::query("boom").into();
        assert!(matches!(app, AppError::Database(DatabaseError::QueryFailed(_))));
    }
}
