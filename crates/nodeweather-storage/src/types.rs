//! Record types shared by every backend, the REST API and the CLI.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Wire and storage format for history dates. Fixed width, so string order
/// is chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` string; surrounding whitespace is ignored.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Format a date the way it is stored.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// The two record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Favorites,
    History,
}

impl Collection {
    /// Key the collection is stored under.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Favorites => "favorites",
            Self::History => "history",
        }
    }
}

/// A saved city, unique by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteCity {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Unvalidated favorite as received from a caller.
///
/// Fields of the wrong JSON type read as `None`, leaving the decision to
/// validation instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFavorite {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lon: Option<f64>,
}

impl NewFavorite {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: Some(name.into()),
            lat: Some(lat),
            lon: Some(lon),
        }
    }
}

/// A stored history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Assigned by the store. Entries written by older front-ends carry none.
    #[serde(default)]
    pub id: i64,
    pub date: NaiveDate,
    pub city: String,
    pub temp: Option<f64>,
    #[serde(default)]
    pub conditions: String,
}

/// A validated history entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: NaiveDate,
    pub city: String,
    pub temp: Option<f64>,
    pub conditions: String,
}

impl HistoryRecord {
    pub fn into_entry(self, id: i64) -> HistoryEntry {
        HistoryEntry {
            id,
            date: self.date,
            city: self.city,
            temp: self.temp,
            conditions: self.conditions,
        }
    }
}

/// Unvalidated history entry as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub conditions: Option<String>,
}

impl NewHistoryEntry {
    /// Entry for `city` with every other field defaulted.
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Self::default()
        }
    }
}

/// Lookup count for one city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCount {
    pub city: String,
    pub count: u64,
}

/// Row counts of both collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_history: u64,
    pub total_favorites: u64,
}

/// History entries recorded on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayStats {
    pub date: String,
    pub requests: u64,
}

/// Outcome of an age-based history prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub deleted: u64,
    pub before_date: NaiveDate,
}

/// REST reply for delete and clear operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: u64,
}

impl DeleteResponse {
    pub fn deleted(count: u64) -> Self {
        Self {
            success: true,
            deleted: count,
        }
    }
}

/// Rows removed by a full reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub favorites: u64,
    pub history: u64,
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Value::deserialize(deserializer)?.as_f64())
    }
}
