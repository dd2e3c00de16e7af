//! Read-only aggregates over favorites and history.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{RecordStore, StoreResult};
use crate::types::{format_date, parse_date, today, CityCount, TodayStats, Totals};

/// Cities returned by `top_cities` when no valid limit is given.
pub const DEFAULT_TOP_LIMIT: usize = 5;

/// Largest accepted `top_cities` limit.
pub const MAX_TOP_LIMIT: usize = 50;

/// Count occurrences of each city, most frequent first.
///
/// Ties are broken by city name ascending so the output is deterministic.
pub fn rank_cities<'a>(cities: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<CityCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for city in cities {
        *counts.entry(city).or_default() += 1;
    }

    let mut ranked: Vec<CityCount> = counts
        .into_iter()
        .map(|(city, count)| CityCount {
            city: city.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.city.cmp(&b.city)));
    ranked.truncate(limit);
    ranked
}

/// Aggregate queries on an injected store.
#[derive(Debug)]
pub struct StatsAggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for StatsAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RecordStore> StatsAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Most looked-up cities. Limits outside `1..=50` fall back to 5.
    pub async fn top_cities(&self, limit: Option<i64>) -> StoreResult<Vec<CityCount>> {
        let limit = limit
            .filter(|l| (1..=MAX_TOP_LIMIT as i64).contains(l))
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_TOP_LIMIT);
        self.store.top_cities(limit).await
    }

    pub async fn totals(&self) -> StoreResult<Totals> {
        self.store.totals().await
    }

    /// Lookups recorded on `date`, or on today when the date is blank.
    ///
    /// The date is matched exactly against stored dates; a value that is not
    /// a calendar date simply counts zero.
    pub async fn today(&self, date: Option<&str>) -> StoreResult<TodayStats> {
        let date = match date.map(str::trim) {
            None | Some("") => format_date(today()),
            Some(raw) => parse_date(raw).map(format_date).unwrap_or_else(|| raw.to_string()),
        };
        let requests = self.store.count_history_on(&date).await?;
        Ok(TodayStats { date, requests })
    }
}
