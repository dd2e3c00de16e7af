//! Favorite cities, unique by name.

use std::sync::Arc;

use crate::backend::{validate_city_name, validate_favorite, RecordStore, StoreResult};
use crate::types::{FavoriteCity, NewFavorite};

/// Add, list and remove favorite cities on an injected store.
#[derive(Debug)]
pub struct FavoritesManager<S> {
    store: Arc<S>,
}

impl<S> Clone for FavoritesManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RecordStore> FavoritesManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Save a city. Adding a name that is already saved changes nothing and
    /// returns the stored record.
    ///
    /// # Errors
    /// `StoreError::Validation` for a blank name or non-finite coordinates.
    pub async fn add(&self, input: NewFavorite) -> StoreResult<FavoriteCity> {
        let city = validate_favorite(input)?;
        let stored = self.store.insert_favorite(city).await?;
        tracing::info!("Favorite saved: {}", stored.name);
        Ok(stored)
    }

    /// All favorites.
    pub async fn list(&self) -> StoreResult<Vec<FavoriteCity>> {
        self.store.list_favorites().await
    }

    /// Remove the favorite with this name. Returns 0 when none matched.
    ///
    /// # Errors
    /// `StoreError::Validation` for a blank name.
    pub async fn remove_by_name(&self, name: &str) -> StoreResult<u64> {
        let name = validate_city_name(name)?;
        let removed = self.store.delete_favorite(name).await?;
        tracing::info!("Removed {} favorite(s) named {}", removed, name);
        Ok(removed)
    }

    /// Remove every favorite. Returns the count removed.
    pub async fn clear(&self) -> StoreResult<u64> {
        let removed = self.store.clear_favorites().await?;
        tracing::info!("Cleared {} favorite(s)", removed);
        Ok(removed)
    }

    /// Whether a city with this name is saved.
    pub async fn contains(&self, name: &str) -> StoreResult<bool> {
        let name = name.trim();
        Ok(self.list().await?.iter().any(|f| f.name == name))
    }
}
