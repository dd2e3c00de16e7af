//! Record store backed by the nodeweather REST API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use nodeweather_core::{NetworkError, ReqwestErrorExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::backend::{RecordStore, StoreError, StoreResult};
use crate::types::{
    format_date, CityCount, DeleteResponse, FavoriteCity, HistoryEntry, HistoryRecord,
    PruneReport, TodayStats, Totals,
};

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for a remote nodeweather server.
///
/// The server applies its own history cap, so the `cap` passed to
/// `insert_history` is not sent.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: Url,
    client: Arc<Client>,
}

impl RemoteStore {
    /// Create a client for an API root such as `http://localhost:4000/api`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid remote URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            client: Arc::new(client),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> StoreResult<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid API path: {}", path))
            .map_err(StoreError::from)
    }

    fn favorite_url(&self, name: &str) -> StoreResult<Url> {
        let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC);
        self.url(&format!("favorites/{}", encoded))
    }

    /// Send a request and map the reply status onto store errors.
    async fn send(&self, request: reqwest::RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.into_network_error()))?;
        self.check_response(response).await
    }

    /// Check response status and extract the server's error message.
    async fn check_response(&self, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);

        if status == StatusCode::BAD_REQUEST {
            return Err(StoreError::Validation(message));
        }

        tracing::warn!("Remote store replied {}: {}", status, message);
        Err(StoreError::Network(NetworkError::ServerError {
            status: status.as_u16(),
            message,
        }))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Network(e.into_network_error()))
    }

    async fn deleted(&self, url: Url) -> StoreResult<u64> {
        let response = self.send(self.client.delete(url)).await?;
        let body: DeleteResponse = Self::json(response).await?;
        Ok(body.deleted)
    }
}

impl RecordStore for RemoteStore {
    async fn list_favorites(&self) -> StoreResult<Vec<FavoriteCity>> {
        tracing::debug!("Fetching favorites");
        let url = self.url("favorites")?;
        let response = self.send(self.client.get(url)).await?;
        Self::json(response).await
    }

    async fn insert_favorite(&self, city: FavoriteCity) -> StoreResult<FavoriteCity> {
        tracing::debug!("Saving favorite: {}", city.name);
        let url = self.url("favorites")?;
        let response = self.send(self.client.post(url).json(&city)).await?;
        Self::json(response).await
    }

    async fn delete_favorite(&self, name: &str) -> StoreResult<u64> {
        tracing::debug!("Removing favorite: {}", name);
        let url = self.favorite_url(name)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.into_network_error()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let response = self.check_response(response).await?;
        let body: DeleteResponse = Self::json(response).await?;
        Ok(body.deleted)
    }

    async fn clear_favorites(&self) -> StoreResult<u64> {
        let url = self.url("favorites")?;
        self.deleted(url).await
    }

    async fn insert_history(&self, record: HistoryRecord, _cap: usize) -> StoreResult<HistoryEntry> {
        tracing::debug!("Recording history for {}", record.city);
        let url = self.url("history")?;
        let response = self.send(self.client.post(url).json(&record)).await?;
        Self::json(response).await
    }

    async fn list_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        let url = self.url("history")?;
        let request = self.client.get(url).query(&[("limit", limit)]);
        let response = self.send(request).await?;
        Self::json(response).await
    }

    async fn clear_history(&self) -> StoreResult<u64> {
        let url = self.url("history")?;
        self.deleted(url).await
    }

    async fn delete_history_before(&self, cutoff: NaiveDate) -> StoreResult<u64> {
        let url = self.url(&format!("history/before/{}", format_date(cutoff)))?;
        let response = self.send(self.client.delete(url)).await?;
        let report: PruneReport = Self::json(response).await?;
        Ok(report.deleted)
    }

    async fn top_cities(&self, limit: usize) -> StoreResult<Vec<CityCount>> {
        let url = self.url("stats/top-cities")?;
        let request = self.client.get(url).query(&[("limit", limit)]);
        let response = self.send(request).await?;
        Self::json(response).await
    }

    async fn totals(&self) -> StoreResult<Totals> {
        let url = self.url("stats/overview")?;
        let response = self.send(self.client.get(url)).await?;
        Self::json(response).await
    }

    async fn count_history_on(&self, date: &str) -> StoreResult<u64> {
        let url = self.url("stats/today")?;
        let request = self.client.get(url).query(&[("date", date)]);
        let response = self.send(request).await?;
        let stats: TodayStats = Self::json(response).await?;
        Ok(stats.requests)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let url = self.url("health")?;
        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::debug!("Remote store health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
