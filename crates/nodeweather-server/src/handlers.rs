//! Request handlers. Every handler resolves to a JSON reply; store faults
//! become `500` with a generic message and validation faults become `400`.

use std::collections::HashMap;

use nodeweather_storage::{
    parse_date, DeleteResponse, NewFavorite, NewHistoryEntry, RecordStore, Services, StoreError,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// Error body shared by every failure reply.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

pub(crate) fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    json_reply(
        &ErrorBody {
            error: message.into(),
        },
        status,
    )
}

fn store_failure(err: StoreError, action: &str) -> Response {
    match err {
        StoreError::Validation(message) => error_reply(StatusCode::BAD_REQUEST, message),
        other => {
            tracing::error!("Failed to {}: {}", action, other);
            error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {}", action),
            )
        }
    }
}

fn reply<T: Serialize>(result: Result<T, StoreError>, status: StatusCode, action: &str) -> Response {
    match result {
        Ok(value) => json_reply(&value, status),
        Err(e) => store_failure(e, action),
    }
}

/// Integer query parameter. Missing or unparseable values are `None`.
fn int_param(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.trim().parse().ok())
}

pub async fn health<S: RecordStore>(services: Services<S>) -> Result<Response, Rejection> {
    let healthy = services.store().health_check().await.unwrap_or(false);
    let response = if healthy {
        json_reply(&serde_json::json!({ "status": "ok" }), StatusCode::OK)
    } else {
        json_reply(
            &serde_json::json!({ "status": "unavailable" }),
            StatusCode::SERVICE_UNAVAILABLE,
        )
    };
    Ok(response)
}

pub async fn list_favorites<S: RecordStore>(services: Services<S>) -> Result<Response, Rejection> {
    let result = services.favorites.list().await;
    Ok(reply(result, StatusCode::OK, "get favorites"))
}

pub async fn add_favorite<S: RecordStore>(
    services: Services<S>,
    input: NewFavorite,
) -> Result<Response, Rejection> {
    let result = services.favorites.add(input).await;
    Ok(reply(result, StatusCode::CREATED, "add favorite"))
}

pub async fn remove_favorite<S: RecordStore>(
    raw_name: String,
    services: Services<S>,
) -> Result<Response, Rejection> {
    let name = match percent_decode_str(&raw_name).decode_utf8() {
        Ok(name) => name,
        Err(_) => return Ok(error_reply(StatusCode::BAD_REQUEST, "Invalid city name")),
    };

    let response = match services.favorites.remove_by_name(&name).await {
        Ok(0) => error_reply(StatusCode::NOT_FOUND, "Favorite not found"),
        Ok(deleted) => json_reply(&DeleteResponse::deleted(deleted), StatusCode::OK),
        Err(e) => store_failure(e, "delete favorite"),
    };
    Ok(response)
}

pub async fn clear_favorites<S: RecordStore>(services: Services<S>) -> Result<Response, Rejection> {
    let result = services.favorites.clear().await.map(DeleteResponse::deleted);
    Ok(reply(result, StatusCode::OK, "clear favorites"))
}

pub async fn list_history<S: RecordStore>(
    params: HashMap<String, String>,
    services: Services<S>,
) -> Result<Response, Rejection> {
    let result = services.history.list(int_param(&params, "limit")).await;
    Ok(reply(result, StatusCode::OK, "get history"))
}

pub async fn add_history<S: RecordStore>(
    services: Services<S>,
    input: NewHistoryEntry,
) -> Result<Response, Rejection> {
    let result = services.history.add(input).await;
    Ok(reply(result, StatusCode::CREATED, "add history record"))
}

pub async fn clear_history<S: RecordStore>(services: Services<S>) -> Result<Response, Rejection> {
    let result = services.history.clear().await.map(DeleteResponse::deleted);
    Ok(reply(result, StatusCode::OK, "clear history"))
}

pub async fn prune_history<S: RecordStore>(
    raw_date: String,
    services: Services<S>,
) -> Result<Response, Rejection> {
    let Some(cutoff) = parse_date(&raw_date) else {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("Invalid date '{}': expected YYYY-MM-DD", raw_date),
        ));
    };

    let result = services.history.prune_before(cutoff).await;
    Ok(reply(result, StatusCode::OK, "prune history"))
}

pub async fn top_cities<S: RecordStore>(
    params: HashMap<String, String>,
    services: Services<S>,
) -> Result<Response, Rejection> {
    let result = services.stats.top_cities(int_param(&params, "limit")).await;
    Ok(reply(result, StatusCode::OK, "get top cities stats"))
}

pub async fn overview<S: RecordStore>(services: Services<S>) -> Result<Response, Rejection> {
    let result = services.stats.totals().await;
    Ok(reply(result, StatusCode::OK, "get stats overview"))
}

pub async fn today<S: RecordStore>(
    params: HashMap<String, String>,
    services: Services<S>,
) -> Result<Response, Rejection> {
    let date = params.get("date").map(String::as_str);
    let result = services.stats.today(date).await;
    Ok(reply(result, StatusCode::OK, "get today's stats"))
}
