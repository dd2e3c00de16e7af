//! warp filters for the `/api` routes.

use std::collections::HashMap;
use std::convert::Infallible;

use nodeweather_storage::{RecordStore, Services};
use serde::de::DeserializeOwned;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::handlers::{self, error_reply};

/// Largest accepted request body.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// All API routes with CORS and request tracing applied.
pub fn routes<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    api(services)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

fn api<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and(with_services(services.clone()))
        .and_then(handlers::health::<S>);

    health
        .or(favorites(services.clone()))
        .unify()
        .or(history(services.clone()))
        .unify()
        .or(stats(services))
        .unify()
}

fn favorites<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "favorites")
        .and(warp::get())
        .and(with_services(services.clone()))
        .and_then(handlers::list_favorites::<S>);

    let add = warp::path!("api" / "favorites")
        .and(warp::post())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(handlers::add_favorite::<S>);

    let clear = warp::path!("api" / "favorites")
        .and(warp::delete())
        .and(with_services(services.clone()))
        .and_then(handlers::clear_favorites::<S>);

    let remove = warp::path!("api" / "favorites" / String)
        .and(warp::delete())
        .and(with_services(services))
        .and_then(handlers::remove_favorite::<S>);

    list.or(add).unify().or(clear).unify().or(remove).unify()
}

fn history<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "history")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_services(services.clone()))
        .and_then(handlers::list_history::<S>);

    let add = warp::path!("api" / "history")
        .and(warp::post())
        .and(with_services(services.clone()))
        .and(json_body())
        .and_then(handlers::add_history::<S>);

    let clear = warp::path!("api" / "history")
        .and(warp::delete())
        .and(with_services(services.clone()))
        .and_then(handlers::clear_history::<S>);

    let prune = warp::path!("api" / "history" / "before" / String)
        .and(warp::delete())
        .and(with_services(services))
        .and_then(handlers::prune_history::<S>);

    list.or(add).unify().or(clear).unify().or(prune).unify()
}

fn stats<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let top = warp::path!("api" / "stats" / "top-cities")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_services(services.clone()))
        .and_then(handlers::top_cities::<S>);

    let overview = warp::path!("api" / "stats" / "overview")
        .and(warp::get())
        .and(with_services(services.clone()))
        .and_then(handlers::overview::<S>);

    let today = warp::path!("api" / "stats" / "today")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_services(services))
        .and_then(handlers::today::<S>);

    top.or(overview).unify().or(today).unify()
}

fn with_services<S: RecordStore + 'static>(
    services: Services<S>,
) -> impl Filter<Extract = (Services<S>,), Error = Infallible> + Clone {
    warp::any().map(move || services.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Turn unmatched routes and malformed bodies into JSON errors.
async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let response = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "Not found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        tracing::debug!("Rejected request body: {}", e);
        error_reply(StatusCode::BAD_REQUEST, "Invalid JSON body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_reply(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_reply(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected application/json")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(response)
}
