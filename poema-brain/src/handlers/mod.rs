//! HTTP route handlers for POEMA
//!
//! Organized by functional area:
//! - `health`: Health check endpoint
//! - `engines`: Engine snapshots and commands
//! - `archive`: Associative archive query and clusters
//! - `relay`: Chat relay (POST)
//!
//! Every failure becomes a JSON body with an `error` field.

pub mod archive;
pub mod engines;
pub mod health;
pub mod relay;

use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use poema_core::error::{PoemaError, PoemaResult};

use crate::app::Installation;

/// Largest accepted JSON body
const BODY_LIMIT: u64 = 16 * 1024;

/// Compose all routes into a single filter
pub fn routes(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let health = health::route(installation.clone());
    let engine_routes = engines::routes(installation.clone());
    let archive_routes = archive::routes(installation.clone());
    let relay = relay::route(installation);

    health
        .or(engine_routes)
        .or(archive_routes)
        .or(relay)
        .recover(handle_rejection)
}

/// Pass the installation into a handler
fn with_installation(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (Arc<Installation>,), Error = Infallible> + Clone {
    warp::any().map(move || installation.clone())
}

/// JSON body with a size cap
fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

/// Serialize a result, mapping errors to a status and `{ "error": ... }`
fn respond<T: Serialize>(result: PoemaResult<T>) -> Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => error_reply(status_for(&e), &e.to_string()),
    }
}

fn status_for(error: &PoemaError) -> StatusCode {
    match error {
        PoemaError::EngineNotFound(_) | PoemaError::EntityNotFound(_) => StatusCode::NOT_FOUND,
        PoemaError::PopulationLimit { .. } => StatusCode::CONFLICT,
        PoemaError::InvalidState(_)
        | PoemaError::InvalidMetric(_)
        | PoemaError::DimensionMismatch { .. }
        | PoemaError::Entity(_) => StatusCode::BAD_REQUEST,
        PoemaError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(warp::reply::json(&serde_json::json!({ "error": message })), status).into_response()
}

async fn handle_rejection(rejection: warp::Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("bad body: {}", e))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "body too large".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::warn!("Unhandled rejection: {:?}", rejection);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(error_reply(status, &message))
}
