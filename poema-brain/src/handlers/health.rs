//! Health check endpoint

use std::sync::Arc;

use warp::Filter;

use crate::app::Installation;

/// GET /health - Liveness plus archive and source counters
pub fn route(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .map(move || warp::reply::json(&installation.health()))
}
