//! Chat relay endpoint

use std::sync::Arc;

use warp::Filter;

use super::{json_body, respond, with_installation};
use crate::app::Installation;
use crate::relay::RelayRequest;

/// POST /relay - `{ message, tags[], history[] }`
pub fn route(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("relay")
        .and(warp::post())
        .and(json_body::<RelayRequest>())
        .and(with_installation(installation))
        .and_then(|request: RelayRequest, installation: Arc<Installation>| async move {
            Ok::<_, warp::Rejection>(respond(installation.relay(request).await))
        })
}
