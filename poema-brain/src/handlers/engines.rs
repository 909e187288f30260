//! Engine snapshots and commands

use std::sync::Arc;

use serde::Deserialize;
use warp::Filter;

use poema_core::EntityId;

use super::{json_body, respond, with_installation};
use crate::app::Installation;
use crate::engine::EngineCommand;

#[derive(Debug, Deserialize)]
struct PerturbBody {
    intensity: f32,
}

/// Combine all engine routes
pub fn routes(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    list(installation.clone())
        .or(entities(installation.clone()))
        .or(metrics(installation.clone()))
        .or(history(installation.clone()))
        .or(evolve(installation.clone()))
        .or(perturb(installation.clone()))
        .or(entity_command(installation))
}

/// GET /engines - Name, population and host counters of every kernel
fn list(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines")
        .and(warp::get())
        .map(move || warp::reply::json(&installation.summaries()))
}

/// GET /engines/{name}/entities
fn entities(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "entities")
        .and(warp::get())
        .and(with_installation(installation))
        .map(|name: String, installation: Arc<Installation>| respond(installation.entities(&name)))
}

/// GET /engines/{name}/metrics
fn metrics(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "metrics")
        .and(warp::get())
        .and(with_installation(installation))
        .map(|name: String, installation: Arc<Installation>| respond(installation.metrics(&name)))
}

/// GET /engines/{name}/history
fn history(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "history")
        .and(warp::get())
        .and(with_installation(installation))
        .map(|name: String, installation: Arc<Installation>| respond(installation.history(&name)))
}

/// POST /engines/{name}/evolve - One tick and cull, now
fn evolve(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "evolve")
        .and(warp::post())
        .and(with_installation(installation))
        .map(|name: String, installation: Arc<Installation>| {
            respond(installation.command(&name, EngineCommand::ForceEvolution))
        })
}

/// POST /engines/{name}/perturb - `{ "intensity": f32 }`
fn perturb(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "perturb")
        .and(warp::post())
        .and(json_body::<PerturbBody>())
        .and(with_installation(installation))
        .map(|name: String, body: PerturbBody, installation: Arc<Installation>| {
            respond(installation.command(&name, EngineCommand::Perturb { intensity: body.intensity }))
        })
}

/// POST /engines/{name}/entities/{id}/{pause|resume|spawn}
fn entity_command(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("engines" / String / "entities" / u64 / String)
        .and(warp::post())
        .and(with_installation(installation))
        .and_then(|name: String, id: u64, action: String, installation: Arc<Installation>| async move {
            let id = EntityId(id);
            let command = match action.as_str() {
                "pause" => EngineCommand::Pause { id },
                "resume" => EngineCommand::Resume { id },
                "spawn" => EngineCommand::Spawn { parent: id },
                _ => return Err(warp::reject::not_found()),
            };
            Ok::<_, warp::Rejection>(respond(installation.command(&name, command)))
        })
}
