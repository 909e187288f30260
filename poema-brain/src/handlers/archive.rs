//! Associative archive endpoints

use std::sync::Arc;

use serde::Deserialize;
use warp::Filter;

use crate::app::Installation;

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    q: String,
}

/// Combine all archive routes
pub fn routes(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    query(installation.clone()).or(clusters(installation))
}

/// GET /archive/query?q=... - Ranked passages (empty `q` gives `[]`)
fn query(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("archive" / "query")
        .and(warp::get())
        .and(warp::query::<QueryParams>())
        .map(move |params: QueryParams| warp::reply::json(&installation.query(&params.q)))
}

/// GET /archive/clusters - k-means groups of archived passages
fn clusters(
    installation: Arc<Installation>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("archive" / "clusters").and(warp::get()).map(move || {
        let clusters = installation.clusters();
        warp::reply::json(&serde_json::json!({
            "total_clusters": clusters.len(),
            "clusters": clusters
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::installation;

    #[tokio::test]
    async fn test_empty_query_is_empty_list() {
        let api = routes(installation());
        let response = warp::test::request().path("/archive/query?q=").reply(&api).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"[]");
    }

    #[tokio::test]
    async fn test_clusters_after_ingest() {
        let installation = installation();
        installation.ingest().await.unwrap();

        let api = routes(installation);
        let response = warp::test::request().path("/archive/clusters").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["total_clusters"], 1);
    }
}
