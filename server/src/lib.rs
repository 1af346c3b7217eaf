use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use postfeed_core::cache::{CacheStats, SearchCache};
use postfeed_core::config::{CachePolicy, FeedConfig};
use postfeed_core::enricher::EnrichedPost;
use postfeed_core::feed::{FeedAssembler, PageRequest};
use postfeed_core::persist::{GraphPaths, SledGraph};
use postfeed_core::{FeedError, Timestamp};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
    pub since: Option<Timestamp>,
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct LatestParams {
    pub limit: Option<usize>,
    pub since: Option<Timestamp>,
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub feed: FeedAssembler,
}

type ApiError = (StatusCode, Json<Value>);

/// Open the sled store under `store_dir` and wire a feed over it with a fresh cache.
pub fn open_feed(store_dir: &str, policy: CachePolicy, config: FeedConfig) -> Result<FeedAssembler> {
    let graph = Arc::new(SledGraph::open(&GraphPaths::new(store_dir))?);
    let cache = SearchCache::new(graph.clone(), policy);
    Ok(FeedAssembler::new(graph, cache, config))
}

pub fn build_app(feed: FeedAssembler) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/search/latest", get(latest_handler))
        .route("/cache/stats", get(stats_handler))
        .with_state(AppState { feed })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<EnrichedPost>>, ApiError> {
    let start = Instant::now();
    let req = PageRequest { limit: params.limit, since: params.since, username: params.username };
    let posts = state.feed.search(&params.q, &req).await.map_err(api_error)?;
    tracing::debug!(q = %params.q, results = posts.len(), took_ms = start.elapsed().as_millis() as u64, "search served");
    Ok(Json(posts))
}

pub async fn latest_handler(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<EnrichedPost>>, ApiError> {
    let start = Instant::now();
    let req = PageRequest { limit: params.limit, since: params.since, username: params.username };
    let posts = state.feed.latest(&req).await.map_err(api_error)?;
    tracing::debug!(results = posts.len(), took_ms = start.elapsed().as_millis() as u64, "latest served");
    Ok(Json(posts))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.feed.cache().stats())
}

fn api_error(e: FeedError) -> ApiError {
    let status = match &e {
        FeedError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        FeedError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
    } else {
        tracing::warn!(error = %e, "request failed");
    }
    (status, Json(json!({ "error": e.to_string() })))
}
