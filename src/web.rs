use crate::engine::{Engine, EngineError};
use crate::model::{ProbeKind, Target};
use crate::stats::TargetStats;
use crate::store::{StoreError, StoreGateway};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn StoreGateway>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/targets", get(list_targets).post(create_target))
        .route(
            "/api/targets/:id",
            get(get_target).put(update_target).delete(delete_target),
        )
        .route("/api/targets/:id/check", post(check_target))
        .route("/api/sweep", post(run_sweep))
        .route("/api/cleanup", post(run_cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Target plus its stats and the values derived from the counters on read.
#[derive(Serialize)]
struct TargetView {
    #[serde(flatten)]
    target: Target,
    stats: StatsView,
}

#[derive(Serialize)]
struct StatsView {
    #[serde(flatten)]
    stats: TargetStats,
    uptime_percent: f64,
    average_latency_ms: f64,
}

impl TargetView {
    fn new(target: Target, stats: TargetStats) -> Self {
        let uptime_percent = stats.uptime_percent();
        let average_latency_ms = stats.average_latency_ms();
        Self {
            target,
            stats: StatsView {
                stats,
                uptime_percent,
                average_latency_ms,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TargetPayload {
    owner_id: String,
    name: String,
    url: String,
    #[serde(default)]
    kind: Option<ProbeKind>,
    #[serde(default)]
    interval_minutes: Option<u32>,
    #[serde(default)]
    active: Option<bool>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

async fn list_targets(State(state): State<AppState>) -> Response {
    let targets = match state.store.list_all().await {
        Ok(targets) => targets,
        Err(e) => return store_error(e),
    };

    let mut views = Vec::with_capacity(targets.len());
    for target in targets {
        match state.store.get(&target.id).await {
            Ok(Some((target, stats))) => views.push(TargetView::new(target, stats)),
            Ok(None) => {}
            Err(e) => return store_error(e),
        }
    }
    Json(views).into_response()
}

async fn get_target(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(Some((target, stats))) => Json(TargetView::new(target, stats)).into_response(),
        Ok(None) => not_found(),
        Err(e) => store_error(e),
    }
}

async fn create_target(
    State(state): State<AppState>,
    Json(payload): Json<TargetPayload>,
) -> Response {
    let mut target = Target::new(
        &payload.owner_id,
        &payload.name,
        &payload.url,
        payload.kind.unwrap_or(ProbeKind::Https),
        payload.interval_minutes.unwrap_or(5),
    );
    if let Some(active) = payload.active {
        target.active = active;
    }

    if let Err(e) = target.validate() {
        return bad_request(e.to_string());
    }
    if let Err(e) = state.store.insert(target.clone()).await {
        return store_error(e);
    }

    // Give the caller a first datapoint shortly after creation.
    if target.active {
        let engine = state.engine.clone();
        let id = target.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if let Err(e) = engine.check_now(&id).await {
                tracing::debug!("Initial check for {} failed: {}", id, e);
            }
        });
    }

    (StatusCode::CREATED, Json(target)).into_response()
}

async fn update_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TargetPayload>,
) -> Response {
    let mut target = match state.store.get(&id).await {
        Ok(Some((target, _))) => target,
        Ok(None) => return not_found(),
        Err(e) => return store_error(e),
    };

    target.name = payload.name.trim().to_string();
    target.url = payload.url.trim().to_string();
    if let Some(kind) = payload.kind {
        target.kind = kind;
    }
    if let Some(interval) = payload.interval_minutes {
        target.interval_minutes = interval;
    }
    if let Some(active) = payload.active {
        target.active = active;
    }

    if let Err(e) = target.validate() {
        return bad_request(e.to_string());
    }
    match state.store.update(target.clone()).await {
        Ok(true) => Json(target).into_response(),
        Ok(false) => not_found(),
        Err(e) => store_error(e),
    }
}

async fn delete_target(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.remove(&id).await {
        Ok(true) => Json(json!({ "message": "target deleted" })).into_response(),
        Ok(false) => not_found(),
        Err(e) => store_error(e),
    }
}

async fn check_target(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.check_now(&id).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn run_sweep(State(state): State<AppState>) -> Response {
    match state.engine.run_sweep().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn run_cleanup(State(state): State<AppState>) -> Response {
    match state.engine.run_retention_cleanup().await {
        Ok(removed) => Json(json!({ "removed": removed })).into_response(),
        Err(e) => engine_error(e),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "target not found" }))).into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn store_error(e: StoreError) -> Response {
    tracing::error!("Store failure: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "storage failure" })),
    )
        .into_response()
}

fn engine_error(e: EngineError) -> Response {
    match e {
        EngineError::UnknownTarget(_) => not_found(),
        EngineError::InactiveTarget(id) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": format!("target is not active: {}", id) })),
        )
            .into_response(),
        EngineError::Store(err) => store_error(err),
    }
}
