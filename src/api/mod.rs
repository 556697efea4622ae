//! Router Frontend HTTP surface (§4.7, §6): `/asset_state`, `/asset_stream` (redirect),
//! `/health`, `/ready`.
//!
//! Grounded on the teacher's `api/server.rs` router assembly; the routing layer's own FastAPI
//! route module isn't part of the indexed source, so `/asset_stream`'s 302 redirect follows the
//! documented HTTP surface directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::controller::RoutingController;
use crate::core::error::AppError;
use crate::core::health::health;
use crate::core::readiness::ReadinessDocument;
use crate::snapshot::SnapshotAdapter;

#[derive(Clone)]
pub struct RouterState {
    pub controller: Arc<RoutingController>,
    pub snapshot: Arc<SnapshotAdapter>,
}

#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub asset_uuid: Option<String>,
    pub id: Option<String>,
}

/// Synchronous snapshot lookup against the point-query projection (§4.8).
#[utoipa::path(
    get,
    path = "/asset_state",
    tag = "assets",
    params(("asset_uuid" = String, Query, description = "asset identifier"), ("id" = Option<String>, Query, description = "data item id")),
    responses((status = 200, description = "latest known value(s)"), (status = 404, description = "no matching row"))
)]
async fn asset_state(
    State(state): State<RouterState>,
    Query(query): Query<AssetQuery>,
) -> Result<impl IntoResponse, AppError> {
    let asset_uuid = query
        .asset_uuid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("asset_uuid is required".to_string()))?;
    let snapshot = state.snapshot.snapshot(&asset_uuid, query.id.as_deref()).await?;
    Ok(axum::Json(snapshot))
}

/// Resolves an asset to its group's worker URL and redirects the client to its SSE stream (§4.7).
#[utoipa::path(
    get,
    path = "/asset_stream",
    tag = "assets",
    params(("asset_uuid" = String, Query, description = "asset identifier"), ("id" = Option<String>, Query, description = "data item id")),
    responses((status = 302, description = "redirect to the worker's SSE stream"), (status = 404, description = "asset has no group"))
)]
async fn asset_stream(
    State(state): State<RouterState>,
    Query(query): Query<AssetQuery>,
) -> Result<impl IntoResponse, AppError> {
    let asset_uuid = query
        .asset_uuid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("asset_uuid is required".to_string()))?;

    let url = state
        .controller
        .resolve(&asset_uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no group for asset_uuid={asset_uuid}")))?;

    let mut target = format!("{url}/asset_stream?asset_uuid={asset_uuid}");
    if let Some(id) = query.id {
        target.push_str(&format!("&id={id}"));
    }
    // `Redirect` has no 302 constructor (`to()`->303, `temporary()`->307, `permanent()`->308).
    Ok((StatusCode::FOUND, [(header::LOCATION, target)]))
}

/// Aggregated readiness across the grouping strategy, deployment backend, and every active worker.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses((status = 200, description = "all sub-components ready", body = ReadinessDocument), (status = 503, description = "at least one sub-component not ready", body = ReadinessDocument))
)]
async fn ready(State(state): State<RouterState>) -> ReadinessDocument {
    let (ready, issues): (bool, HashMap<String, String>) = state.controller.is_ready().await;
    ReadinessDocument::new(ready, issues)
}

pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/asset_state", get(asset_state))
        .route("/asset_stream", get(asset_stream))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}
