//! Worker process HTTP surface (§4.3 SSE Endpoint, §6): `/asset_stream`, `/health`, `/ready`.
//!
//! Grounded on the teacher's `api/server.rs` router-assembly shape, reduced to the worker's much
//! smaller surface: one state struct carried through `with_state`, a `CompressionLayer`, and
//! `axum::serve(...).with_graceful_shutdown(...)`.

pub mod sse;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::core::health::health;
use crate::core::readiness::ReadinessDocument;
use crate::dispatcher::{DispatcherState, StreamDispatcher};
use crate::registry::{MatchMode, SubscriptionRegistry};

#[derive(Clone)]
pub struct WorkerState {
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: StreamDispatcher,
    pub match_mode: MatchMode,
    pub queue_capacity: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Reports whether this worker's Stream Dispatcher has reached the `Running` state.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses((status = 200, description = "dispatcher is running", body = ReadinessDocument), (status = 503, description = "dispatcher not yet running", body = ReadinessDocument))
)]
async fn ready(axum::extract::State(state): axum::extract::State<WorkerState>) -> ReadinessDocument {
    let mut issues = std::collections::HashMap::new();
    let dispatcher_ready = matches!(state.dispatcher.state(), DispatcherState::Running);
    if !dispatcher_ready {
        issues.insert("dispatcher".to_string(), format!("{:?}", state.dispatcher.state()));
    }
    ReadinessDocument::new(dispatcher_ready, issues)
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/asset_stream", get(sse::asset_stream))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}
