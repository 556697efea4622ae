//! The error kind taxonomy (§7): `InvalidInput`, `NotFound`, `UpstreamUnavailable`,
//! `PreconditionFailed`, `Transient`, mapped to HTTP responses at the axum boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Fatal at startup; never reaches an HTTP boundary — propagated out of `main` instead.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Back-pressure drop for a single subscriber; counted, never surfaced as an HTTP error.
    #[error("transient: {0}")]
    Transient(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::UpstreamUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::PreconditionFailed(msg) => {
                tracing::error!(error = %msg, "precondition failure reached HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            Self::Transient(msg) => {
                tracing::warn!(error = %msg, "transient error reached HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "detail": message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn invalid_input_maps_to_400() {
        let resp = AppError::InvalidInput("missing asset_uuid".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "missing asset_uuid");
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError::NotFound("no row".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_unavailable_maps_to_503() {
        let resp = AppError::UpstreamUnavailable("ksqldb down".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
