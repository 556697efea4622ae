//! The structured readiness document shared by the worker's and the Router Frontend's `/ready`
//! handlers (§4.6 `is_ready`, §6 `GET /ready`).

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessDocument {
    pub status: &'static str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub issues: HashMap<String, String>,
}

impl ReadinessDocument {
    pub fn new(ready: bool, issues: HashMap<String, String>) -> Self {
        Self {
            status: if ready { "ready" } else { "not ready" },
            issues,
        }
    }
}

impl IntoResponse for ReadinessDocument {
    fn into_response(self) -> Response {
        let status = if self.status == "ready" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_issues_means_ready() {
        let doc = ReadinessDocument::new(true, HashMap::new());
        assert_eq!(doc.status, "ready");
    }

    #[test]
    fn any_issue_means_not_ready() {
        let mut issues = HashMap::new();
        issues.insert("dispatcher".to_string(), "stopped".to_string());
        let doc = ReadinessDocument::new(false, issues);
        assert_eq!(doc.status, "not ready");
        assert_eq!(doc.issues.len(), 1);
    }
}
