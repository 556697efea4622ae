//! Deployment Backend (§4.5): creates/removes one worker service per group, resolves group
//! URLs, and probes worker readiness.

pub mod docker;

use async_trait::async_trait;

use crate::core::error::AppError;

pub use docker::DockerDeploymentBackend;

/// Capability set a deployment backend must provide. `GroupingStrategy` and `DeploymentBackend`
/// are the only variation points in this crate (SPEC_FULL.md §9); one real implementation ships
/// (`DockerDeploymentBackend`).
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Idempotently create the worker service for `group`.
    async fn deploy_service(&self, group: &str) -> Result<(), AppError>;

    /// Idempotently remove the worker service for `group` (no-op if absent).
    async fn remove_service(&self, group: &str) -> Result<(), AppError>;

    /// Idempotently deploy the Router Frontend service. No-op in `local` environment.
    async fn deploy_routing_layer_api(&self) -> Result<(), AppError>;

    /// Idempotently remove the Router Frontend service. No-op in `local` environment.
    async fn remove_routing_layer_api(&self) -> Result<(), AppError>;

    /// The deterministic URL clients use to reach `group`'s worker service.
    fn service_url(&self, group: &str) -> String;

    /// Probe `{service_url}/ready` (§4.5). Never returns `Err`: failure is surfaced as
    /// `(false, reason)`.
    async fn check_service_ready(&self, group: &str) -> (bool, String);

    /// Self-reported readiness of the backend's control plane (e.g. the orchestrator API).
    async fn is_ready(&self) -> (bool, String);
}
