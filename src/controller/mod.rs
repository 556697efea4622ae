//! Routing Controller (§4.6): orchestrates group lifecycle, resolves assets to worker URLs,
//! and aggregates readiness across the grouping strategy, the deployment backend, and every
//! active worker.
//!
//! Grounded on `original_source/routing_layer/app/core/controller/routing_controller.py`'s
//! `RoutingController` for the `deploy`/`teardown`/`resolve` shape, and on the teacher's
//! `data/topics/pubsub.rs` double-checked-locking pattern for the lazy single-flight guard
//! (`get_or_create_bridge` reimagined as `get_or_create_group`).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::core::config::RoutingMode;
use crate::core::error::AppError;
use crate::deploy::DeploymentBackend;
use crate::grouping::GroupingStrategy;

pub struct RoutingController {
    grouping: Arc<dyn GroupingStrategy>,
    deployment: Arc<dyn DeploymentBackend>,
    routing_mode: RoutingMode,
    /// Groups known to have a topic + worker deployed. Populated eagerly at `deploy()` time, or
    /// lazily (once) per group on first `resolve` in lazy mode.
    active_groups: DashMap<String, ()>,
    /// One lock per group name, so two concurrent `resolve` calls for the same unseen group
    /// coalesce into a single deploy instead of racing (SPEC_FULL.md §4.6, property 8).
    deploy_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl RoutingController {
    pub fn new(
        grouping: Arc<dyn GroupingStrategy>,
        deployment: Arc<dyn DeploymentBackend>,
        routing_mode: RoutingMode,
    ) -> Self {
        Self {
            grouping,
            deployment,
            routing_mode,
            active_groups: DashMap::new(),
            deploy_locks: DashMap::new(),
        }
    }

    /// Declares every known group's derived stream and worker service, topic before worker, then
    /// deploys the Router Frontend service (a no-op in `local` environment, enforced by the
    /// deployment backend itself).
    pub async fn deploy(&self) -> Result<(), AppError> {
        for group in self.grouping.all_groups().await? {
            self.deploy_group(&group).await?;
        }
        self.deployment.deploy_routing_layer_api().await
    }

    /// Symmetric reverse of `deploy()`: per-group stream and service removal, then the Router
    /// Frontend service.
    pub async fn teardown(&self) -> Result<(), AppError> {
        for group in self.grouping.all_groups().await? {
            self.grouping.remove_derived_stream(&group).await?;
            self.deployment.remove_service(&group).await?;
            self.active_groups.remove(&group);
        }
        self.deployment.remove_routing_layer_api().await
    }

    /// Resolves `asset_uuid` to its worker URL. `None` if the asset has no group, or (eager mode
    /// only) if the group was not known at startup. In lazy mode an unseen group is deployed on
    /// demand before its URL is returned.
    pub async fn resolve(&self, asset_uuid: &str) -> Result<Option<String>, AppError> {
        let Some(group) = self.grouping.group_for_asset(asset_uuid).await? else {
            return Ok(None);
        };

        match self.routing_mode {
            RoutingMode::Eager => {
                if self.active_groups.contains_key(&group) {
                    Ok(Some(self.deployment.service_url(&group)))
                } else {
                    Ok(None)
                }
            }
            RoutingMode::Lazy => {
                self.ensure_deployed(&group).await?;
                Ok(Some(self.deployment.service_url(&group)))
            }
        }
    }

    /// Aggregates readiness of the grouping strategy, the deployment backend's control plane, and
    /// every active worker's `/ready` endpoint. Overall ready iff every sub-readiness is true
    /// (property 7: `issues` is empty iff the overall result is true).
    pub async fn is_ready(&self) -> (bool, HashMap<String, String>) {
        let mut issues = HashMap::new();
        let mut ready = true;

        let (grouping_ready, grouping_reason) = self.grouping.is_ready().await;
        if !grouping_ready {
            ready = false;
            issues.insert("grouping_strategy".to_string(), grouping_reason);
        }

        let (deployment_ready, deployment_reason) = self.deployment.is_ready().await;
        if !deployment_ready {
            ready = false;
            issues.insert("deployment_backend".to_string(), deployment_reason);
        }

        for entry in self.active_groups.iter() {
            let group = entry.key().clone();
            let (worker_ready, reason) = self.deployment.check_service_ready(&group).await;
            if !worker_ready {
                ready = false;
                issues.insert(format!("worker:{group}"), reason);
            }
        }

        (ready, issues)
    }

    async fn deploy_group(&self, group: &str) -> Result<(), AppError> {
        self.grouping.create_derived_stream(group).await?;
        self.deployment.deploy_service(group).await?;
        self.active_groups.insert(group.to_string(), ());
        Ok(())
    }

    /// Double-checked locking: a fast path for groups already deployed, and a per-group lock so
    /// concurrent first-resolves of the same group run `deploy_group` exactly once.
    async fn ensure_deployed(&self, group: &str) -> Result<(), AppError> {
        if self.active_groups.contains_key(group) {
            return Ok(());
        }

        let lock = self
            .deploy_locks
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if self.active_groups.contains_key(group) {
            return Ok(());
        }
        self.deploy_group(group).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGrouping {
        group: Option<String>,
        groups: Vec<String>,
        create_calls: AtomicUsize,
    }

    #[async_trait]
    impl GroupingStrategy for FakeGrouping {
        async fn group_for_asset(&self, _asset_uuid: &str) -> Result<Option<String>, AppError> {
            Ok(self.group.clone())
        }
        async fn all_groups(&self) -> Result<Vec<String>, AppError> {
            Ok(self.groups.clone())
        }
        async fn create_derived_stream(&self, _group: &str) -> Result<(), AppError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_derived_stream(&self, _group: &str) -> Result<(), AppError> {
            Ok(())
        }
        async fn is_ready(&self) -> (bool, String) {
            (true, "ok".to_string())
        }
    }

    struct FakeDeployment {
        deploy_calls: AtomicUsize,
        ready_groups: Vec<String>,
    }

    #[async_trait]
    impl DeploymentBackend for FakeDeployment {
        async fn deploy_service(&self, _group: &str) -> Result<(), AppError> {
            self.deploy_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_service(&self, _group: &str) -> Result<(), AppError> {
            Ok(())
        }
        async fn deploy_routing_layer_api(&self) -> Result<(), AppError> {
            Ok(())
        }
        async fn remove_routing_layer_api(&self) -> Result<(), AppError> {
            Ok(())
        }
        fn service_url(&self, group: &str) -> String {
            format!("http://{group}.local")
        }
        async fn check_service_ready(&self, group: &str) -> (bool, String) {
            if self.ready_groups.contains(&group.to_string()) {
                (true, "ok".to_string())
            } else {
                (false, "not ready".to_string())
            }
        }
        async fn is_ready(&self) -> (bool, String) {
            (true, "ok".to_string())
        }
    }

    #[tokio::test]
    async fn eager_mode_resolves_only_groups_deployed_at_startup() {
        let grouping = Arc::new(FakeGrouping {
            group: Some("wc1".to_string()),
            groups: vec!["wc1".to_string()],
            create_calls: AtomicUsize::new(0),
        });
        let deployment = Arc::new(FakeDeployment {
            deploy_calls: AtomicUsize::new(0),
            ready_groups: vec!["wc1".to_string()],
        });
        let controller = RoutingController::new(grouping, deployment, RoutingMode::Eager);
        controller.deploy().await.unwrap();

        let url = controller.resolve("A1").await.unwrap();
        assert_eq!(url, Some("http://wc1.local".to_string()));
    }

    #[tokio::test]
    async fn eager_mode_unknown_group_returns_none() {
        let grouping = Arc::new(FakeGrouping {
            group: Some("wc2".to_string()),
            groups: vec!["wc1".to_string()],
            create_calls: AtomicUsize::new(0),
        });
        let deployment = Arc::new(FakeDeployment {
            deploy_calls: AtomicUsize::new(0),
            ready_groups: vec![],
        });
        let controller = RoutingController::new(grouping, deployment, RoutingMode::Eager);
        controller.deploy().await.unwrap();

        assert_eq!(controller.resolve("A1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lazy_mode_deploys_group_on_first_resolve() {
        let grouping = Arc::new(FakeGrouping {
            group: Some("wc1".to_string()),
            groups: vec![],
            create_calls: AtomicUsize::new(0),
        });
        let deployment = Arc::new(FakeDeployment {
            deploy_calls: AtomicUsize::new(0),
            ready_groups: vec![],
        });
        let controller = RoutingController::new(grouping.clone(), deployment.clone(), RoutingMode::Lazy);

        let url = controller.resolve("A1").await.unwrap();
        assert_eq!(url, Some("http://wc1.local".to_string()));
        assert_eq!(deployment.deploy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(grouping.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_mode_concurrent_resolves_deploy_exactly_once() {
        let grouping = Arc::new(FakeGrouping {
            group: Some("wc1".to_string()),
            groups: vec![],
            create_calls: AtomicUsize::new(0),
        });
        let deployment = Arc::new(FakeDeployment {
            deploy_calls: AtomicUsize::new(0),
            ready_groups: vec![],
        });
        let controller = Arc::new(RoutingController::new(grouping.clone(), deployment.clone(), RoutingMode::Lazy));

        let a = controller.clone();
        let b = controller.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.resolve("A1").await.unwrap() }),
            tokio::spawn(async move { b.resolve("A2").await.unwrap() }),
        );
        assert!(r1.unwrap().is_some());
        assert!(r2.unwrap().is_some());
        assert_eq!(deployment.deploy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(grouping.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn is_ready_true_iff_every_sub_readiness_true() {
        let grouping = Arc::new(FakeGrouping {
            group: None,
            groups: vec!["wc1".to_string(), "wc2".to_string()],
            create_calls: AtomicUsize::new(0),
        });
        let deployment = Arc::new(FakeDeployment {
            deploy_calls: AtomicUsize::new(0),
            ready_groups: vec!["wc1".to_string()],
        });
        let controller = RoutingController::new(grouping, deployment, RoutingMode::Eager);
        controller.deploy().await.unwrap();

        let (ready, issues) = controller.is_ready().await;
        assert!(!ready);
        assert!(issues.contains_key("worker:wc2"));
        assert!(!issues.contains_key("worker:wc1"));
    }
}
