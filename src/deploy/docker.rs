//! `DockerDeploymentBackend`: deploys one Docker Swarm service per group (`DEPLOYMENT_PLATFORM=
//! swarm`), or one plain Docker container per group (`DEPLOYMENT_PLATFORM=docker`), and resolves
//! their URLs.
//!
//! Grounded on `original_source/routing_layer/app/core/controller/deployment_platform.py`'s
//! `SwarmDeploymentPlatform`: the construction-time precondition check (engine reachable, swarm
//! active, node is manager), `_sanitize_group_name`/`_service_name`, `_get_host_port`'s hash
//! scheme (re-expressed with `sha2` instead of `hashlib.md5`), and `check_service_ready`'s HTTP
//! probe are all carried over unchanged in shape. The plain-container path is grounded on the
//! sibling `docker_deployment_platform.py`'s `DockerDeploymentPlatform`: `containers.run(...)`
//! with published ports/env/cpu_quota becomes `create_container`+`start_container`,
//! `container.stop()`+`container.remove()` becomes `stop_container`+`remove_container`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointPortConfigPublishModeEnum, EndpointSpec,
    HostConfig, NetworkAttachmentConfig, PortBinding, ResourceObject, ResourceSpecs, ServiceSpec, ServiceSpecMode,
    ServiceSpecModeReplicated, TaskSpec, TaskSpecContainerSpec, TaskSpecResources,
};
use bollard::service::{CreateServiceOptions, ListServicesOptions, RemoveServiceOptions};
use sha2::{Digest, Sha256};

use crate::core::config::{DeploymentPlatformKind, Environment, GroupDeploymentConfig, RoutingLayerDeploymentConfig};
use crate::core::constants::{CLUSTERED_SERVICE_PORT, READINESS_PROBE_TIMEOUT_SECS};
use crate::core::error::AppError;

use super::DeploymentBackend;

/// Shared by both platforms: the two source variants hard-code different names for this service
/// (`stream-api-router` in the Swarm variant, `serving-layer-router` in the plain-container one);
/// this crate keeps one name across both so `service_url`/readiness probing stays platform-agnostic.
const ROUTING_LAYER_SERVICE_NAME: &str = "stream-api-router";

/// The pure, side-effect-free half of the backend: sanitization, deterministic port hashing,
/// and URL construction. Split out so these rules can be unit-tested without a live `Docker`
/// client (§4.5 `service_url`).
struct GroupUrlResolver {
    environment: Environment,
    swarm_node_host: String,
    port_base: u16,
}

impl GroupUrlResolver {
    fn sanitize(group: &str) -> String {
        crate::grouping::sanitize_group_name(group)
    }

    fn service_name(&self, group: &str) -> String {
        format!("stream-api-group-{}", Self::sanitize(group))
    }

    /// `base_port + sha256(group)[..8] mod 1000` (SPEC_FULL.md §4.5).
    fn host_port(&self, group: &str) -> u16 {
        let digest = Sha256::digest(group.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_be_bytes(bytes);
        self.port_base + (hash % 1000) as u16
    }

    fn service_url(&self, group: &str) -> String {
        if matches!(self.environment, Environment::Local) {
            format!("http://{}:{}", self.swarm_node_host, self.host_port(group))
        } else {
            format!("http://{}:{}", self.service_name(group), CLUSTERED_SERVICE_PORT)
        }
    }
}

pub struct DockerDeploymentBackend {
    docker: Docker,
    http: reqwest::Client,
    platform: DeploymentPlatformKind,
    urls: GroupUrlResolver,
    docker_network: String,
    group_deployment: GroupDeploymentConfig,
    routing_layer_deployment: RoutingLayerDeploymentConfig,
    kafka_broker: String,
}

impl DockerDeploymentBackend {
    /// Verifies the control-plane precondition (engine reachable, swarm active, this node is a
    /// manager) before returning. Failure here is fatal at construction time (§4.5 Invariants).
    pub async fn new(
        docker: Docker,
        platform: DeploymentPlatformKind,
        environment: Environment,
        docker_network: String,
        swarm_node_host: String,
        kafka_broker: String,
        group_deployment: GroupDeploymentConfig,
        routing_layer_deployment: RoutingLayerDeploymentConfig,
    ) -> Result<Self, AppError> {
        docker
            .ping()
            .await
            .map_err(|e| AppError::PreconditionFailed(format!("docker engine unreachable: {e}")))?;

        if matches!(platform, DeploymentPlatformKind::Swarm) {
            let info = docker
                .info()
                .await
                .map_err(|e| AppError::PreconditionFailed(format!("failed to read docker info: {e}")))?;

            let swarm = info
                .swarm
                .ok_or_else(|| AppError::PreconditionFailed("docker engine has no swarm info".into()))?;
            let state = swarm.local_node_state.map(|s| format!("{s:?}")).unwrap_or_default();
            if state != "Active" {
                return Err(AppError::PreconditionFailed(format!(
                    "swarm is not active on this node (state: {state})"
                )));
            }
            if swarm.control_available != Some(true) {
                return Err(AppError::PreconditionFailed(
                    "this node is not a swarm manager".into(),
                ));
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(READINESS_PROBE_TIMEOUT_SECS))
            .build()
            .expect("failed to build readiness-probe HTTP client");

        let port_base = group_deployment.port_base;

        Ok(Self {
            docker,
            http,
            platform,
            urls: GroupUrlResolver { environment, swarm_node_host, port_base },
            docker_network,
            group_deployment,
            routing_layer_deployment,
            kafka_broker,
        })
    }

    async fn service_exists(&self, name: &str) -> Result<bool, AppError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let services = self
            .docker
            .list_services(Some(ListServicesOptions {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to list services: {e}")))?;
        Ok(!services.is_empty())
    }

    /// Mirrors `docker_deployment_platform.py`'s `containers.get(name)` existence check, which
    /// finds the container regardless of whether it's running or merely stopped.
    async fn container_exists(&self, name: &str) -> Result<bool, AppError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to list containers: {e}")))?;
        Ok(!containers.is_empty())
    }

    /// `DockerDeploymentPlatform.deploy_service`'s `containers.run(...)`: publishes
    /// `CLUSTERED_SERVICE_PORT/tcp` to `publish_port` when given, joins `docker_network`, and caps
    /// CPU with `cpu_quota`/`cpu_period` alone (the plain-container path never sets a reservation).
    async fn create_container(
        &self,
        name: &str,
        image: String,
        cpu_limit: f64,
        env: Vec<String>,
        publish_port: Option<u16>,
    ) -> Result<(), AppError> {
        let container_port = format!("{CLUSTERED_SERVICE_PORT}/tcp");
        let (exposed_ports, port_bindings) = match publish_port {
            Some(host_port) => {
                let mut exposed = HashMap::new();
                exposed.insert(container_port.clone(), HashMap::new());
                let mut bindings = HashMap::new();
                bindings.insert(
                    container_port,
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(host_port.to_string()),
                    }]),
                );
                (Some(exposed), Some(bindings))
            }
            None => (None, None),
        };

        let host_config = HostConfig {
            network_mode: Some(self.docker_network.clone()),
            port_bindings,
            cpu_quota: Some((100_000.0 * cpu_limit) as i64),
            cpu_period: Some(100_000),
            ..Default::default()
        };

        let config = Config {
            image: Some(image),
            env: Some(env),
            exposed_ports,
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions { name: name.to_string(), platform: None::<String> };
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to create container: {e}")))?;

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to start container: {e}")))?;
        Ok(())
    }

    /// `DockerDeploymentPlatform.remove_service`'s `container.stop()` + `container.remove()`,
    /// tolerant of the container already being gone.
    async fn remove_container_if_exists(&self, name: &str) -> Result<(), AppError> {
        if !self.container_exists(name).await? {
            return Ok(());
        }
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to stop container: {e}")))?;
        self.docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to remove container: {e}")))?;
        Ok(())
    }

    fn replicated_spec(
        &self,
        name: String,
        image: String,
        replicas: u32,
        cpu_limit: f64,
        cpu_reservation: f64,
        env: Vec<String>,
        publish_port: Option<u16>,
    ) -> ServiceSpec {
        let endpoint_spec = publish_port.map(|host_port| EndpointSpec {
            ports: Some(vec![EndpointPortConfig {
                target_port: Some(CLUSTERED_SERVICE_PORT as i64),
                published_port: Some(host_port as i64),
                protocol: Some(EndpointPortConfigProtocolEnum::TCP),
                publish_mode: Some(EndpointPortConfigPublishModeEnum::HOST),
                ..Default::default()
            }]),
            ..Default::default()
        });

        ServiceSpec {
            name: Some(name),
            mode: Some(ServiceSpecMode {
                replicated: Some(ServiceSpecModeReplicated { replicas: Some(replicas as i64) }),
                ..Default::default()
            }),
            networks: Some(vec![NetworkAttachmentConfig {
                target: Some(self.docker_network.clone()),
                ..Default::default()
            }]),
            task_template: Some(TaskSpec {
                container_spec: Some(TaskSpecContainerSpec {
                    image: Some(image),
                    env: Some(env),
                    ..Default::default()
                }),
                resources: Some(TaskSpecResources {
                    limits: Some(ResourceSpecs {
                        nano_cpus: Some((1_000_000_000.0 * cpu_limit) as i64),
                        ..Default::default()
                    }),
                    reservation: Some(ResourceObject {
                        nano_cpus: Some((1_000_000_000.0 * cpu_reservation) as i64),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            endpoint_spec,
            ..Default::default()
        }
    }
}

#[async_trait]
impl DeploymentBackend for DockerDeploymentBackend {
    async fn deploy_service(&self, group: &str) -> Result<(), AppError> {
        let name = self.urls.service_name(group);
        let publish_port = matches!(self.urls.environment, Environment::Local).then(|| self.urls.host_port(group));
        let env = vec![
            format!("KAFKA_BROKER={}", self.kafka_broker),
            format!("KAFKA_TOPIC=asset_stream_{group}_topic"),
            format!("KAFKA_CONSUMER_GROUP_ID=asset_stream_{group}_consumer_group"),
        ];

        if matches!(self.platform, DeploymentPlatformKind::Docker) {
            if self.container_exists(&name).await? {
                return Ok(());
            }
            tracing::info!(group, container = %name, "deploying worker container");
            return self
                .create_container(&name, self.group_deployment.image.clone(), self.group_deployment.cpu_limit, env, publish_port)
                .await;
        }

        if self.service_exists(&name).await? {
            return Ok(());
        }
        tracing::info!(group, service = %name, "deploying worker service");
        let spec = self.replicated_spec(
            name,
            self.group_deployment.image.clone(),
            self.group_deployment.replicas,
            self.group_deployment.cpu_limit,
            self.group_deployment.cpu_reservation,
            env,
            publish_port,
        );

        self.docker
            .create_service(spec, None::<CreateServiceOptions<String>>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to create service: {e}")))?;
        Ok(())
    }

    async fn remove_service(&self, group: &str) -> Result<(), AppError> {
        let name = self.urls.service_name(group);

        if matches!(self.platform, DeploymentPlatformKind::Docker) {
            tracing::info!(group, container = %name, "removing worker container");
            return self.remove_container_if_exists(&name).await;
        }

        if !self.service_exists(&name).await? {
            return Ok(());
        }
        tracing::info!(group, service = %name, "removing worker service");
        self.docker
            .remove_service(&name, None::<RemoveServiceOptions>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to remove service: {e}")))?;
        Ok(())
    }

    async fn deploy_routing_layer_api(&self) -> Result<(), AppError> {
        if matches!(self.urls.environment, Environment::Local) {
            return Ok(());
        }

        if matches!(self.platform, DeploymentPlatformKind::Docker) {
            if self.container_exists(ROUTING_LAYER_SERVICE_NAME).await? {
                return Ok(());
            }
            tracing::info!("deploying router frontend container");
            return self
                .create_container(
                    ROUTING_LAYER_SERVICE_NAME,
                    self.routing_layer_deployment.image.clone(),
                    self.routing_layer_deployment.cpu_limit,
                    vec![format!("KAFKA_BROKER={}", self.kafka_broker)],
                    None,
                )
                .await;
        }

        if self.service_exists(ROUTING_LAYER_SERVICE_NAME).await? {
            return Ok(());
        }
        tracing::info!("deploying router frontend service");
        let spec = self.replicated_spec(
            ROUTING_LAYER_SERVICE_NAME.to_string(),
            self.routing_layer_deployment.image.clone(),
            self.routing_layer_deployment.replicas,
            self.routing_layer_deployment.cpu_limit,
            self.routing_layer_deployment.cpu_reservation,
            vec![format!("KAFKA_BROKER={}", self.kafka_broker)],
            None,
        );
        self.docker
            .create_service(spec, None::<CreateServiceOptions<String>>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to create router service: {e}")))?;
        Ok(())
    }

    async fn remove_routing_layer_api(&self) -> Result<(), AppError> {
        if matches!(self.urls.environment, Environment::Local) {
            return Ok(());
        }

        if matches!(self.platform, DeploymentPlatformKind::Docker) {
            tracing::info!("removing router frontend container");
            return self.remove_container_if_exists(ROUTING_LAYER_SERVICE_NAME).await;
        }

        if !self.service_exists(ROUTING_LAYER_SERVICE_NAME).await? {
            return Ok(());
        }
        tracing::info!("removing router frontend service");
        self.docker
            .remove_service(ROUTING_LAYER_SERVICE_NAME, None::<RemoveServiceOptions>)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to remove router service: {e}")))?;
        Ok(())
    }

    fn service_url(&self, group: &str) -> String {
        self.urls.service_url(group)
    }

    async fn check_service_ready(&self, group: &str) -> (bool, String) {
        let url = format!("{}/ready", self.urls.service_url(group));
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                (false, "service does not expose a /ready endpoint (404)".to_string())
            }
            Ok(resp) if !resp.status().is_success() => {
                (false, format!("received status code {}", resp.status()))
            }
            Ok(resp) => match resp.json::<serde_json::Value>().await {
                Ok(body) => {
                    let ready = body.get("status").and_then(|s| s.as_str()) == Some("ready");
                    if ready {
                        (true, "service is ready".to_string())
                    } else {
                        let issues = body
                            .get("issues")
                            .and_then(|v| v.as_object())
                            .map(|m| {
                                m.iter()
                                    .map(|(k, v)| format!("{k}: {v}"))
                                    .collect::<Vec<_>>()
                                    .join("; ")
                            })
                            .unwrap_or_default();
                        let issues = if issues.is_empty() { "unknown issues".to_string() } else { issues };
                        (false, format!("readiness check failed: {issues}"))
                    }
                }
                Err(e) => (false, format!("malformed readiness body: {e}")),
            },
            Err(e) => (false, format!("service is not reachable: {e}")),
        }
    }

    async fn is_ready(&self) -> (bool, String) {
        if self.docker.ping().await.is_err() {
            return (false, "docker engine unreachable".to_string());
        }
        if matches!(self.platform, DeploymentPlatformKind::Swarm) {
            match self.docker.info().await {
                Ok(info) => {
                    let state = info.swarm.and_then(|s| s.local_node_state).map(|s| format!("{s:?}"));
                    if state.as_deref() != Some("Active") {
                        return (false, "swarm is no longer active".to_string());
                    }
                }
                Err(e) => return (false, format!("swarm interaction failed: {e}")),
            }
        }
        (true, "ok".to_string())
    }
}
