//! Validated runtime configuration, built by layering defaults, environment
//! variables and CLI flags through [`CliConfig`] (see `core/cli.rs`).

use anyhow::{Context, Result, bail};

use super::cli::CliConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Devswarm,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "devswarm" => Ok(Self::Devswarm),
            "production" => Ok(Self::Production),
            other => bail!("ENVIRONMENT must be one of local|devswarm|production, got '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPlatformKind {
    Swarm,
    Docker,
}

impl DeploymentPlatformKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "swarm" => Ok(Self::Swarm),
            "docker" => Ok(Self::Docker),
            other => bail!("DEPLOYMENT_PLATFORM must be one of swarm|docker, got '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Eager,
    Lazy,
}

impl RoutingMode {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => bail!("ROUTING_MODE must be one of eager|lazy, got '{other}'"),
        }
    }
}

/// `GROUPING_STRATEGY=workcenter | future levels` (§6). Only `workcenter` ships today; the
/// string is kept verbatim so new levels can be added without touching the CLI surface.
#[derive(Debug, Clone)]
pub struct GroupingStrategyKind(pub String);

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub broker: String,
    /// `Some` only on worker processes; presence selects the worker role (SPEC_FULL.md §2).
    pub topic: Option<String>,
    pub consumer_group_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KsqlConfig {
    pub url: String,
    pub assets_stream: String,
    pub uns_map: String,
}

#[derive(Debug, Clone)]
pub struct GroupDeploymentConfig {
    pub image: String,
    pub replicas: u32,
    pub cpu_limit: f64,
    pub cpu_reservation: f64,
    pub port_base: u16,
}

#[derive(Debug, Clone)]
pub struct RoutingLayerDeploymentConfig {
    pub image: String,
    pub replicas: u32,
    pub cpu_limit: f64,
    pub cpu_reservation: f64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub ksql: KsqlConfig,
    pub docker_network: String,
    pub group_deployment: GroupDeploymentConfig,
    pub routing_layer_deployment: RoutingLayerDeploymentConfig,
    pub grouping_strategy: GroupingStrategyKind,
    pub deployment_platform: DeploymentPlatformKind,
    pub environment: Environment,
    pub swarm_node_host: String,
    pub routing_mode: RoutingMode,
    pub log_level: String,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Validate and assemble the final configuration from the parsed CLI/env layer.
    ///
    /// Mirrors the teacher's `AppConfig::load(cli) -> Result<Self>`: construct the nested
    /// sections, then reject invalid cross-field combinations before anything is constructed.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let environment =
            Environment::parse(&cli.environment).context("invalid ENVIRONMENT value")?;
        let deployment_platform = DeploymentPlatformKind::parse(&cli.deployment_platform)
            .context("invalid DEPLOYMENT_PLATFORM value")?;
        let routing_mode =
            RoutingMode::parse(&cli.routing_mode).context("invalid ROUTING_MODE value")?;

        if cli.fastapi_group_replicas == 0 {
            bail!("FASTAPI_GROUP_REPLICAS must be >= 1");
        }
        if cli.routing_layer_replicas == 0 {
            bail!("ROUTING_LAYER_REPLICAS must be >= 1");
        }
        if cli.kafka_broker.trim().is_empty() {
            bail!("KAFKA_BROKER must not be empty");
        }
        if cli.kafka_topic.is_some() != cli.kafka_consumer_group_id.is_some() {
            bail!(
                "KAFKA_TOPIC and KAFKA_CONSUMER_GROUP_ID must be set together (worker role) or both absent (router role)"
            );
        }

        Ok(Self {
            bus: BusConfig {
                broker: cli.kafka_broker.clone(),
                topic: cli.kafka_topic.clone(),
                consumer_group_id: cli.kafka_consumer_group_id.clone(),
            },
            ksql: KsqlConfig {
                url: cli.ksqldb_url.clone(),
                assets_stream: cli.ksqldb_assets_stream.clone(),
                uns_map: cli.ksqldb_uns_map.clone(),
            },
            docker_network: cli.docker_network.clone(),
            group_deployment: GroupDeploymentConfig {
                image: cli.fastapi_group_image.clone(),
                replicas: cli.fastapi_group_replicas,
                cpu_limit: cli.fastapi_group_cpu_limit,
                cpu_reservation: cli.fastapi_group_cpu_reservation,
                port_base: cli.fastapi_group_port_base,
            },
            routing_layer_deployment: RoutingLayerDeploymentConfig {
                image: cli.routing_layer_image.clone(),
                replicas: cli.routing_layer_replicas,
                cpu_limit: cli.routing_layer_cpu_limit,
                cpu_reservation: cli.routing_layer_cpu_reservation,
            },
            grouping_strategy: GroupingStrategyKind(cli.grouping_strategy.clone()),
            deployment_platform,
            environment,
            swarm_node_host: cli.swarm_node_host.clone(),
            routing_mode,
            log_level: cli.log_level.clone(),
            server: ServerConfig {
                host: cli.host.clone(),
                port: cli.port,
            },
        })
    }

    /// True when this process was launched with a group-scoped topic, i.e. it should run the
    /// worker role (Stream Dispatcher + SSE Endpoint) rather than the Router Frontend.
    pub fn is_worker(&self) -> bool {
        self.bus.topic.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_from(args: &[&str]) -> CliConfig {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            config: CliConfig,
        }
        Wrapper::parse_from(std::iter::once(&"streamfan").chain(args)).config
    }

    #[test]
    fn defaults_load_successfully() {
        let cli = cli_from(&[]);
        let cfg = AppConfig::load(&cli).unwrap();
        assert_eq!(cfg.environment, Environment::Local);
        assert!(!cfg.is_worker());
    }

    #[test]
    fn worker_requires_both_kafka_fields() {
        let cli = cli_from(&["--kafka-topic", "asset_stream_wc1_topic"]);
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn worker_role_detected_when_both_present() {
        let cli = cli_from(&[
            "--kafka-topic",
            "asset_stream_wc1_topic",
            "--kafka-consumer-group-id",
            "asset_stream_wc1_consumer_group",
        ]);
        let cfg = AppConfig::load(&cli).unwrap();
        assert!(cfg.is_worker());
    }

    #[test]
    fn rejects_zero_replicas() {
        let cli = cli_from(&["--fastapi-group-replicas", "0"]);
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn rejects_unknown_environment() {
        let cli = cli_from(&["--environment", "moon"]);
        assert!(AppConfig::load(&cli).is_err());
    }
}
