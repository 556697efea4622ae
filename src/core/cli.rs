//! Command-line surface: `deploy`, `teardown`, `runserver`.

use clap::{Parser, Subcommand};

use super::constants::*;

#[derive(Parser, Debug)]
#[command(name = "streamfan", about = "Asset-stream fan-out and routing layer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub config: CliConfig,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Declare group-scoped topics and deploy one worker service per group.
    Deploy,
    /// Remove all group-scoped topics, worker services, and the router frontend.
    Teardown,
    /// Start the HTTP server for this process's role (worker or router frontend).
    Runserver,
}

/// All configuration read from the environment / CLI flags (§6 Configuration surface).
#[derive(Parser, Debug, Clone)]
pub struct CliConfig {
    #[arg(long, env = ENV_KAFKA_BROKER, default_value = "localhost:9092")]
    pub kafka_broker: String,

    #[arg(long, env = ENV_KAFKA_TOPIC)]
    pub kafka_topic: Option<String>,

    #[arg(long, env = ENV_KAFKA_CONSUMER_GROUP_ID)]
    pub kafka_consumer_group_id: Option<String>,

    #[arg(long, env = ENV_KSQLDB_URL, default_value = "http://localhost:8088")]
    pub ksqldb_url: String,

    #[arg(long, env = ENV_KSQLDB_ASSETS_STREAM, default_value = "enriched_assets_stream")]
    pub ksqldb_assets_stream: String,

    #[arg(long, env = ENV_KSQLDB_UNS_MAP, default_value = "asset_to_uns_map")]
    pub ksqldb_uns_map: String,

    #[arg(long, env = ENV_DOCKER_NETWORK, default_value = "openfactory-network")]
    pub docker_network: String,

    #[arg(long, env = ENV_FASTAPI_GROUP_IMAGE, default_value = "openfactory/stream-api:latest")]
    pub fastapi_group_image: String,

    #[arg(long, env = ENV_FASTAPI_GROUP_REPLICAS, default_value_t = DEFAULT_FASTAPI_GROUP_REPLICAS)]
    pub fastapi_group_replicas: u32,

    #[arg(long, env = ENV_FASTAPI_GROUP_CPU_LIMIT, default_value_t = DEFAULT_FASTAPI_GROUP_CPU_LIMIT)]
    pub fastapi_group_cpu_limit: f64,

    #[arg(long, env = ENV_FASTAPI_GROUP_CPU_RESERVATION, default_value_t = DEFAULT_FASTAPI_GROUP_CPU_RESERVATION)]
    pub fastapi_group_cpu_reservation: f64,

    #[arg(long, env = ENV_FASTAPI_GROUP_PORT_BASE, default_value_t = DEFAULT_FASTAPI_GROUP_PORT_BASE)]
    pub fastapi_group_port_base: u16,

    #[arg(long, env = ENV_ROUTING_LAYER_IMAGE, default_value = "openfactory/routing-layer:latest")]
    pub routing_layer_image: String,

    #[arg(long, env = ENV_ROUTING_LAYER_REPLICAS, default_value_t = DEFAULT_ROUTING_LAYER_REPLICAS)]
    pub routing_layer_replicas: u32,

    #[arg(long, env = ENV_ROUTING_LAYER_CPU_LIMIT, default_value_t = DEFAULT_ROUTING_LAYER_CPU_LIMIT)]
    pub routing_layer_cpu_limit: f64,

    #[arg(long, env = ENV_ROUTING_LAYER_CPU_RESERVATION, default_value_t = DEFAULT_ROUTING_LAYER_CPU_RESERVATION)]
    pub routing_layer_cpu_reservation: f64,

    #[arg(long, env = ENV_GROUPING_STRATEGY, default_value = "workcenter")]
    pub grouping_strategy: String,

    #[arg(long, env = ENV_DEPLOYMENT_PLATFORM, default_value = "swarm")]
    pub deployment_platform: String,

    #[arg(long, env = ENV_ENVIRONMENT, default_value = "local")]
    pub environment: String,

    #[arg(long, env = ENV_SWARM_NODE_HOST, default_value = "localhost")]
    pub swarm_node_host: String,

    #[arg(long, env = ENV_ROUTING_MODE, default_value = "eager")]
    pub routing_mode: String,

    #[arg(long, env = ENV_LOG_LEVEL, default_value = "info")]
    pub log_level: String,

    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = ENV_PORT, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Parse the CLI. Returns the subcommand and the raw config to be validated by
/// [`super::config::AppConfig::load`].
pub fn parse() -> Cli {
    Cli::parse()
}
