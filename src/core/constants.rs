//! Well-known defaults and environment variable names.

pub const ENV_KAFKA_BROKER: &str = "KAFKA_BROKER";
pub const ENV_KAFKA_TOPIC: &str = "KAFKA_TOPIC";
pub const ENV_KAFKA_CONSUMER_GROUP_ID: &str = "KAFKA_CONSUMER_GROUP_ID";
pub const ENV_KSQLDB_URL: &str = "KSQLDB_URL";
pub const ENV_KSQLDB_ASSETS_STREAM: &str = "KSQLDB_ASSETS_STREAM";
pub const ENV_KSQLDB_UNS_MAP: &str = "KSQLDB_UNS_MAP";
pub const ENV_DOCKER_NETWORK: &str = "DOCKER_NETWORK";
pub const ENV_FASTAPI_GROUP_IMAGE: &str = "FASTAPI_GROUP_IMAGE";
pub const ENV_FASTAPI_GROUP_REPLICAS: &str = "FASTAPI_GROUP_REPLICAS";
pub const ENV_FASTAPI_GROUP_CPU_LIMIT: &str = "FASTAPI_GROUP_CPU_LIMIT";
pub const ENV_FASTAPI_GROUP_CPU_RESERVATION: &str = "FASTAPI_GROUP_CPU_RESERVATION";
pub const ENV_FASTAPI_GROUP_PORT_BASE: &str = "FASTAPI_GROUP_PORT_BASE";
pub const ENV_ROUTING_LAYER_IMAGE: &str = "ROUTING_LAYER_IMAGE";
pub const ENV_ROUTING_LAYER_REPLICAS: &str = "ROUTING_LAYER_REPLICAS";
pub const ENV_ROUTING_LAYER_CPU_LIMIT: &str = "ROUTING_LAYER_CPU_LIMIT";
pub const ENV_ROUTING_LAYER_CPU_RESERVATION: &str = "ROUTING_LAYER_CPU_RESERVATION";
pub const ENV_GROUPING_STRATEGY: &str = "GROUPING_STRATEGY";
pub const ENV_DEPLOYMENT_PLATFORM: &str = "DEPLOYMENT_PLATFORM";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
pub const ENV_SWARM_NODE_HOST: &str = "SWARM_NODE_HOST";
pub const ENV_ROUTING_MODE: &str = "ROUTING_MODE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";

/// Default capacity of a single subscriber queue (§3 SubscriberQueue).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default bounded wait per bus poll (§4.2 Delivery loop).
pub const DISPATCH_POLL_TIMEOUT_MS: u64 = 1_000;
/// Default back-pressure timeout before a per-subscriber drop (§4.2 Back-pressure).
pub const DISPATCH_ENQUEUE_TIMEOUT_MS: u64 = 2_000;
/// Default deadline to obtain partition assignment at dispatcher startup (§4.2 Startup).
pub const DISPATCH_ASSIGNMENT_TIMEOUT_MS: u64 = 100_000;
/// Readiness probe HTTP timeout (§5 Cancellation and timeouts).
pub const READINESS_PROBE_TIMEOUT_SECS: u64 = 2;
/// Upper bound while waiting for background tasks during shutdown.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
/// Fixed internal port a worker/router service listens on in clustered mode.
pub const CLUSTERED_SERVICE_PORT: u16 = 5555;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_FASTAPI_GROUP_REPLICAS: u32 = 1;
pub const DEFAULT_FASTAPI_GROUP_CPU_LIMIT: f64 = 1.0;
pub const DEFAULT_FASTAPI_GROUP_CPU_RESERVATION: f64 = 0.25;
pub const DEFAULT_FASTAPI_GROUP_PORT_BASE: u16 = 20_000;
pub const DEFAULT_ROUTING_LAYER_REPLICAS: u32 = 1;
pub const DEFAULT_ROUTING_LAYER_CPU_LIMIT: f64 = 1.0;
pub const DEFAULT_ROUTING_LAYER_CPU_RESERVATION: f64 = 0.25;
