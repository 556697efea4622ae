//! Application entry point: parses the CLI, loads configuration, and dispatches to the
//! requested subcommand for this process's role.
//!
//! Grounded on the teacher's `core/app.rs` `CoreApp::run`/`init`/`start_server` split, reduced to
//! this crate's much smaller surface: no background-task registry beyond the dispatcher thread
//! and the signal-handler task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bollard::Docker;
use tokio::net::TcpListener;

use crate::bus::RdkafkaConsumer;
use crate::controller::RoutingController;
use crate::core::cli::{self, Commands};
use crate::core::config::{AppConfig, RoutingMode};
use crate::core::constants::DEFAULT_QUEUE_CAPACITY;
use crate::core::logging;
use crate::core::shutdown::ShutdownService;
use crate::deploy::DockerDeploymentBackend;
use crate::dispatcher::StreamDispatcher;
use crate::grouping::WorkcenterGroupingStrategy;
use crate::registry::{MatchMode, SubscriptionRegistry};
use crate::snapshot::SnapshotAdapter;

pub struct CoreApp;

impl CoreApp {
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let cli = cli::parse();
        logging::init(&cli.config.log_level);
        tracing::debug!(command = ?cli.command, "parsed command");

        let config = AppConfig::load(&cli.config).context("invalid configuration")?;

        match cli.command {
            Commands::Deploy => Self::deploy(&config).await,
            Commands::Teardown => Self::teardown(&config).await,
            Commands::Runserver => Self::runserver(config).await,
        }
    }

    async fn build_controller(config: &AppConfig) -> Result<RoutingController> {
        let grouping = Arc::new(WorkcenterGroupingStrategy::new(
            config.ksql.url.clone(),
            config.ksql.assets_stream.clone(),
            config.ksql.uns_map.clone(),
            &config.grouping_strategy.0,
        ));

        let docker = Docker::connect_with_local_defaults().context("failed to connect to docker engine")?;
        let deployment = Arc::new(
            DockerDeploymentBackend::new(
                docker,
                config.deployment_platform,
                config.environment,
                config.docker_network.clone(),
                config.swarm_node_host.clone(),
                config.bus.broker.clone(),
                config.group_deployment.clone(),
                config.routing_layer_deployment.clone(),
            )
            .await?,
        );

        Ok(RoutingController::new(grouping, deployment, config.routing_mode))
    }

    async fn deploy(config: &AppConfig) -> Result<()> {
        let controller = Self::build_controller(config).await?;
        controller.deploy().await?;
        tracing::info!("deploy complete");
        Ok(())
    }

    async fn teardown(config: &AppConfig) -> Result<()> {
        let controller = Self::build_controller(config).await?;
        controller.teardown().await?;
        tracing::info!("teardown complete");
        Ok(())
    }

    async fn runserver(config: AppConfig) -> Result<()> {
        let shutdown = ShutdownService::new();
        shutdown.install_signal_handlers();

        let router = if config.is_worker() {
            Self::build_worker_router(&config, &shutdown).await?
        } else {
            Self::build_router_frontend(&config, &shutdown).await?
        };

        let addr = SocketAddr::new(
            config.server.host.parse().context("invalid HOST value")?,
            config.server.port,
        );
        let listener = TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
        tracing::info!(%addr, "listening");

        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown.wait())
            .await
            .context("HTTP server error")?;

        shutdown.shutdown().await;
        Ok(())
    }

    async fn build_worker_router(config: &AppConfig, shutdown: &ShutdownService) -> Result<axum::Router> {
        let topic = config.bus.topic.as_deref().expect("worker role requires KAFKA_TOPIC");
        let group_id = config
            .bus
            .consumer_group_id
            .as_deref()
            .expect("worker role requires KAFKA_CONSUMER_GROUP_ID");

        let consumer = RdkafkaConsumer::new(&config.bus.broker, topic, group_id)
            .map_err(|e| anyhow::anyhow!("failed to create bus consumer: {e}"))?;

        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = StreamDispatcher::new(registry.clone(), MatchMode::Exact);
        let handle = dispatcher.spawn(Box::new(consumer), shutdown.subscribe());
        // The dispatcher owns a dedicated OS thread, not a tokio task; bridge it into the
        // shutdown registry's task list with a thin join wrapper.
        let join_task = tokio::spawn(async move {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        });
        shutdown.register(join_task).await;

        let state = crate::worker::WorkerState {
            registry,
            dispatcher,
            match_mode: MatchMode::Exact,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown: shutdown.subscribe(),
        };

        Ok(crate::worker::build_router(state))
    }

    async fn build_router_frontend(config: &AppConfig, _shutdown: &ShutdownService) -> Result<axum::Router> {
        let controller = Arc::new(Self::build_controller(config).await?);
        if matches!(config.routing_mode, RoutingMode::Eager) {
            controller.deploy().await?;
        }

        let snapshot = Arc::new(SnapshotAdapter::new(config.ksql.url.clone(), config.ksql.assets_stream.clone()));

        let state = crate::api::RouterState { controller, snapshot };
        Ok(crate::api::build_router(state))
    }
}
