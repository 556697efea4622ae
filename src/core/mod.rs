//! Core application infrastructure: configuration, CLI, logging, shutdown, errors.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod logging;
pub mod readiness;
pub mod shutdown;

pub use app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::AppConfig;
pub use error::AppError;
pub use readiness::ReadinessDocument;
pub use shutdown::ShutdownService;
