//! Structured logging, initialized once at binary entry.

use tracing_subscriber::EnvFilter;

/// Map the spec's `LOG_LEVEL` vocabulary onto a `tracing` directive. Unknown values fall back
/// to `info` rather than failing startup over a logging preference.
fn directive_for(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warning" | "warn" => "warn",
        "error" => "error",
        "critical" => "error",
        _ => "info",
    }
}

pub fn init(log_level: &str) {
    let directive = directive_for(log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{directive},streamfan={directive}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(directive_for("trace-everything"), "info");
    }

    #[test]
    fn known_levels_map() {
        assert_eq!(directive_for("warning"), "warn");
        assert_eq!(directive_for("CRITICAL"), "error");
    }
}
