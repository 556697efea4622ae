//! Grouping Strategy (§4.4): maps an asset identifier to its group, enumerates all active
//! groups, and manages the per-group derived stream.

pub mod workcenter;

use async_trait::async_trait;

use crate::core::error::AppError;

pub use workcenter::WorkcenterGroupingStrategy;

/// Capability set a grouping strategy must provide. One implementation ships in the core
/// (`WorkcenterGroupingStrategy`); the trait is the only variation point (SPEC_FULL.md §9).
#[async_trait]
pub trait GroupingStrategy: Send + Sync {
    /// The group the asset belongs to, or `None` if it is unrouted.
    async fn group_for_asset(&self, asset_uuid: &str) -> Result<Option<String>, AppError>;

    /// All currently known group names.
    async fn all_groups(&self) -> Result<Vec<String>, AppError>;

    /// Idempotently declare the derived stream for `group`.
    async fn create_derived_stream(&self, group: &str) -> Result<(), AppError>;

    /// Remove the derived stream for `group`.
    async fn remove_derived_stream(&self, group: &str) -> Result<(), AppError>;

    /// Self-reported readiness of the strategy's upstream dependency (the projection).
    async fn is_ready(&self) -> (bool, String);
}

/// Escape single quotes for safe inclusion in a ksqlDB string literal (SPEC_FULL.md §4.4).
///
/// Grounded on `original_source/routing_layer/app/core/controller/grouping_strategy.py`'s
/// `escape_ksql_literal`.
pub fn escape_ksql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Lower-case, collapse non-alphanumeric runs to a single `-`, strip leading/trailing `-`
/// (SPEC_FULL.md §4.4, tested by property 6 "Group sanitization round-trip").
pub fn sanitize_group_name(group: &str) -> String {
    let lower = group.to_ascii_lowercase();
    let mut sanitized = String::with_capacity(lower.len());
    let mut last_was_dash = false;
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            sanitized.push('-');
            last_was_dash = true;
        }
    }
    sanitized.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_doubles_single_quotes() {
        assert_eq!(escape_ksql_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_ksql_literal("plain"), "plain");
    }

    #[test]
    fn sanitize_collapses_runs_and_trims() {
        assert_eq!(sanitize_group_name("Work Center #1!!"), "work-center-1");
        assert_eq!(sanitize_group_name("--Area/2--"), "area-2");
    }

    #[test]
    fn sanitize_round_trip_equal_for_equivalent_names() {
        assert_eq!(
            sanitize_group_name("Work Center 1"),
            sanitize_group_name("work--center--1")
        );
    }

    #[test]
    fn sanitize_only_emits_lowercase_alnum_and_dash() {
        let sanitized = sanitize_group_name("WC_1/Area ß");
        assert!(sanitized.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!sanitized.starts_with('-') && !sanitized.ends_with('-'));
    }
}
