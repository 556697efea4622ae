//! `WorkcenterGroupingStrategy`: groups assets by one level of the Unified Namespace (UNS),
//! resolved against ksqlDB over HTTP.
//!
//! Grounded on `original_source/routing_layer/app/core/controller/grouping_strategy.py`'s
//! `UNSLevelGroupingStrategy`: the escaping rule, the `CREATE STREAM IF NOT EXISTS ... WITH
//! (KAFKA_TOPIC=...)` statement shape, and the `DROP STREAM ... DELETE TOPIC` teardown statement
//! are carried over unchanged, re-expressed against `reqwest` instead of the Python ksql client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::core::constants::READINESS_PROBE_TIMEOUT_SECS;
use crate::core::error::AppError;

use super::{GroupingStrategy, escape_ksql_literal};

pub struct WorkcenterGroupingStrategy {
    client: reqwest::Client,
    ksqldb_url: String,
    assets_stream: String,
    uns_map: String,
    /// Escaped once at construction (SPEC_FULL.md §4.4); the raw UNS level name, e.g.
    /// `"workcenter"`.
    grouping_level: String,
}

impl WorkcenterGroupingStrategy {
    pub fn new(ksqldb_url: String, assets_stream: String, uns_map: String, grouping_level: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(READINESS_PROBE_TIMEOUT_SECS))
            .build()
            .expect("failed to build ksqlDB HTTP client");

        Self {
            client,
            ksqldb_url,
            assets_stream,
            uns_map,
            grouping_level: escape_ksql_literal(grouping_level),
        }
    }

    fn stream_name(&self, group: &str) -> String {
        format!("asset_stream_{group}")
    }

    async fn statement(&self, statement: &str) -> Result<(), AppError> {
        let url = format!("{}/ksql", self.ksqldb_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "ksql": statement, "streamsProperties": {} }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("ksqlDB statement failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "ksqlDB statement returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Runs a pull query against the `/query` endpoint and returns the rows' `VARCHAR` column
    /// values, flattened and deduplicated.
    async fn pull_query_column(&self, ksql: &str) -> Result<Vec<String>, AppError> {
        let url = format!("{}/query", self.ksqldb_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "ksql": ksql, "streamsProperties": {} }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("ksqlDB query failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "ksqlDB query returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to read ksqlDB response: {e}")))?;

        Ok(parse_query_rows(&body))
    }
}

/// ksqlDB's `/query` endpoint streams one JSON object per line: a header row followed by one
/// `{"row": {"columns": [...]}}` per result row. This extracts the first column of every row,
/// which is all `get_all_groups`/`get_group_for_asset` ever project.
fn parse_query_rows(body: &str) -> Vec<String> {
    #[derive(Deserialize)]
    struct Row {
        columns: Vec<serde_json::Value>,
    }

    #[derive(Deserialize)]
    struct Line {
        row: Option<Row>,
    }

    let mut seen = std::collections::HashSet::new();
    let mut values = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim().trim_end_matches(',');
        if trimmed.is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<Line>(trimmed) else {
            continue;
        };
        let Some(row) = parsed.row else { continue };
        let Some(first) = row.columns.first() else {
            continue;
        };
        if let Some(s) = first.as_str() {
            if seen.insert(s.to_string()) {
                values.push(s.to_string());
            }
        }
    }
    values
}

#[async_trait]
impl GroupingStrategy for WorkcenterGroupingStrategy {
    async fn group_for_asset(&self, asset_uuid: &str) -> Result<Option<String>, AppError> {
        let escaped_uuid = escape_ksql_literal(asset_uuid);
        let ksql = format!(
            "SELECT uns_levels['{level}'] FROM {map} WHERE asset_uuid = '{asset}';",
            level = self.grouping_level,
            map = self.uns_map,
            asset = escaped_uuid,
        );
        let rows = self.pull_query_column(&ksql).await?;
        Ok(rows.into_iter().next())
    }

    async fn all_groups(&self) -> Result<Vec<String>, AppError> {
        let ksql = format!(
            "SELECT uns_levels['{level}'] AS groups FROM {map};",
            level = self.grouping_level,
            map = self.uns_map,
        );
        self.pull_query_column(&ksql).await
    }

    async fn create_derived_stream(&self, group: &str) -> Result<(), AppError> {
        let escaped_group = escape_ksql_literal(group);
        let stream_name = self.stream_name(group);
        let statement = format!(
            "CREATE STREAM IF NOT EXISTS {stream_name} \
             WITH (KAFKA_TOPIC='{stream_name}_topic', VALUE_FORMAT='JSON') AS \
             SELECT s.* FROM {assets} s JOIN {map} h ON s.asset_uuid = h.asset_uuid \
             WHERE h.uns_levels['{level}'] = '{group}';",
            stream_name = stream_name,
            assets = self.assets_stream,
            map = self.uns_map,
            level = self.grouping_level,
            group = escaped_group,
        );
        self.statement(&statement).await
    }

    async fn remove_derived_stream(&self, group: &str) -> Result<(), AppError> {
        let statement = format!("DROP STREAM IF EXISTS {} DELETE TOPIC;", self.stream_name(group));
        self.statement(&statement).await
    }

    async fn is_ready(&self) -> (bool, String) {
        let url = format!("{}/info", self.ksqldb_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => (true, "ok".to_string()),
            Ok(resp) => (false, format!("ksqlDB /info returned {}", resp.status())),
            Err(e) => (false, format!("ksqlDB unreachable: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_row_lines_deduplicated() {
        let body = "{\"header\":{\"queryId\":\"x\",\"schema\":\"`GROUPS` STRING\"}}\n\
                    {\"row\":{\"columns\":[\"wc1\"]}}\n\
                    {\"row\":{\"columns\":[\"wc2\"]}}\n\
                    {\"row\":{\"columns\":[\"wc1\"]}}\n";
        assert_eq!(parse_query_rows(body), vec!["wc1".to_string(), "wc2".to_string()]);
    }

    #[test]
    fn ignores_rows_with_null_first_column() {
        let body = "{\"row\":{\"columns\":[null]}}\n{\"row\":{\"columns\":[\"wc1\"]}}\n";
        assert_eq!(parse_query_rows(body), vec!["wc1".to_string()]);
    }

    #[test]
    fn empty_body_yields_no_rows() {
        assert!(parse_query_rows("").is_empty());
    }
}
