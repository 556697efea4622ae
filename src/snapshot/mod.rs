//! Point-query Adapter (§4.8): synchronous snapshot lookup against ksqlDB, independent of the
//! streaming path.
//!
//! Grounded on `original_source/app/api/asset_state.py`'s `get_asset_state`: the same
//! composite-key (`asset_uuid|id`) vs. `asset_uuid`-prefix query split, and the same
//! 404/500 error mapping, reimplemented against `reqwest` instead of the Python ksql client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::error::AppError;
use crate::grouping::escape_ksql_literal;

const SNAPSHOT_QUERY_TIMEOUT_SECS: u64 = 5;
const SNAPSHOT_ROW_LIMIT: u32 = 100;

/// One row of the `assets` ksqlDB table (SPEC_FULL.md §4.8 / §3 Message payload fields).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataItemSnapshot {
    pub id: String,
    pub value: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub tag: String,
    pub timestamp: String,
}

/// Response shape for `GET /asset_state` (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AssetStateResponse {
    Single {
        asset_uuid: String,
        id: String,
        value: String,
        #[serde(rename = "type")]
        item_type: String,
        tag: String,
        timestamp: String,
    },
    Many {
        asset_uuid: String,
        #[serde(rename = "dataItems")]
        data_items: Vec<DataItemSnapshot>,
    },
}

pub struct SnapshotAdapter {
    client: reqwest::Client,
    ksqldb_url: String,
    assets_table: String,
}

impl SnapshotAdapter {
    pub fn new(ksqldb_url: String, assets_table: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SNAPSHOT_QUERY_TIMEOUT_SECS))
            .build()
            .expect("failed to build ksqlDB HTTP client");
        Self { client, ksqldb_url, assets_table }
    }

    /// `GET /asset_state?asset_uuid=...&id=...` (§4.8). `NotFound` when no row matches;
    /// `UpstreamUnavailable` when the projection itself errors.
    pub async fn snapshot(&self, asset_uuid: &str, data_item_id: Option<&str>) -> Result<AssetStateResponse, AppError> {
        match data_item_id {
            Some(id) => self.snapshot_one(asset_uuid, id).await,
            None => self.snapshot_all(asset_uuid).await,
        }
    }

    async fn snapshot_one(&self, asset_uuid: &str, id: &str) -> Result<AssetStateResponse, AppError> {
        let composite_key = format!("{asset_uuid}|{id}");
        let ksql = format!(
            "SELECT asset_uuid, id, value, type, tag, timestamp FROM {} WHERE key = '{}' LIMIT 1;",
            self.assets_table,
            escape_ksql_literal(&composite_key),
        );
        let rows = self.query_rows(&ksql).await?;
        rows.into_iter()
            .next()
            .map(|row| AssetStateResponse::Single {
                asset_uuid: row.asset_uuid,
                id: row.id,
                value: row.value,
                item_type: row.item_type,
                tag: row.tag,
                timestamp: row.timestamp,
            })
            .ok_or_else(|| AppError::NotFound(format!("no data found for asset_uuid={asset_uuid} id={id}")))
    }

    async fn snapshot_all(&self, asset_uuid: &str) -> Result<AssetStateResponse, AppError> {
        let ksql = format!(
            "SELECT asset_uuid, id, value, type, tag, timestamp FROM {} WHERE asset_uuid = '{}' LIMIT {};",
            self.assets_table,
            escape_ksql_literal(asset_uuid),
            SNAPSHOT_ROW_LIMIT,
        );
        let rows = self.query_rows(&ksql).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("no data found for asset_uuid={asset_uuid}")));
        }
        Ok(AssetStateResponse::Many {
            asset_uuid: asset_uuid.to_string(),
            data_items: rows
                .into_iter()
                .map(|row| DataItemSnapshot {
                    id: row.id,
                    value: row.value,
                    item_type: row.item_type,
                    tag: row.tag,
                    timestamp: row.timestamp,
                })
                .collect(),
        })
    }

    async fn query_rows(&self, ksql: &str) -> Result<Vec<AssetRow>, AppError> {
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

        Ok(parse_asset_rows(&body))
    }
}

#[derive(Debug, Clone)]
struct AssetRow {
    asset_uuid: String,
    id: String,
    value: String,
    item_type: String,
    tag: String,
    timestamp: String,
}

/// Mirrors `grouping::workcenter::parse_query_rows` but projects all six `assets` columns in
/// the fixed order the `SELECT` above always uses.
fn parse_asset_rows(body: &str) -> Vec<AssetRow> {
    #[derive(Deserialize)]
    struct Row {
        columns: Vec<serde_json::Value>,
    }

    #[derive(Deserialize)]
    struct Line {
        row: Option<Row>,
    }

    let mut rows = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim().trim_end_matches(',');
        if trimmed.is_empty() {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<Line>(trimmed) else {
            continue;
        };
        let Some(row) = parsed.row else { continue };
        if row.columns.len() < 6 {
            continue;
        }
        let as_str = |i: usize| row.columns[i].as_str().unwrap_or_default().to_string();
        rows.push(AssetRow {
            asset_uuid: as_str(0),
            id: as_str(1),
            value: as_str(2),
            item_type: as_str(3),
            tag: as_str(4),
            timestamp: as_str(5),
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_line(asset_uuid: &str, id: &str, value: &str) -> String {
        format!(
            "{{\"row\":{{\"columns\":[\"{asset_uuid}\",\"{id}\",\"{value}\",\"Events\",\"tag\",\"2025-07-10T19:31:50.117382Z\"]}}}}\n"
        )
    }

    #[test]
    fn parses_rows_in_fixed_column_order() {
        let body = row_line("WTVB01-001", "avail", "AVAILABLE");
        let rows = parse_asset_rows(&body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].asset_uuid, "WTVB01-001");
        assert_eq!(rows[0].id, "avail");
        assert_eq!(rows[0].value, "AVAILABLE");
    }

    #[test]
    fn short_rows_are_skipped() {
        let body = "{\"row\":{\"columns\":[\"only-one\"]}}\n";
        assert!(parse_asset_rows(body).is_empty());
    }

    #[test]
    fn single_response_serializes_flat() {
        let response = AssetStateResponse::Single {
            asset_uuid: "WTVB01-001".to_string(),
            id: "avail".to_string(),
            value: "AVAILABLE".to_string(),
            item_type: "Events".to_string(),
            tag: "tag".to_string(),
            timestamp: "2025-07-10T19:31:50.117382Z".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["asset_uuid"], "WTVB01-001");
        assert_eq!(json["value"], "AVAILABLE");
    }
}
