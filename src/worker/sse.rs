//! `GET /asset_stream` on a worker process (§4.3 SSE Endpoint).
//!
//! Grounded almost verbatim on the teacher's `api/routes/otel/sse.rs`: the `async_stream::stream!`
//! loop racing `tokio::select!{biased; shutdown, queue}`, `Sse::new(stream).keep_alive(...)`, and
//! a `matches_filter` query predicate. The one structural addition is detach-on-drop, since this
//! queue lives in an explicit registry rather than a broadcast topic the runtime owns.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;

use crate::core::error::AppError;
use crate::registry::{MatchMode, QueueHandle, SubscriptionRegistry};

use super::WorkerState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub asset_uuid: Option<String>,
    pub id: Option<String>,
}

/// Detaches the subscriber queue from the registry under every exit path — early return, panic
/// unwind, or normal stream completion (§4.3 point 4).
struct SubscriptionGuard {
    registry: std::sync::Arc<SubscriptionRegistry>,
    key: String,
    id: uuid::Uuid,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.detach(&self.key, self.id);
    }
}

fn registration_key(match_mode: MatchMode, asset_uuid: &str, data_item_id: Option<&str>) -> String {
    match match_mode {
        MatchMode::Exact => asset_uuid.to_string(),
        MatchMode::Prefix => match data_item_id {
            Some(id) => format!("{asset_uuid}|{id}"),
            None => format!("{asset_uuid}|"),
        },
    }
}

/// `data_item_id` filtering is a subscriber-side concern (§3 SubscriptionFilter): decode just
/// enough of the payload to read its `id` field.
fn payload_matches_filter(payload: &[u8], data_item_id: Option<&str>) -> bool {
    let Some(wanted) = data_item_id else { return true };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return false;
    };
    value.get("id").and_then(|v| v.as_str()) == Some(wanted)
}

/// Streams `asset_update` SSE events for one asset (§4.3, §6).
#[utoipa::path(
    get,
    path = "/asset_stream",
    tag = "assets",
    params(("asset_uuid" = String, Query, description = "asset identifier"), ("id" = Option<String>, Query, description = "data item id filter")),
    responses((status = 200, description = "text/event-stream of asset_update events"), (status = 404, description = "asset_uuid missing"))
)]
pub async fn asset_stream(
    State(state): State<WorkerState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let asset_uuid = query
        .asset_uuid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("asset_uuid is required".to_string()))?;

    let key = registration_key(state.match_mode, &asset_uuid, query.id.as_deref());
    let (handle, mut receiver): (QueueHandle, _) = crate::registry::new_subscriber(state.queue_capacity);
    let guard = SubscriptionGuard {
        registry: state.registry.clone(),
        key: key.clone(),
        id: handle.id(),
    };
    state.registry.attach(&key, handle);

    let data_item_id = query.id;
    let mut shutdown_rx = state.shutdown.clone();

    let stream = async_stream::stream! {
        let _guard = guard;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                message = receiver.recv() => {
                    match message {
                        Some(payload) => {
                            if !payload_matches_filter(&payload, data_item_id.as_deref()) {
                                continue;
                            }
                            let data = String::from_utf8_lossy(&payload).into_owned();
                            yield Ok(Event::default().event("asset_update").data(data));
                        }
                        None => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_mode_key_is_bare_asset_uuid() {
        assert_eq!(registration_key(MatchMode::Exact, "A1", Some("temp")), "A1");
    }

    #[test]
    fn prefix_mode_key_includes_data_item_when_present() {
        assert_eq!(registration_key(MatchMode::Prefix, "A1", Some("temp")), "A1|temp");
        assert_eq!(registration_key(MatchMode::Prefix, "A1", None), "A1|");
    }

    #[test]
    fn filter_passes_when_no_data_item_id_requested() {
        assert!(payload_matches_filter(br#"{"id":"temp"}"#, None));
    }

    #[test]
    fn filter_rejects_mismatched_id() {
        assert!(!payload_matches_filter(br#"{"id":"avail"}"#, Some("temp")));
        assert!(payload_matches_filter(br#"{"id":"temp"}"#, Some("temp")));
    }

    #[test]
    fn filter_rejects_unparsable_payload_when_filter_set() {
        assert!(!payload_matches_filter(b"not json", Some("temp")));
    }
}
