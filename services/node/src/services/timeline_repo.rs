//! Timeline repository (SPEC_FULL §4.3): the chunk cache / DB / remote
//! layering plus the pub/sub wiring used by both local posts and the
//! subscription manager.

use cache_bus::{Bus, ChunkCache};
use cdid::{chunk_to_recent_time, time_to_chunk};
use chrono::{DateTime, Utc};
use core_model::{Event, NodeResult, TimelineItem};
use federation_client::PeerClient;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;

#[derive(Clone)]
pub struct TimelineRepo {
    pool: PgPool,
    cache: ChunkCache,
    bus: Bus,
    peer: PeerClient,
}

impl TimelineRepo {
    pub fn new(pool: PgPool, cache: ChunkCache, bus: Bus, peer: PeerClient) -> Self {
        Self {
            pool,
            cache,
            bus,
            peer,
        }
    }

    /// Inserts the item row, then appends it into the cache -- a missing
    /// cache key is left alone (invariant 2: appends never create).
    pub async fn create_item(&self, item: &TimelineItem) -> NodeResult<()> {
        repo::items::create_item(&self.pool, item)
            .await
            .map_err(to_node_error)?;
        let chunk = time_to_chunk(item.created_at);
        let item_json = serde_json::to_string(item)
            .map_err(|e| core_model::NodeError::Transient(format!("encode item: {e}")))?;
        if let Err(err) = self.cache.append(&item.timeline_id, &chunk, &item_json).await {
            warn!(timeline = %item.timeline_id, %chunk, error = %err, "cache append failed");
        }
        Ok(())
    }

    /// Reads cached chunks for `timelines` at `until_chunk`. Returns a map
    /// from timeline to its parsed item list for every cache hit; timelines
    /// absent from the map are misses (including the empty-sentinel case,
    /// which is present in the map with an empty `Vec`).
    pub async fn get_chunks_from_cache(
        &self,
        timelines: &[String],
        until_chunk: &str,
    ) -> NodeResult<HashMap<String, Vec<TimelineItem>>> {
        let mut out = HashMap::new();
        for timeline in timelines {
            if let Some(raw) = self.cache.get(timeline, until_chunk).await? {
                out.insert(timeline.clone(), parse_chunk_body(&raw));
            }
        }
        Ok(out)
    }

    /// Reads the chunk from the DB for every timeline in `timelines`, then
    /// seeds the cache with the result so the next reader short-circuits.
    pub async fn get_chunks_from_db(
        &self,
        timelines: &[String],
        until_chunk: &str,
    ) -> NodeResult<HashMap<String, Vec<TimelineItem>>> {
        let recent =
            chunk_to_recent_time(until_chunk).ok_or_else(|| invalid_chunk(until_chunk))?;
        let immediate = cdid::chunk_to_immediate_time(until_chunk)
            .ok_or_else(|| invalid_chunk(until_chunk))?;
        let owned: Vec<String> = timelines.to_vec();
        let by_timeline = repo::items::get_chunk_from_db(&self.pool, &owned, immediate, recent)
            .await
            .map_err(to_node_error)?;

        for (timeline, items) in &by_timeline {
            self.cache.add_empty(timeline, until_chunk).await?;
            for item in items {
                if let Ok(item_json) = serde_json::to_string(item) {
                    let _ = self.cache.append(timeline, until_chunk, &item_json).await;
                }
            }
        }
        Ok(by_timeline)
    }

    /// Fetches the chunk from `host` for every timeline in `timelines` and
    /// writes the authoritative result back into the local cache.
    pub async fn get_chunks_from_remote(
        &self,
        host: &str,
        timelines: &[String],
        pivot: DateTime<Utc>,
    ) -> NodeResult<HashMap<String, Vec<TimelineItem>>> {
        let owned: Vec<String> = timelines.to_vec();
        let result = self.peer.get_chunks(host, &owned, pivot).await?;
        let until_chunk = time_to_chunk(pivot);
        for (timeline, items) in &result {
            self.cache.add_empty(timeline, &until_chunk).await?;
            for item in items {
                if let Ok(item_json) = serde_json::to_string(item) {
                    let _ = self.cache.append(timeline, &until_chunk, &item_json).await;
                }
            }
        }
        Ok(result)
    }

    pub async fn subscribe(&self, timelines: &[String]) -> NodeResult<impl Stream<Item = Event>> {
        let subscription = self.bus.subscribe(timelines).await?;
        Ok(subscription
            .into_payload_stream()
            .filter_map(|raw| serde_json::from_str::<Event>(&raw).ok()))
    }

    pub async fn publish_event(&self, event: &Event) -> NodeResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| core_model::NodeError::Transient(format!("encode event: {e}")))?;
        self.bus.publish(&event.timeline, &payload).await
    }

    pub async fn delete_by_resource(&self, resource_id: &str) -> NodeResult<()> {
        repo::items::delete_by_resource(&self.pool, resource_id)
            .await
            .map_err(to_node_error)
    }
}

fn invalid_chunk(chunk: &str) -> core_model::NodeError {
    core_model::NodeError::Transient(format!("invalid chunk key: {chunk}"))
}

/// Parses the comma-concatenation of JSON-encoded `TimelineItem`s back into
/// a list. An empty body is a known-empty chunk, not a parse failure.
///
/// The separator commas only ever appear between items, at JSON nesting
/// depth 0 -- a `TimelineItem`'s own encoding is full of commas between its
/// fields, so a naive `str::split(',')` would shred every item. This walks
/// the string tracking brace/bracket depth and string-quoting so it only
/// splits on the comma actually appended after each item.
fn parse_chunk_body(raw: &str) -> Vec<TimelineItem> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    let mut start = 0usize;

    for (i, c) in raw.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                if let Ok(item) = serde_json::from_str(&raw[start..i]) {
                    out.push(item);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = raw[start..].trim();
    if !tail.is_empty() {
        if let Ok(item) = serde_json::from_str(tail) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chunk_body_handles_empty_sentinel() {
        assert!(parse_chunk_body("").is_empty());
    }

    #[test]
    fn parse_chunk_body_splits_trailing_comma_entries() {
        let item = TimelineItem {
            timeline_id: "tA".to_owned(),
            resource_id: "mX".to_owned(),
            owner: "conOwner".to_owned(),
            author: None,
            created_at: Utc::now(),
        };
        let encoded = format!("{},", serde_json::to_string(&item).unwrap());
        let parsed = parse_chunk_body(&encoded);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].resource_id, "mX");
    }

    #[test]
    fn parse_chunk_body_handles_multiple_items_without_shredding_their_internal_commas() {
        let a = TimelineItem {
            timeline_id: "tA".to_owned(),
            resource_id: "mA".to_owned(),
            owner: "conOwner".to_owned(),
            author: Some("conAuthor".to_owned()),
            created_at: Utc::now(),
        };
        let b = TimelineItem {
            timeline_id: "tA".to_owned(),
            resource_id: "mB".to_owned(),
            owner: "conOwner".to_owned(),
            author: None,
            created_at: Utc::now(),
        };
        let raw = format!(
            "{},{},",
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        let parsed = parse_chunk_body(&raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].resource_id, "mA");
        assert_eq!(parsed[1].resource_id, "mB");
    }

    #[test]
    fn parse_chunk_body_tolerates_missing_trailing_comma() {
        let item = TimelineItem {
            timeline_id: "tA".to_owned(),
            resource_id: "mX".to_owned(),
            owner: "conOwner".to_owned(),
            author: None,
            created_at: Utc::now(),
        };
        let encoded = serde_json::to_string(&item).unwrap();
        let parsed = parse_chunk_body(&encoded);
        assert_eq!(parsed.len(), 1);
    }
}
