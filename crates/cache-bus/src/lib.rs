//! Redis-backed chunk cache and event pub/sub.
//!
//! The distilled spec names a generic "memory cache" plus a "key/value
//! pub/sub bus" as if they were two services (it even lists a separate
//! `RedisAddr` and `MemcachedAddr` in its config surface). This crate backs
//! both on one Redis instance: `ChunkCache::add_empty` maps to `SET key ""
//! NX` (create-if-absent), `ChunkCache::append` maps to a Lua-evaluated
//! "`APPEND` only if the key exists" (Redis's native `APPEND` always
//! creates, which would violate the chunk-cache invariant that appends
//! never create a key), and `Bus::publish`/`subscribe` map directly to
//! Redis `PUBLISH`/`SUBSCRIBE`.

use core_model::{NodeError, NodeResult};
use redis::AsyncCommands;
use redis::aio::PubSub;
use tokio_stream::{Stream, StreamExt};

impl From<redis::RedisError> for NodeError {
    fn from(err: redis::RedisError) -> Self {
        NodeError::Transient(err.to_string())
    }
}

fn chunk_key(timeline_fq: &str, chunk: &str) -> String {
    format!("timeline:body:{timeline_fq}:{chunk}")
}

const APPEND_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('APPEND', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

/// The append-only chunk cache described in SPEC_FULL §4.3.
#[derive(Clone)]
pub struct ChunkCache {
    client: redis::Client,
}

impl ChunkCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Seeds an empty sentinel for `(timeline, chunk)` if no entry exists
    /// yet. Called at chunk rollover for every actively-subscribed remote
    /// timeline -- this is the "promise" that makes later appends
    /// observable (invariant 1).
    pub async fn add_empty(&self, timeline_fq: &str, chunk: &str) -> NodeResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: bool = conn
            .set_nx(chunk_key(timeline_fq, chunk), "")
            .await
            .map_err(NodeError::from)?;
        Ok(())
    }

    /// Appends `<json-encoded item>,` to the chunk's value. Never creates
    /// the key -- a write to a chunk nobody has read or seeded yet is
    /// silently dropped, per invariant 2 (this prevents unbounded memory
    /// growth from drive-by writes to never-read timelines). Returns
    /// whether the append actually happened.
    pub async fn append(
        &self,
        timeline_fq: &str,
        chunk: &str,
        item_json: &str,
    ) -> NodeResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(APPEND_IF_EXISTS);
        let appended: i64 = script
            .key(chunk_key(timeline_fq, chunk))
            .arg(format!("{item_json},"))
            .invoke_async(&mut conn)
            .await
            .map_err(NodeError::from)?;
        Ok(appended == 1)
    }

    /// Reads the raw comma-concatenation for `(timeline, chunk)`. `None`
    /// means the key is unknown (a cache miss); `Some("")` means the chunk
    /// is known but has no items yet -- callers must not conflate the two
    /// (invariant 3).
    pub async fn get(&self, timeline_fq: &str, chunk: &str) -> NodeResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn
            .get(chunk_key(timeline_fq, chunk))
            .await
            .map_err(NodeError::from)?;
        Ok(value)
    }
}

/// The event bus: one Redis channel per timeline id.
#[derive(Clone)]
pub struct Bus {
    client: redis::Client,
}

impl Bus {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Publishes `payload` (a JSON-encoded `Event`) to `channel` (the
    /// event's fully-qualified timeline id). Failures here are logged by
    /// the caller and do not fail the commit that triggered the publish.
    pub async fn publish(&self, channel: &str, payload: &str) -> NodeResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(NodeError::from)?;
        Ok(())
    }

    /// Subscribes to one channel per timeline and returns a stream of raw
    /// JSON payloads. The stream runs until dropped or the connection is
    /// lost; callers terminate it by dropping their cancellation-linked
    /// future (SPEC_FULL §5 "Cancellation").
    pub async fn subscribe(&self, timelines: &[String]) -> NodeResult<BusSubscription> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(NodeError::from)?;
        let mut pubsub = conn.into_pubsub();
        for timeline in timelines {
            pubsub.subscribe(timeline).await.map_err(NodeError::from)?;
        }
        Ok(BusSubscription { pubsub })
    }
}

/// A live subscription to one or more timeline channels.
pub struct BusSubscription {
    pubsub: PubSub,
}

impl BusSubscription {
    /// Turns the subscription into a stream of raw JSON payloads. Decoding
    /// into `core_model::Event` is left to the caller (the timeline
    /// repository), matching the contract `Subscribe(ctx, timelines[], out
    /// chan Event)` where decoding is the repository's job, not the bus's.
    pub fn into_payload_stream(self) -> impl Stream<Item = String> {
        self.pubsub.into_on_message().filter_map(|msg| {
            let payload: Option<String> = msg.get_payload().ok();
            payload
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_format_matches_wire_contract() {
        assert_eq!(
            chunk_key("tAbc@example.com", "1700000000"),
            "timeline:body:tAbc@example.com:1700000000"
        );
    }
}
