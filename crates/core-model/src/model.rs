use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved user identity. Cached locally; refreshed from the home node
/// when a signer is seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub ccid: String,
    pub domain: String,
    pub public_key: String,
}

/// A peer node. `dimension` partitions the mesh; a domain whose dimension
/// doesn't match local config is persisted (for audit) but unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub fqdn: String,
    pub ccid: String,
    pub dimension: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// A signed, authored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub schema: String,
    pub document: Value,
    pub signature: String,
    pub timelines: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A reaction/reply attached to a message or another association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub id: String,
    pub author: String,
    pub schema: String,
    pub variant: String,
    pub target_id: String,
    pub document: Value,
    pub signature: String,
    pub timelines: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A timeline record as stored -- `id` never carries the `@fqdn` suffix;
/// callers append it on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: String,
    pub author: String,
    pub schema: String,
    pub policy: Option<String>,
    pub policy_params: Option<Value>,
    pub domain_owned: bool,
    pub indexable: bool,
}

/// One entry in a timeline. `created_at` is the field chunking and ordering
/// are computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub timeline_id: String,
    pub resource_id: String,
    pub owner: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A human-friendly name scoped to a CCID, resolving to a timeline id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticId {
    pub name: String,
    pub owner: String,
    pub target_timeline_id: String,
}

/// A directional relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub from_ccid: String,
    pub to_ccid: String,
    pub document: Value,
    pub signature: String,
}

/// The kind of object an `Event` or commit envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Message,
    Association,
    Ack,
    Unack,
    Timeline,
    Delete,
}

/// The mutation an `Event` announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Delete,
}

/// A realtime notification, published to the local bus and relayed to
/// subscribed peers. Mirrors the wire shape in SPEC_FULL §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timeline: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<TimelineItem>,
    pub document: Value,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// The envelope relayed between peers and accepted by `POST /commit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub document: Value,
    pub signature: String,
}

/// The subset of `document` every commit must carry so the dispatcher can
/// route it before doing kind-specific parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub signer: String,
    #[serde(rename = "signedAt")]
    pub signed_at: DateTime<Utc>,
    #[serde(default)]
    pub timelines: Vec<String>,
    #[serde(rename = "semanticID", default)]
    pub semantic_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}
