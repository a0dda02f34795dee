//! Message service (SPEC_FULL §4.5): validates a signed commit, persists
//! the message, and fans the item out to every target timeline, either by
//! posting locally or relaying the commit envelope to the owning peer.

use cdid::{Cdid, KIND_MESSAGE, hash10};
use chrono::Utc;
use core_model::{
    Action, Commit, Config, DocumentEnvelope, Event, Message, NodeError, NodeResult, ObjectType,
    SignatureVerifier, TimelineItem,
};
use federation_client::PeerClient;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;
use crate::services::timeline_service::TimelineService;

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
    config: Config,
    timelines: TimelineService,
    peer: PeerClient,
    verifier: Arc<dyn SignatureVerifier>,
}

impl MessageService {
    pub fn new(
        pool: PgPool,
        config: Config,
        timelines: TimelineService,
        peer: PeerClient,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            pool,
            config,
            timelines,
            peer,
            verifier,
        }
    }

    pub async fn create(&self, document: Value, signature: String) -> NodeResult<Message> {
        let envelope: DocumentEnvelope = serde_json::from_value(document.clone())
            .map_err(|e| NodeError::InvalidDocument(e.to_string()))?;
        if envelope.kind != "message" {
            return Err(NodeError::InvalidDocument(format!(
                "expected document.type = message, got {}",
                envelope.kind
            )));
        }
        self.verifier
            .verify(&document, &envelope.signer, &signature)
            .await?;

        let bytes = serde_json::to_vec(&document).map_err(|e| NodeError::InvalidDocument(e.to_string()))?;
        let id = Cdid::new(KIND_MESSAGE, hash10(&bytes), envelope.signed_at).to_id_string();

        let message = Message {
            id,
            author: envelope.signer.clone(),
            schema: document
                .get("schema")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            document,
            signature,
            timelines: envelope.timelines,
            created_at: envelope.signed_at,
        };
        repo::messages::insert(&self.pool, &message)
            .await
            .map_err(to_node_error)?;

        self.fan_out_create(&message).await;
        Ok(message)
    }

    async fn fan_out_create(&self, message: &Message) {
        let by_host = self.group_by_host(&message.timelines).await;
        for (host, timelines) in by_host {
            if host == self.config.fqdn {
                for timeline_fq in timelines {
                    let item = TimelineItem {
                        timeline_id: timeline_fq.clone(),
                        resource_id: message.id.clone(),
                        owner: message.author.clone(),
                        author: Some(message.author.clone()),
                        created_at: message.created_at,
                    };
                    if let Err(err) = self.timelines.post_item(&timeline_fq, item, &message.author).await {
                        warn!(timeline = %timeline_fq, error = %err, "local post of message failed");
                        continue;
                    }
                    self.publish(&timeline_fq, ObjectType::Message, Action::Create, message).await;
                }
            } else {
                self.relay(&host, message).await;
            }
        }
    }

    async fn relay(&self, host: &str, message: &Message) {
        let commit = Commit {
            document: message.document.clone(),
            signature: message.signature.clone(),
        };
        if let Err(err) = self.peer.commit(host, &commit).await {
            warn!(host = %host, message = %message.id, error = %err, "commit relay failed");
        }
    }

    async fn publish(&self, timeline_fq: &str, object_type: ObjectType, action: Action, message: &Message) {
        let event = Event {
            timeline: timeline_fq.to_owned(),
            object_type,
            action,
            item: Some(TimelineItem {
                timeline_id: timeline_fq.to_owned(),
                resource_id: message.id.clone(),
                owner: message.author.clone(),
                author: Some(message.author.clone()),
                created_at: message.created_at,
            }),
            document: message.document.clone(),
            signature: message.signature.clone(),
            resource: Some(message.id.clone()),
        };
        if let Err(err) = self.timelines.publish_event(event).await {
            warn!(timeline = %timeline_fq, error = %err, "event publish failed");
        }
    }

    /// Only the author may delete. Publishes a `delete` event to every
    /// original target timeline on success.
    pub async fn delete(&self, id: &str, requester: &str) -> NodeResult<()> {
        let message = repo::messages::find(&self.pool, id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("message {id}")))?;
        if message.author != requester {
            warn!(requester = %requester, message = %id, reason = "not message author", "delete rejected");
            return Err(NodeError::NotAuthorized("not message author".to_owned()));
        }
        repo::messages::delete(&self.pool, id).await.map_err(to_node_error)?;
        self.timelines.delete_items_for_resource(id).await?;
        for timeline_fq in &message.timelines {
            self.publish(timeline_fq, ObjectType::Message, Action::Delete, &message).await;
        }
        Ok(())
    }

    pub async fn find(&self, id: &str) -> NodeResult<Message> {
        repo::messages::find(&self.pool, id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("message {id}")))
    }

    async fn group_by_host(&self, timelines: &[String]) -> HashMap<String, Vec<String>> {
        let mut by_host: HashMap<String, Vec<String>> = HashMap::new();
        for raw in timelines {
            match self.timelines.normalize_timeline_id(raw).await {
                Ok(normalized) => {
                    if let Some((_, host)) = normalized.rsplit_once('@') {
                        by_host.entry(host.to_owned()).or_default().push(normalized.clone());
                    }
                }
                Err(err) => warn!(timeline = %raw, error = %err, "failed to normalize target timeline"),
            }
        }
        by_host
    }
}
