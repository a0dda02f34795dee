//! Association service (SPEC_FULL §4.5): reactions/replies attached to a
//! message or another association, with the "coverage extension" that
//! relays an association's commit envelope to every host that already
//! hosts its target message, even hosts the association's own timeline
//! list doesn't name.

use cdid::{Cdid, KIND_ASSOCIATION, hash10};
use core_model::{
    Action, Association, Commit, Config, DocumentEnvelope, Event, NodeError, NodeResult,
    ObjectType, SignatureVerifier, TimelineItem,
};
use federation_client::PeerClient;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;
use crate::services::message_service::MessageService;
use crate::services::timeline_service::TimelineService;

#[derive(Clone)]
pub struct AssociationService {
    pool: PgPool,
    config: Config,
    timelines: TimelineService,
    messages: MessageService,
    peer: PeerClient,
    verifier: Arc<dyn SignatureVerifier>,
}

impl AssociationService {
    pub fn new(
        pool: PgPool,
        config: Config,
        timelines: TimelineService,
        messages: MessageService,
        peer: PeerClient,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            pool,
            config,
            timelines,
            messages,
            peer,
            verifier,
        }
    }

    pub async fn create(&self, document: Value, signature: String) -> NodeResult<Association> {
        let envelope: DocumentEnvelope = serde_json::from_value(document.clone())
            .map_err(|e| NodeError::InvalidDocument(e.to_string()))?;
        if envelope.kind != "association" {
            return Err(NodeError::InvalidDocument(format!(
                "expected document.type = association, got {}",
                envelope.kind
            )));
        }
        self.verifier
            .verify(&document, &envelope.signer, &signature)
            .await?;

        let target_id = document
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::InvalidDocument("association document missing target".to_owned()))?
            .to_owned();
        let variant = document
            .get("variant")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let bytes = serde_json::to_vec(&document).map_err(|e| NodeError::InvalidDocument(e.to_string()))?;
        let id = Cdid::new(KIND_ASSOCIATION, hash10(&bytes), envelope.signed_at).to_id_string();

        let association = Association {
            id,
            author: envelope.signer.clone(),
            schema: document
                .get("schema")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            variant,
            target_id: target_id.clone(),
            document,
            signature,
            timelines: envelope.timelines,
            created_at: envelope.signed_at,
        };
        repo::associations::insert(&self.pool, &association)
            .await
            .map_err(to_node_error)?;

        self.fan_out_create(&association).await;
        Ok(association)
    }

    async fn fan_out_create(&self, association: &Association) {
        let mut relayed_hosts: HashSet<String> = HashSet::new();
        let by_host = self.group_by_host(&association.timelines).await;

        for (host, timelines) in &by_host {
            if host == &self.config.fqdn {
                for timeline_fq in timelines {
                    let item = TimelineItem {
                        timeline_id: timeline_fq.clone(),
                        resource_id: association.id.clone(),
                        owner: association.author.clone(),
                        author: Some(association.author.clone()),
                        created_at: association.created_at,
                    };
                    if let Err(err) =
                        self.timelines.post_item(timeline_fq, item, &association.author).await
                    {
                        warn!(timeline = %timeline_fq, error = %err, "local post of association failed");
                        continue;
                    }
                    self.publish(timeline_fq, association).await;
                }
            } else {
                self.relay(host, association).await;
                relayed_hosts.insert(host.clone());
            }
        }

        // Coverage extension: every host of the target message also sees
        // the association's commit, even if the association's own
        // timeline list didn't name that host.
        if association.target_id.starts_with('m') {
            match self.messages.find(&association.target_id).await {
                Ok(target_message) => {
                    let target_hosts = self.group_by_host(&target_message.timelines).await;
                    for host in target_hosts.into_keys() {
                        if host != self.config.fqdn && relayed_hosts.insert(host.clone()) {
                            self.relay(&host, association).await;
                        }
                    }
                }
                Err(err) => {
                    warn!(target = %association.target_id, error = %err, "target message lookup failed during coverage extension");
                }
            }
        }
    }

    async fn relay(&self, host: &str, association: &Association) {
        let commit = Commit {
            document: association.document.clone(),
            signature: association.signature.clone(),
        };
        if let Err(err) = self.peer.commit(host, &commit).await {
            warn!(host = %host, association = %association.id, error = %err, "commit relay failed");
        }
    }

    async fn publish(&self, timeline_fq: &str, association: &Association) {
        let event = Event {
            timeline: timeline_fq.to_owned(),
            object_type: ObjectType::Association,
            action: Action::Create,
            item: Some(TimelineItem {
                timeline_id: timeline_fq.to_owned(),
                resource_id: association.id.clone(),
                owner: association.author.clone(),
                author: Some(association.author.clone()),
                created_at: association.created_at,
            }),
            document: association.document.clone(),
            signature: association.signature.clone(),
            resource: Some(association.id.clone()),
        };
        if let Err(err) = self.timelines.publish_event(event).await {
            warn!(timeline = %timeline_fq, error = %err, "event publish failed");
        }
    }

    /// Authorized principals: the association's own author, or the author
    /// of its target message. Publishes a delete to every timeline the
    /// association was posted to AND (if the target is a message) every
    /// timeline of the target message -- duplicates are possible and are
    /// not deduped, per SPEC_FULL §9's recorded Open Question decision.
    pub async fn delete(&self, id: &str, requester: &str) -> NodeResult<()> {
        let association = repo::associations::find(&self.pool, id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("association {id}")))?;

        let mut authorized = association.author == requester;
        if !authorized && association.target_id.starts_with('m') {
            if let Ok(target_message) = self.messages.find(&association.target_id).await {
                authorized = target_message.author == requester;
            }
        }
        if !authorized {
            warn!(requester = %requester, association = %id, reason = "not association or target author", "delete rejected");
            return Err(NodeError::NotAuthorized(
                "not association author or target message author".to_owned(),
            ));
        }

        repo::associations::delete(&self.pool, id).await.map_err(to_node_error)?;
        self.timelines.delete_items_for_resource(id).await?;

        for timeline_fq in &association.timelines {
            self.publish_delete(timeline_fq, &association).await;
        }
        if association.target_id.starts_with('m') {
            if let Ok(target_message) = self.messages.find(&association.target_id).await {
                for timeline_fq in &target_message.timelines {
                    self.publish_delete(timeline_fq, &association).await;
                }
            }
        }
        Ok(())
    }

    async fn publish_delete(&self, timeline_fq: &str, association: &Association) {
        let event = Event {
            timeline: timeline_fq.to_owned(),
            object_type: ObjectType::Association,
            action: Action::Delete,
            item: None,
            document: association.document.clone(),
            signature: association.signature.clone(),
            resource: Some(association.id.clone()),
        };
        if let Err(err) = self.timelines.publish_event(event).await {
            warn!(timeline = %timeline_fq, error = %err, "delete event publish failed");
        }
    }

    pub async fn find(&self, id: &str) -> NodeResult<Association> {
        repo::associations::find(&self.pool, id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("association {id}")))
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
