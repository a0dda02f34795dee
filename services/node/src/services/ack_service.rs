//! Ack service (SPEC_FULL §4.6): applies an ack/unack of one entity by
//! another, relaying the commit to the target's home domain best-effort.

use core_model::{Ack, Commit, Config, DocumentEnvelope, NodeError, NodeResult};
use federation_client::PeerClient;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;
use crate::services::domain_directory::DomainDirectory;

#[derive(Clone)]
pub struct AckService {
    pool: PgPool,
    config: Config,
    domains: Arc<DomainDirectory>,
    peer: PeerClient,
}

impl AckService {
    pub fn new(pool: PgPool, config: Config, domains: Arc<DomainDirectory>, peer: PeerClient) -> Self {
        Self {
            pool,
            config,
            domains,
            peer,
        }
    }

    /// `Ack.Create`: resolves `to`'s home domain best-effort and relays
    /// there before applying locally, regardless of whether the relay
    /// step succeeded (SPEC_FULL §4.6 -- the only early return on error is
    /// the local persistence step).
    pub async fn create(&self, document: Value, signature: String) -> NodeResult<()> {
        let envelope: DocumentEnvelope = serde_json::from_value(document.clone())
            .map_err(|e| NodeError::InvalidDocument(e.to_string()))?;

        let from = envelope.signer.clone();
        let to = document
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::InvalidDocument("ack document missing to".to_owned()))?
            .to_owned();

        self.relay_best_effort(&to, &document, &signature).await;

        match envelope.kind.as_str() {
            "ack" => {
                let entry = Ack {
                    from_ccid: from,
                    to_ccid: to,
                    document,
                    signature,
                };
                repo::acks::ack(&self.pool, &entry).await.map_err(to_node_error)
            }
            "unack" => repo::acks::unack(&self.pool, &from, &to).await.map_err(to_node_error),
            other => Err(NodeError::InvalidDocument(format!("unknown ack type {other}"))),
        }
    }

    async fn relay_best_effort(&self, to: &str, document: &Value, signature: &str) {
        let domain = match self.domains.get_domain_by_ccid(to, None).await {
            Ok(domain) => domain,
            Err(err) => {
                warn!(to = %to, error = %err, "could not resolve ack target's home domain");
                return;
            }
        };
        if domain.fqdn == self.config.fqdn {
            return;
        }
        let commit = Commit {
            document: document.clone(),
            signature: signature.to_owned(),
        };
        if let Err(err) = self.peer.commit(&domain.fqdn, &commit).await {
            warn!(host = %domain.fqdn, error = %err, "ack relay failed");
        }
    }
}
