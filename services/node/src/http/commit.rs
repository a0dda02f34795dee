//! `POST /api/v1/commit` (SPEC_FULL §6): the single federated ingress
//! point. Dispatches on `document.type` to the right service, mirroring
//! the original source's commit-dispatcher shape rather than exposing one
//! HTTP route per object kind for writes.

use axum::{extract::State, response::IntoResponse, Json};
use core_model::{Commit, DocumentEnvelope, NodeError, Timeline};
use serde_json::{json, Value};

use crate::http::response::{node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn post_commit(State(state): State<AppState>, Json(commit): Json<Commit>) -> HttpResponse {
    match dispatch(&state, commit).await {
        Ok(content) => Json(json!({ "status": "ok", "content": content })).into_response(),
        Err(err) => node_error_response(err),
    }
}

async fn dispatch(state: &AppState, commit: Commit) -> Result<Value, NodeError> {
    let envelope: DocumentEnvelope = serde_json::from_value(commit.document.clone())
        .map_err(|e| NodeError::InvalidDocument(e.to_string()))?;

    match envelope.kind.as_str() {
        "message" => {
            let message = state.messages.create(commit.document, commit.signature).await?;
            encode(message)
        }
        "association" => {
            let association = state
                .associations
                .create(commit.document, commit.signature)
                .await?;
            encode(association)
        }
        "ack" | "unack" => {
            state.acks.create(commit.document, commit.signature).await?;
            Ok(json!({}))
        }
        "timeline" => {
            let timeline = timeline_from_document(&commit.document)?;
            let semantic_id = envelope.semantic_id.clone();
            let timeline = state.timelines.upsert_timeline(timeline, &envelope.signer).await?;
            if let Some(name) = semantic_id {
                state
                    .timelines
                    .bind_semantic_id(&name, &envelope.signer, &timeline.id)
                    .await?;
            }
            encode(timeline)
        }
        "delete" => {
            let target = commit
                .document
                .get("target")
                .and_then(Value::as_str)
                .ok_or_else(|| NodeError::InvalidDocument("delete document missing target".to_owned()))?;
            dispatch_delete(state, target, &envelope.signer).await?;
            Ok(json!({}))
        }
        other => Err(NodeError::InvalidDocument(format!("unknown document type {other}"))),
    }
}

async fn dispatch_delete(state: &AppState, target: &str, requester: &str) -> Result<(), NodeError> {
    match target.chars().next() {
        Some('m') => state.messages.delete(target, requester).await,
        Some('a') => state.associations.delete(target, requester).await,
        Some('t') => state.timelines.delete_timeline(target, requester).await,
        _ => Err(NodeError::InvalidDocument(format!("cannot delete unknown kind {target}"))),
    }
}

fn timeline_from_document(document: &Value) -> Result<Timeline, NodeError> {
    let invalid = || NodeError::InvalidDocument("malformed timeline document".to_owned());
    Ok(Timeline {
        id: document.get("id").and_then(Value::as_str).unwrap_or_default().to_owned(),
        author: String::new(),
        schema: document.get("schema").and_then(Value::as_str).ok_or_else(invalid)?.to_owned(),
        policy: document.get("policy").and_then(Value::as_str).map(str::to_owned),
        policy_params: document.get("policyParams").cloned(),
        domain_owned: document.get("domainOwned").and_then(Value::as_bool).unwrap_or(false),
        indexable: document.get("indexable").and_then(Value::as_bool).unwrap_or(true),
    })
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value, NodeError> {
    serde_json::to_value(value).map_err(|e| NodeError::InvalidDocument(e.to_string()))
}
