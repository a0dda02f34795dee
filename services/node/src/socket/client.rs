//! Client-facing multiplex socket (`GET /api/v1/socket`, SPEC_FULL §6/§4.7).
//!
//! One connection may replace its desired channel set any number of times;
//! each replacement cancels the previous bus subscription task and starts a
//! fresh one, per the per-subscription-set cancellation token described in
//! SPEC_FULL §5.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use core_model::Event;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct SocketQuery {
    ccid: String,
}

#[derive(Deserialize)]
struct ChannelsFrame {
    channels: Vec<String>,
}

pub async fn client_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state, query.ccid))
}

async fn handle_client_socket(mut socket: WebSocket, state: AppState, ccid: String) {
    let conn_id = state.next_conn_id();
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ChannelsFrame>(&text) {
                            Ok(frame) => {
                                state.subscriptions.subscribe(conn_id, ccid.clone(), frame.channels.clone()).await;
                                if let Some(handle) = forwarder.take() {
                                    handle.abort();
                                }
                                forwarder = Some(spawn_forwarder(state.timeline_repo.clone(), frame.channels, event_tx.clone()));
                            }
                            Err(err) => warn!(conn_id, error = %err, "malformed channels frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        warn!(conn_id, error = %err, "client socket error");
                        break;
                    }
                    _ => {}
                }
            }
            Some(event) = event_rx.recv() => {
                if let Ok(json) = serde_json::to_string(&event) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Some(handle) = forwarder.take() {
        handle.abort();
    }
    state.subscriptions.unsubscribe(conn_id).await;
}

pub(crate) fn spawn_forwarder(
    repo: crate::services::timeline_repo::TimelineRepo,
    channels: Vec<String>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if channels.is_empty() {
            return;
        }
        match repo.subscribe(&channels).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to subscribe to bus channels"),
        }
    })
}
