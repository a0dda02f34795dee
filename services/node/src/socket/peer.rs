//! Peer-facing realtime socket (`GET /api/v1/timelines/realtime`,
//! SPEC_FULL §4.7/§6): the inbound half of the peer mesh. A remote node's
//! `SubscriptionManager::spawn_remote_sub_routine` dials in here and sends
//! `{"channels": [...]}` to declare the timelines it wants mirrored; this
//! node already publishes every local mutation on its own bus, so serving
//! a peer is just another bus subscription, unlike the client socket this
//! never registers into `SubscriptionManager`'s own maps.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use core_model::Event;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::socket::client::spawn_forwarder;
use crate::state::AppState;

#[derive(Deserialize)]
struct ChannelsFrame {
    channels: Vec<String>,
}

pub async fn peer_realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer_socket(socket, state))
}

async fn handle_peer_socket(mut socket: WebSocket, state: AppState) {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<ChannelsFrame>(&text) {
                            if let Some(handle) = forwarder.take() {
                                handle.abort();
                            }
                            forwarder = Some(spawn_forwarder(state.timeline_repo.clone(), frame.channels, event_tx.clone()));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
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
}
