//! `MockPeerServer`: a stand-in federation peer for integration tests.
//!
//! Accepts `POST /api/v1/commit` and records every envelope it receives, and
//! accepts a `GET /api/v1/timelines/realtime` WebSocket upgrade, recording
//! the `{"channels": [...]}` frame a subscribing node sends and allowing the
//! test to push synthetic events back down. Grounded in the teacher's
//! `MockWsServer`/`MockWsClient` accept-loop-per-connection pattern
//! (`crates/rt-test-utils/src/mock_ws_server.rs`), rebuilt on axum since the
//! real peer endpoints this stands in for are axum routes.

use axum::{
    Router,
    extract::{
        Json, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use core_model::{Commit, Domain, Entity, TimelineItem};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
struct Recorded {
    commits: Vec<Commit>,
    realtime_subscriptions: Vec<Vec<String>>,
}

struct Inner {
    recorded: Mutex<Recorded>,
    entities: Mutex<HashMap<String, Entity>>,
    domains: Mutex<HashMap<String, Domain>>,
    /// Chunk items a test has seeded, keyed by timeline id, returned
    /// verbatim to any `POST /api/v1/timelines/chunks` caller regardless of
    /// the requested pivot time -- tests only need to assert the remote
    /// fetch path stitches this data in, not exercise real bucket math.
    chunks: Mutex<HashMap<String, Vec<TimelineItem>>>,
    /// Senders for every currently-connected realtime peer socket, so a test
    /// can push a synthetic event to all of them.
    realtime_senders: Mutex<Vec<mpsc::Sender<String>>>,
}

#[derive(Clone)]
struct AppState(Arc<Inner>);

/// A mock peer node. Binds to a random local port; drop it to shut the
/// listener down.
pub struct MockPeerServer {
    addr: SocketAddr,
    state: AppState,
    _task: tokio::task::JoinHandle<()>,
}

impl MockPeerServer {
    pub async fn start() -> Self {
        let state = AppState(Arc::new(Inner {
            recorded: Mutex::new(Recorded::default()),
            entities: Mutex::new(HashMap::new()),
            domains: Mutex::new(HashMap::new()),
            chunks: Mutex::new(HashMap::new()),
            realtime_senders: Mutex::new(Vec::new()),
        }));

        let router = Router::new()
            .route("/api/v1/commit", post(handle_commit))
            .route("/api/v1/entity/{ccid}", get(handle_get_entity))
            .route("/api/v1/domain", get(handle_list_domains))
            .route("/api/v1/domain/{fqdn}", get(handle_get_domain))
            .route("/api/v1/timelines/chunks", post(handle_post_chunks))
            .route("/api/v1/timelines/realtime", get(handle_realtime))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock peer server failed to bind");
        let addr = listener.local_addr().expect("mock peer server local_addr");

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("mock peer server exited");
        });

        Self {
            addr,
            state,
            _task: task,
        }
    }

    /// `host:port` string suitable for `PeerClient`/`federation-client` host
    /// arguments in tests that don't go through TLS.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub async fn seed_entity(&self, entity: Entity) {
        self.state
            .0
            .entities
            .lock()
            .await
            .insert(entity.ccid.clone(), entity);
    }

    pub async fn seed_domain(&self, domain: Domain) {
        self.state
            .0
            .domains
            .lock()
            .await
            .insert(domain.fqdn.clone(), domain);
    }

    pub async fn seed_chunk(&self, timeline: impl Into<String>, items: Vec<TimelineItem>) {
        self.state.0.chunks.lock().await.insert(timeline.into(), items);
    }

    pub async fn received_commits(&self) -> Vec<Commit> {
        self.state.0.recorded.lock().await.commits.clone()
    }

    pub async fn received_realtime_subscriptions(&self) -> Vec<Vec<String>> {
        self.state
            .0
            .recorded
            .lock()
            .await
            .realtime_subscriptions
            .clone()
    }

    /// Pushes a raw JSON event down every currently-connected realtime
    /// socket, simulating a peer-originated event.
    pub async fn push_realtime_event(&self, raw_json: String) {
        let senders = self.state.0.realtime_senders.lock().await;
        for sender in senders.iter() {
            let _ = sender.send(raw_json.clone()).await;
        }
    }
}

async fn handle_commit(
    State(state): State<AppState>,
    Json(commit): Json<Commit>,
) -> impl IntoResponse {
    state.0.recorded.lock().await.commits.push(commit);
    Json(serde_json::json!({ "status": "ok", "content": {} }))
}

async fn handle_get_entity(
    State(state): State<AppState>,
    Path(ccid): Path<String>,
) -> impl IntoResponse {
    match state.0.entities.lock().await.get(&ccid).cloned() {
        Some(entity) => Json(entity).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_get_domain(
    State(state): State<AppState>,
    Path(fqdn): Path<String>,
) -> impl IntoResponse {
    match state.0.domains.lock().await.get(&fqdn).cloned() {
        Some(domain) => Json(domain).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_list_domains(State(state): State<AppState>) -> impl IntoResponse {
    let domains: Vec<Domain> = state.0.domains.lock().await.values().cloned().collect();
    Json(domains)
}

#[derive(serde::Deserialize)]
struct ChunksRequest {
    timelines: Vec<String>,
    #[allow(dead_code)]
    time: DateTime<Utc>,
}

#[derive(serde::Serialize)]
struct ChunksResponseEntry {
    items: Vec<TimelineItem>,
}

async fn handle_post_chunks(
    State(state): State<AppState>,
    Json(body): Json<ChunksRequest>,
) -> impl IntoResponse {
    let chunks = state.0.chunks.lock().await;
    let response: HashMap<String, ChunksResponseEntry> = body
        .timelines
        .into_iter()
        .filter_map(|timeline| {
            chunks
                .get(&timeline)
                .cloned()
                .map(|items| (timeline, ChunksResponseEntry { items }))
        })
        .collect();
    Json(response)
}

#[derive(serde::Deserialize)]
struct ChannelsFrame {
    channels: Vec<String>,
}

async fn handle_realtime(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_realtime_socket(socket, state))
}

async fn run_realtime_socket(mut socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<String>(32);
    state.0.realtime_senders.lock().await.push(tx);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<ChannelsFrame>(&text) {
                            state.0.recorded.lock().await.realtime_subscriptions.push(frame.channels);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            Some(event) = rx.recv() => {
                if socket.send(Message::Text(event.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
