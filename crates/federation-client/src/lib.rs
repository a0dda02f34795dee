//! Outbound peer HTTP/WS client: the node's view of its peers.
//!
//! Every method here treats the peer as best-effort: a failed relay is
//! logged by the caller and never allowed to fail a local commit (SPEC_FULL
//! §7 "Propagation"). This crate does not itself decide retry policy; it
//! just reports success/failure for the caller to act on.

use chrono::{DateTime, Utc};
use core_model::{Commit, Domain, Entity, NodeError, NodeResult, TimelineItem};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper over `reqwest` for the node's peer-relay and directory
/// lookups. Promoted from the teacher's test-only dependency to a runtime
/// one, since federated relay is a core concern here rather than a test
/// harness concern.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    http_scheme: &'static str,
    ws_scheme: &'static str,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChunksRequest<'a> {
    timelines: &'a [String],
    time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ChunksResponseEntry {
    items: Vec<TimelineItem>,
}

impl PeerClient {
    pub fn new() -> Self {
        Self::with_transport(false)
    }

    /// `insecure = true` dials peers over plain HTTP/WS instead of
    /// HTTPS/WSS -- see `Config::peer_insecure_transport`.
    pub fn with_transport(insecure: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build peer HTTP client");
        Self {
            http,
            http_scheme: if insecure { "http" } else { "https" },
            ws_scheme: if insecure { "ws" } else { "wss" },
        }
    }

    /// `POST https://<host>/api/v1/commit`. Failures per host are the
    /// caller's to log; this returns the error rather than swallowing it so
    /// the caller can decide (fan-out continues regardless of the result).
    pub async fn commit(&self, host: &str, commit: &Commit) -> NodeResult<()> {
        let url = format!("{}://{host}/api/v1/commit", self.http_scheme);
        let response = self
            .http
            .post(&url)
            .json(commit)
            .send()
            .await
            .map_err(|e| NodeError::Transient(format!("commit relay to {host}: {e}")))?;
        if !response.status().is_success() {
            return Err(NodeError::Transient(format!(
                "commit relay to {host} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// `GET https://<host>/api/v1/entity/<ccid>`.
    pub async fn get_entity(&self, host: &str, ccid: &str) -> NodeResult<Entity> {
        let url = format!("{}://{host}/api/v1/entity/{ccid}", self.http_scheme);
        self.get_json(&url).await
    }

    /// `GET https://<host>/api/v1/domain/<fqdn>`.
    pub async fn get_domain(&self, host: &str, fqdn: &str) -> NodeResult<Domain> {
        let url = format!("{}://{host}/api/v1/domain/{fqdn}", self.http_scheme);
        self.get_json(&url).await
    }

    /// `GET https://<host>/api/v1/domain` -- the peer list used by the
    /// agent's periodic scrape.
    pub async fn list_domains(&self, host: &str) -> NodeResult<Vec<Domain>> {
        let url = format!("{}://{host}/api/v1/domain", self.http_scheme);
        self.get_json(&url).await
    }

    /// `POST https://<host>/api/v1/timelines/chunks`. The result is
    /// authoritative for those remote timelines; the caller is responsible
    /// for writing it back into the local chunk cache.
    pub async fn get_chunks(
        &self,
        host: &str,
        timelines: &[String],
        pivot: DateTime<Utc>,
    ) -> NodeResult<HashMap<String, Vec<TimelineItem>>> {
        let url = format!("{}://{host}/api/v1/timelines/chunks", self.http_scheme);
        let body = ChunksRequest { timelines, time: pivot };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NodeError::Transient(format!("chunk fetch from {host}: {e}")))?;
        if !response.status().is_success() {
            return Err(NodeError::Transient(format!(
                "chunk fetch from {host} returned {}",
                response.status()
            )));
        }
        let parsed: HashMap<String, ChunksResponseEntry> = response
            .json()
            .await
            .map_err(|e| NodeError::Transient(format!("chunk fetch decode from {host}: {e}")))?;
        Ok(parsed
            .into_iter()
            .map(|(timeline, entry)| (timeline, entry.items))
            .collect())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> NodeResult<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| NodeError::Transient(format!("GET {url}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(url.to_owned()));
        }
        if !response.status().is_success() {
            return Err(NodeError::Transient(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| NodeError::Transient(format!("GET {url} decode: {e}")))
    }

    /// Dials `wss://<host>/api/v1/timelines/realtime` for the subscription
    /// manager's upstream connection. Dial failures are surfaced so the
    /// manager can clear the entry and retry on the next subscribe.
    pub async fn dial_realtime(&self, host: &str) -> NodeResult<PeerRealtimeConnection> {
        let url = format!("{}://{host}/api/v1/timelines/realtime", self.ws_scheme);
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| NodeError::Transient(format!("dial {url}: {e}")))?;
        Ok(PeerRealtimeConnection { ws })
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// An established upstream WebSocket to a peer's `/api/v1/timelines/realtime`
/// endpoint.
pub struct PeerRealtimeConnection {
    ws: WsStream,
}

#[derive(Serialize)]
struct ChannelsFrame<'a> {
    channels: &'a [String],
}

impl PeerRealtimeConnection {
    /// Sends `{"channels": [...]}`, replacing the upstream's desired
    /// subscription set.
    pub async fn send_channels(&mut self, channels: &[String]) -> NodeResult<()> {
        let frame = ChannelsFrame { channels };
        let json = serde_json::to_string(&frame)
            .map_err(|e| NodeError::Transient(format!("encode channels frame: {e}")))?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| NodeError::Transient(format!("send channels frame: {e}")))
    }

    /// Reads the next raw JSON text frame from the peer, ignoring pings and
    /// closing on EOF/error. `None` means the connection ended.
    pub async fn next_raw_event(&mut self) -> Option<String> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "upstream peer socket error");
                    return None;
                }
            }
        }
    }
}
