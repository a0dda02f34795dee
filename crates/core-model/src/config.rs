use std::env;
use std::time::Duration;

/// Process configuration, parsed once at startup from environment
/// variables. A missing required variable or an unparsable value is a fatal
/// startup error, matching the "exit codes" contract: non-zero on config
/// load, DB connect, or listen failure.
#[derive(Debug, Clone)]
pub struct Config {
    /// `Concurrent.FQDN` -- this node's fully qualified host name; appears
    /// as the `@suffix` of every timeline minted here.
    pub fqdn: String,
    /// `Concurrent.Dimension` -- peers with a different dimension are
    /// rejected.
    pub dimension: String,
    /// `Concurrent.CCID` -- this node's domain key.
    pub ccid: String,
    /// Postgres connection string.
    pub database_url: String,
    /// Redis URL backing both the chunk cache and the event bus.
    pub redis_url: String,
    /// HTTP/WS listen address.
    pub bind_addr: String,
    /// `tracing` `EnvFilter` directive string.
    pub log_level: String,
    /// Override for the 600-second chunk period; tests use a faster
    /// rollover than real wall-clock waiting.
    pub chunk_rollover: Duration,
    /// Agent scrape cadence.
    pub agent_scrape_interval: Duration,
    /// When set, the peer client dials other nodes over plain HTTP/WS
    /// instead of HTTPS/WSS. Real deployments terminate TLS at a reverse
    /// proxy in front of each node and talk to peers in the clear on the
    /// private mesh behind it; this also lets a local multi-node test mesh
    /// run without issuing certificates.
    pub peer_insecure_transport: bool,
}

impl Config {
    /// Loads configuration from the process environment. Panics (fatal
    /// startup error) on a missing required variable or an unparsable
    /// numeric override, matching the teacher's `main.rs` pattern of
    /// `.expect()`-ing required env vars rather than threading a `Result`
    /// through `main`.
    pub fn from_env() -> Self {
        Self {
            fqdn: env::var("NODE_FQDN").expect("NODE_FQDN must be set"),
            dimension: env::var("NODE_DIMENSION").expect("NODE_DIMENSION must be set"),
            ccid: env::var("NODE_CCID").expect("NODE_CCID must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_owned()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            chunk_rollover: Duration::from_secs(
                env::var("CHUNK_ROLLOVER_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            agent_scrape_interval: Duration::from_secs(
                env::var("AGENT_SCRAPE_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            peer_insecure_transport: env::var("PEER_INSECURE_TRANSPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}
