//! Background housekeeping binary (SPEC_FULL §4.8): at `AGENT_SCRAPE_INTERVAL_SECS`
//! cadence, walks the known domain list, asks each for its own peer list, and
//! records what comes back. Deployed as its own binary sharing the node's
//! library crate, config loading, and DB pool setup rather than a task spawned
//! inside the HTTP server process -- grounded in `original_source/cmd/main.go`
//! wiring a distinct `agent.Boot()` alongside the HTTP handlers.
//!
//! This process shares the node's Postgres database; it never calls the
//! node's own HTTP API. It does not touch chunk-rollover housekeeping --
//! `remoteSubs`/`remoteConns` live only in the node process's memory, so
//! that half of SPEC_FULL §4.7's housekeeping stays owned by
//! `SubscriptionManager::spawn_chunk_updater` inside the node binary. See
//! DESIGN.md Open Question on the agent/node housekeeping split.

use core_model::Config;
use federation_client::PeerClient;
use node::db;
use node::services::domain_directory::DomainDirectory;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .init();

    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;

    let peer = PeerClient::with_transport(config.peer_insecure_transport);
    let domains = DomainDirectory::new(pool, peer.clone(), config.clone());

    info!(interval_secs = config.agent_scrape_interval.as_secs(), "agent starting scrape loop");
    loop {
        scrape_once(&domains, &peer).await;
        tokio::time::sleep(config.agent_scrape_interval).await;
    }
}

async fn scrape_once(domains: &DomainDirectory, peer: &PeerClient) {
    let known = match domains.list().await {
        Ok(known) => known,
        Err(err) => {
            warn!(error = %err, "failed to list known domains");
            return;
        }
    };

    for domain in known {
        match peer.list_domains(&domain.fqdn).await {
            Ok(scraped) => {
                for scraped_domain in scraped {
                    if let Err(err) = domains.upsert(scraped_domain.clone()).await {
                        warn!(fqdn = %scraped_domain.fqdn, error = %err, "failed to record scraped domain");
                    }
                }
                if let Err(err) = domains.update_scrape_time(&domain.fqdn).await {
                    warn!(fqdn = %domain.fqdn, error = %err, "failed to update scrape time");
                }
            }
            Err(err) => {
                warn!(fqdn = %domain.fqdn, error = %err, "domain scrape failed");
            }
        }
    }
}
