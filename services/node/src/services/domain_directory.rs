//! Entity and Domain resolution: cache-aside against the local DB, falling
//! back to a peer fetch on miss.

use core_model::{Config, Domain, Entity, NodeError, NodeResult};
use federation_client::PeerClient;
use sqlx::PgPool;
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;

/// Resolves CCIDs to `Entity` records and FQDNs to `Domain` records.
///
/// `GetEntity` has no host to query on a cache miss unless the caller
/// supplies one -- a bare ccid does not carry its own domain. Callers that
/// learn of a ccid in the context of a specific peer (e.g. the host a
/// commit or chunk response came from) pass that host as `hint_host`; a
/// miss with no hint is `NotFound` rather than a guess. See DESIGN.md Open
/// Question on entity resolution.
pub struct DomainDirectory {
    pool: PgPool,
    peer: PeerClient,
    config: Config,
}

impl DomainDirectory {
    pub fn new(pool: PgPool, peer: PeerClient, config: Config) -> Self {
        Self { pool, peer, config }
    }

    pub async fn get_entity(&self, ccid: &str, hint_host: Option<&str>) -> NodeResult<Entity> {
        if let Some(entity) = repo::entities::find(&self.pool, ccid)
            .await
            .map_err(to_node_error)?
        {
            return Ok(entity);
        }
        let host = hint_host.ok_or_else(|| NodeError::NotFound(ccid.to_owned()))?;
        let entity = self.peer.get_entity(host, ccid).await?;
        repo::entities::upsert(&self.pool, &entity)
            .await
            .map_err(to_node_error)?;
        Ok(entity)
    }

    /// Resolves `fqdn` to a `Domain`, enforcing the dimension check on BOTH
    /// the cache-hit and the freshly-fetched path -- a domain that passed
    /// the check at insert time but whose dimension now diverges from
    /// local config must still be rejected on read.
    pub async fn get_domain(&self, fqdn: &str) -> NodeResult<Domain> {
        if let Some(domain) = repo::domains::find(&self.pool, fqdn)
            .await
            .map_err(to_node_error)?
        {
            return self.check_dimension(domain);
        }
        let domain = self.peer.get_domain(fqdn, fqdn).await?;
        repo::domains::upsert(&self.pool, &domain)
            .await
            .map_err(to_node_error)?;
        self.check_dimension(domain)
    }

    pub async fn get_domain_by_ccid(&self, ccid: &str, hint_host: Option<&str>) -> NodeResult<Domain> {
        let entity = self.get_entity(ccid, hint_host).await?;
        self.get_domain(&entity.domain).await
    }

    pub async fn list(&self) -> NodeResult<Vec<Domain>> {
        repo::domains::list(&self.pool).await.map_err(to_node_error)
    }

    /// Records a domain learned from a peer's scrape response. Persists
    /// unconditionally -- even a dimension mismatch is kept for audit, per
    /// SPEC_FULL §4.2 -- and only then applies the same usability check
    /// `get_domain` applies on every read, so a scraped out-of-dimension
    /// peer is recorded but still reported as unusable to the caller.
    pub async fn upsert(&self, domain: Domain) -> NodeResult<()> {
        repo::domains::upsert(&self.pool, &domain)
            .await
            .map_err(to_node_error)?;
        self.check_dimension(domain)?;
        Ok(())
    }

    pub async fn update_scrape_time(&self, fqdn: &str) -> NodeResult<()> {
        repo::domains::update_scrape_time(&self.pool, fqdn)
            .await
            .map_err(to_node_error)
    }

    fn check_dimension(&self, domain: Domain) -> NodeResult<Domain> {
        if domain.dimension != self.config.dimension {
            warn!(fqdn = %domain.fqdn, dimension = %domain.dimension, "domain belongs to a different dimension");
            return Err(NodeError::WrongDimension);
        }
        Ok(domain)
    }
}
