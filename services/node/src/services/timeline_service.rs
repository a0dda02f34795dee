//! Timeline service (SPEC_FULL §4.4): timeline id normalization, the
//! write-policy gate, and the recent/chunk read path that merges local
//! cache, local DB, and remote peers.

use cdid::{Cdid, KIND_TIMELINE, hash10, is_ccid, is_seems_cdid};
use chrono::{DateTime, Utc};
use core_model::{
    Config, Event, NodeError, NodeResult, PolicyClient, SemanticId, Timeline, TimelineItem,
};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::db_err::to_node_error;
use crate::repo;
use crate::services::domain_directory::DomainDirectory;
use crate::services::timeline_repo::TimelineRepo;
use crate::services::writability;
use crate::socket::manager::SubscriptionManager;

#[derive(Clone)]
pub struct TimelineService {
    pool: PgPool,
    config: Config,
    repo: TimelineRepo,
    domains: Arc<DomainDirectory>,
    policy: Arc<dyn PolicyClient>,
    subscriptions: SubscriptionManager,
}

impl TimelineService {
    pub fn new(
        pool: PgPool,
        config: Config,
        repo: TimelineRepo,
        domains: Arc<DomainDirectory>,
        policy: Arc<dyn PolicyClient>,
        subscriptions: SubscriptionManager,
    ) -> Self {
        Self {
            pool,
            config,
            repo,
            domains,
            policy,
            subscriptions,
        }
    }

    /// `NormalizeTimelineID` (SPEC_FULL §4.4). A bare name with no `@`
    /// suffix at all has no ccid to scope a semantic lookup by, which the
    /// original source doesn't handle explicitly (its check indexes the
    /// split unconditionally on `@`, implicitly requiring one) -- here the
    /// owner defaults to this node's own domain ccid (`config.ccid`),
    /// matching how a domain-owned timeline is scoped to the node itself.
    /// See DESIGN.md Open Question.
    pub async fn normalize_timeline_id(&self, raw: &str) -> NodeResult<String> {
        let (prefix, suffix) = match raw.split_once('@') {
            Some((p, s)) => (p, Some(s)),
            None => (raw, None),
        };

        let (fqdn, owner_ccid) = match suffix {
            Some(s) if is_ccid(s) => {
                let entity = self.domains.get_entity(s, None).await?;
                (entity.domain, Some(s.to_owned()))
            }
            Some(s) => (s.to_owned(), None),
            None => (self.config.fqdn.clone(), None),
        };

        let mut id = prefix.to_owned();
        if !is_seems_cdid(&id, KIND_TIMELINE) && fqdn == self.config.fqdn {
            let owner = owner_ccid.unwrap_or_else(|| self.config.ccid.clone());
            match repo::semantic_ids::find(&self.pool, &id, &owner)
                .await
                .map_err(to_node_error)?
            {
                Some(semantic) => {
                    if repo::timelines::find(&self.pool, &semantic.target_timeline_id)
                        .await
                        .map_err(to_node_error)?
                        .is_none()
                    {
                        repo::semantic_ids::delete(&self.pool, &id, &owner)
                            .await
                            .map_err(to_node_error)?;
                        return Err(NodeError::NotFound(format!(
                            "semantic id {id} for {owner} has no live target"
                        )));
                    }
                    id = semantic.target_timeline_id;
                }
                None => return Err(NodeError::NotFound(format!("semantic id {id} for {owner}"))),
            }
        }

        Ok(format!("{id}@{fqdn}"))
    }

    /// `GetRecentItems`: normalize, pull cached chunks for `Time2Chunk(until)`,
    /// fill misses from local DB or remote peers, dedupe by resource id
    /// (first occurrence wins), sort descending by `created_at`, truncate.
    pub async fn get_recent_items(
        &self,
        timelines: &[String],
        until: DateTime<Utc>,
        limit: usize,
    ) -> NodeResult<Vec<TimelineItem>> {
        let normalized = self.normalize_all(timelines).await?;
        let until_chunk = cdid::time_to_chunk(until);

        let mut by_timeline = self.repo.get_chunks_from_cache(&normalized, &until_chunk).await?;
        let missing: Vec<String> = normalized
            .iter()
            .filter(|t| !by_timeline.contains_key(*t))
            .cloned()
            .collect();
        self.fill_misses(&missing, until, &until_chunk, &mut by_timeline).await?;

        let mut flattened: Vec<TimelineItem> = by_timeline
            .into_values()
            .flatten()
            .filter(|item| item.created_at <= until)
            .collect();
        flattened.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(dedupe_and_truncate(flattened, limit))
    }

    /// The forward-looking counterpart of `get_recent_items`
    /// (`GetImmediateItems`, SPEC_FULL §4.4 supplemented operation):
    /// ascending order, `created_at >= since`.
    pub async fn get_immediate_items(
        &self,
        timelines: &[String],
        since: DateTime<Utc>,
        limit: usize,
    ) -> NodeResult<Vec<TimelineItem>> {
        let normalized = self.normalize_all(timelines).await?;
        let since_chunk = cdid::time_to_chunk(since);

        let mut by_timeline = self.repo.get_chunks_from_cache(&normalized, &since_chunk).await?;
        let missing: Vec<String> = normalized
            .iter()
            .filter(|t| !by_timeline.contains_key(*t))
            .cloned()
            .collect();
        self.fill_misses(&missing, since, &since_chunk, &mut by_timeline).await?;

        let mut flattened: Vec<TimelineItem> = by_timeline
            .into_values()
            .flatten()
            .filter(|item| item.created_at >= since)
            .collect();
        flattened.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(dedupe_and_truncate(flattened, limit))
    }

    async fn fill_misses(
        &self,
        missing: &[String],
        pivot: DateTime<Utc>,
        chunk: &str,
        by_timeline: &mut HashMap<String, Vec<TimelineItem>>,
    ) -> NodeResult<()> {
        let mut by_host: HashMap<String, Vec<String>> = HashMap::new();
        for timeline in missing {
            if let Some((_, host)) = timeline.rsplit_once('@') {
                by_host.entry(host.to_owned()).or_default().push(timeline.clone());
            }
        }

        for (host, hosted) in by_host {
            let fetched = if host == self.config.fqdn {
                self.repo.get_chunks_from_db(&hosted, chunk).await?
            } else {
                self.repo.get_chunks_from_remote(&host, &hosted, pivot).await?
            };
            by_timeline.extend(fetched);
        }
        Ok(())
    }

    async fn normalize_all(&self, timelines: &[String]) -> NodeResult<Vec<String>> {
        let mut out = Vec::with_capacity(timelines.len());
        for t in timelines {
            out.push(self.normalize_timeline_id(t).await?);
        }
        Ok(out)
    }

    /// `PostItem`: local writes only. Remote targets are the caller's
    /// (message/association service's) job to relay.
    pub async fn post_item(
        &self,
        timeline_fq: &str,
        item: TimelineItem,
        author: &str,
    ) -> NodeResult<()> {
        let (timeline_id, host) = timeline_fq
            .rsplit_once('@')
            .ok_or_else(|| NodeError::InvalidDocument(format!("malformed timeline id {timeline_fq}")))?;
        if host != self.config.fqdn {
            return Err(NodeError::RemoteNotSupported);
        }

        let timeline = repo::timelines::find(&self.pool, timeline_id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("timeline {timeline_id}")))?;

        let decision = writability::check(&timeline, author, self.policy.as_ref()).await;
        if !decision.writable {
            warn!(requester = %author, timeline = %timeline_fq, reason = %decision.reason, "post rejected");
            return Err(NodeError::NotAuthorized(decision.reason.to_owned()));
        }

        self.repo.create_item(&item).await
    }

    /// `PublishEvent`: normalize then forward to the repository.
    pub async fn publish_event(&self, mut event: Event) -> NodeResult<()> {
        event.timeline = self.normalize_timeline_id(&event.timeline).await?;
        self.repo.publish_event(&event).await
    }

    /// `UpsertTimeline` (SPEC_FULL §4.4).
    pub async fn upsert_timeline(&self, mut timeline: Timeline, signer: &str) -> NodeResult<Timeline> {
        if timeline.id.is_empty() {
            let document = serde_json::to_vec(&timeline.policy_params)
                .map_err(|e| NodeError::InvalidDocument(e.to_string()))?;
            let cdid = Cdid::new(KIND_TIMELINE, hash10(&document), Utc::now());
            timeline.id = cdid.to_id_string();
        } else {
            let normalized = self.normalize_timeline_id(&timeline.id).await?;
            let (id, host) = normalized
                .rsplit_once('@')
                .expect("normalize_timeline_id always returns an id@host pair");
            if host != self.config.fqdn {
                return Err(NodeError::RemoteNotSupported);
            }
            timeline.id = id.to_owned();
        }
        timeline.author = signer.to_owned();
        repo::timelines::upsert(&self.pool, &timeline)
            .await
            .map_err(to_node_error)?;
        Ok(timeline)
    }

    /// Registers or updates the `(name, owner)` semantic pointer for a
    /// freshly upserted timeline. Separate from `upsert_timeline` because
    /// the distilled algorithm's existing-semantic-id branch needs to run
    /// before minting, not after.
    pub async fn bind_semantic_id(&self, name: &str, owner: &str, target_timeline_id: &str) -> NodeResult<()> {
        if let Some(existing) = repo::semantic_ids::find(&self.pool, name, owner)
            .await
            .map_err(to_node_error)?
        {
            let target_missing = repo::timelines::find(&self.pool, &existing.target_timeline_id)
                .await
                .map_err(to_node_error)?
                .is_none();
            if target_missing {
                repo::semantic_ids::delete(&self.pool, name, owner)
                    .await
                    .map_err(to_node_error)?;
            } else if existing.target_timeline_id != target_timeline_id {
                return Err(NodeError::NotAuthorized(format!(
                    "semantic id {name} already bound to a different timeline"
                )));
            }
        }
        repo::semantic_ids::upsert(
            &self.pool,
            &SemanticId {
                name: name.to_owned(),
                owner: owner.to_owned(),
                target_timeline_id: target_timeline_id.to_owned(),
            },
        )
        .await
        .map_err(to_node_error)
    }

    /// `GetTimeline` (supplemented): local lookup; a remote host falls
    /// back to interpreting `id` as a semantic name on that host before
    /// treating it as a literal CDID.
    pub async fn get_timeline(&self, raw: &str) -> NodeResult<Timeline> {
        let normalized = self.normalize_timeline_id(raw).await?;
        let (id, host) = normalized
            .rsplit_once('@')
            .expect("normalize_timeline_id always returns an id@host pair");
        if host == self.config.fqdn {
            return repo::timelines::find(&self.pool, id)
                .await
                .map_err(to_node_error)?
                .ok_or_else(|| NodeError::NotFound(format!("timeline {normalized}")));
        }
        Err(NodeError::RemoteNotSupported)
    }

    /// `DeleteTimeline`: only the author may delete. Items belonging to the
    /// timeline are left in place; readers filter them out lazily once the
    /// timeline row is gone (SPEC_FULL §4.4).
    pub async fn delete_timeline(&self, id: &str, requester: &str) -> NodeResult<()> {
        let timeline = repo::timelines::find(&self.pool, id)
            .await
            .map_err(to_node_error)?
            .ok_or_else(|| NodeError::NotFound(format!("timeline {id}")))?;
        if timeline.author != requester {
            warn!(requester = %requester, timeline = %id, reason = "not timeline author", "delete rejected");
            return Err(NodeError::NotAuthorized("not timeline author".to_owned()));
        }
        repo::timelines::delete(&self.pool, id).await.map_err(to_node_error)?;
        Ok(())
    }

    /// Removes every `TimelineItem` row referencing `resource_id` (a
    /// message or association id). Called by the object services on
    /// delete, per the `TimelineItem` lifecycle in SPEC_FULL §3.
    pub async fn delete_items_for_resource(&self, resource_id: &str) -> NodeResult<()> {
        self.repo.delete_by_resource(resource_id).await
    }

    /// `ListTimelineSubscriptions` (supplemented): sourced from the live
    /// subscription manager state, not a DB table.
    pub async fn list_subscriptions(&self, ccid: &str) -> Vec<String> {
        self.subscriptions.subscriptions_for_ccid(ccid).await
    }

    /// Backs `POST /timelines/chunks`: the exact `Time2Chunk(pivot)` bucket
    /// for each of `timelines`, for the timelines this node hosts. A
    /// caller asking about a timeline hosted elsewhere gets nothing back
    /// for it -- the peer serving that chunk is the one to ask.
    pub async fn get_chunks(
        &self,
        timelines: &[String],
        pivot: DateTime<Utc>,
    ) -> NodeResult<HashMap<String, Vec<TimelineItem>>> {
        let normalized = self.normalize_all(timelines).await?;
        let local: Vec<String> = normalized
            .into_iter()
            .filter(|t| t.ends_with(&format!("@{}", self.config.fqdn)))
            .collect();
        let chunk = cdid::time_to_chunk(pivot);
        self.repo.get_chunks_from_db(&local, &chunk).await
    }
}

/// First occurrence (by iteration order, which callers have already sorted
/// into the desired precedence) wins per `resource_id`; truncates to
/// `limit` afterward.
fn dedupe_and_truncate(items: Vec<TimelineItem>, limit: usize) -> Vec<TimelineItem> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.resource_id.clone()) {
            out.push(item);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(resource_id: &str, created_at: DateTime<Utc>) -> TimelineItem {
        TimelineItem {
            timeline_id: "tA".to_owned(),
            resource_id: resource_id.to_owned(),
            owner: "conOwner".to_owned(),
            author: None,
            created_at,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_respects_limit() {
        let now = Utc::now();
        let items = vec![
            item("mA", now),
            item("mB", now),
            item("mA", now), // duplicate, should be dropped
        ];
        let result = dedupe_and_truncate(items, 10);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].resource_id, "mA");
        assert_eq!(result[1].resource_id, "mB");
    }

    #[test]
    fn dedupe_truncates_to_limit() {
        let now = Utc::now();
        let items = vec![item("mA", now), item("mB", now), item("mC", now)];
        let result = dedupe_and_truncate(items, 2);
        assert_eq!(result.len(), 2);
    }
}
