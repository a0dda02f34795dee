//! Application state: wires every service together in the fixed
//! topological order Design Notes §9 calls for (Timeline, then Message,
//! then Association, then Ack) so no service ever needs a cyclic
//! constructor reference to a collaborator that isn't built yet.

use core_model::{AllowAllPolicy, Config, NoopSignatureVerifier, PolicyClient, SignatureVerifier};
use federation_client::PeerClient;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cache_bus::{Bus, ChunkCache};

use crate::services::ack_service::AckService;
use crate::services::association_service::AssociationService;
use crate::services::domain_directory::DomainDirectory;
use crate::services::message_service::MessageService;
use crate::services::timeline_repo::TimelineRepo;
use crate::services::timeline_service::TimelineService;
use crate::socket::manager::SubscriptionManager;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: redis::Client,
    pub domains: Arc<DomainDirectory>,
    pub timeline_repo: TimelineRepo,
    pub subscriptions: SubscriptionManager,
    pub timelines: TimelineService,
    pub messages: MessageService,
    pub associations: AssociationService,
    pub acks: AckService,
    next_conn_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, redis: redis::Client) -> Self {
        let peer = PeerClient::with_transport(config.peer_insecure_transport);
        let policy: Arc<dyn PolicyClient> = Arc::new(AllowAllPolicy);
        let verifier: Arc<dyn SignatureVerifier> = Arc::new(NoopSignatureVerifier);

        let domains = Arc::new(DomainDirectory::new(pool.clone(), peer.clone(), config.clone()));

        let cache = ChunkCache::new(redis.clone());
        let bus = Bus::new(redis.clone());
        let timeline_repo = TimelineRepo::new(pool.clone(), cache.clone(), bus, peer.clone());
        let subscriptions = SubscriptionManager::new(timeline_repo.clone(), cache, peer.clone());

        let timelines = TimelineService::new(
            pool.clone(),
            config.clone(),
            timeline_repo.clone(),
            domains.clone(),
            policy.clone(),
            subscriptions.clone(),
        );
        let messages = MessageService::new(
            pool.clone(),
            config.clone(),
            timelines.clone(),
            peer.clone(),
            verifier.clone(),
        );
        let associations = AssociationService::new(
            pool.clone(),
            config.clone(),
            timelines.clone(),
            messages.clone(),
            peer.clone(),
            verifier.clone(),
        );
        let acks = AckService::new(pool.clone(), config.clone(), domains.clone(), peer.clone());

        Self {
            pool,
            config,
            redis,
            domains,
            timeline_repo,
            subscriptions,
            timelines,
            messages,
            associations,
            acks,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}
