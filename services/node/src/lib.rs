pub mod db;
pub mod db_err;
pub mod http;
pub mod repo;
pub mod services;
pub mod socket;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::health::healthz))
        .route("/readyz", get(http::health::readyz))
        .route("/api/v1/commit", post(http::commit::post_commit))
        .route("/api/v1/messages/{id}", get(http::messages::get_message))
        .route(
            "/api/v1/associations/{id}",
            get(http::associations::get_association),
        )
        .route("/api/v1/timelines/recent", get(http::timelines::get_recent))
        .route("/api/v1/timelines/immediate", get(http::timelines::get_immediate))
        .route("/api/v1/timelines/chunks", post(http::timelines::post_chunks))
        .route(
            "/api/v1/timelines/subscriptions",
            get(http::timelines::get_subscriptions),
        )
        .route("/api/v1/timelines/realtime", get(socket::peer::peer_realtime_handler))
        .route("/api/v1/timelines/{id}", get(http::timelines::get_timeline))
        .route("/api/v1/socket", get(socket::client::client_socket_handler))
        .route("/api/v1/domain", get(http::domain::list_domains))
        .route("/api/v1/domain/{fqdn}", get(http::domain::get_domain))
        .route("/api/v1/entity/{ccid}", get(http::entity::get_entity))
        .with_state(state)
}
