//! `GET /api/v1/healthz`, `GET /api/v1/readyz` (SPEC_FULL §AMBIENT.4):
//! carried forward from the teacher unchanged except `readyz` additionally
//! checks the DB pool and the Redis connection.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if sqlx::query("SELECT 1").execute(&state.pool).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response();
    }
    match state.redis.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            let pong: Result<String, redis::RedisError> = redis::cmd("PING").query_async(&mut conn).await;
            if pong.is_err() {
                return (StatusCode::SERVICE_UNAVAILABLE, "redis unavailable").into_response();
            }
        }
        Err(_) => return (StatusCode::SERVICE_UNAVAILABLE, "redis unavailable").into_response(),
    }
    "ok".into_response()
}
