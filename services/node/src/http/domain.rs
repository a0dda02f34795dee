//! `GET /api/v1/domain`, `GET /api/v1/domain/:fqdn`.

use axum::{extract::{Path, State}, response::IntoResponse, Json};

use crate::http::response::{node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn list_domains(State(state): State<AppState>) -> HttpResponse {
    match state.domains.list().await {
        Ok(domains) => Json(domains).into_response(),
        Err(err) => node_error_response(err),
    }
}

pub async fn get_domain(State(state): State<AppState>, Path(fqdn): Path<String>) -> HttpResponse {
    match state.domains.get_domain(&fqdn).await {
        Ok(domain) => Json(domain).into_response(),
        Err(err) => node_error_response(err),
    }
}
