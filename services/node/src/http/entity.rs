//! `GET /api/v1/entity/:ccid`.

use axum::{extract::{Path, State}, response::IntoResponse, Json};

use crate::http::response::{node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn get_entity(State(state): State<AppState>, Path(ccid): Path<String>) -> HttpResponse {
    match state.domains.get_entity(&ccid, None).await {
        Ok(entity) => Json(entity).into_response(),
        Err(err) => node_error_response(err),
    }
}
