//! `GET /api/v1/associations/:id`.

use axum::{extract::{Path, State}, response::IntoResponse, Json};

use crate::http::response::{node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn get_association(State(state): State<AppState>, Path(id): Path<String>) -> HttpResponse {
    match state.associations.find(&id).await {
        Ok(association) => Json(association).into_response(),
        Err(err) => node_error_response(err),
    }
}
