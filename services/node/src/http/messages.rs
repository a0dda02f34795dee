//! `GET /api/v1/messages/:id`.

use axum::{extract::{Path, State}, response::IntoResponse, Json};

use crate::http::response::{node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn get_message(State(state): State<AppState>, Path(id): Path<String>) -> HttpResponse {
    match state.messages.find(&id).await {
        Ok(message) => Json(message).into_response(),
        Err(err) => node_error_response(err),
    }
}
