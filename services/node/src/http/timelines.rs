//! `GET /api/v1/timelines/:id`, `GET /api/v1/timelines/recent`,
//! `POST /api/v1/timelines/chunks`, `GET /api/v1/timelines/subscriptions`
//! (SPEC_FULL §6).

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use core_model::TimelineItem;
use serde::Deserialize;
use std::collections::HashMap;

use crate::http::response::{bad_request, node_error_response, HttpResponse};
use crate::state::AppState;

pub async fn get_timeline(State(state): State<AppState>, Path(id): Path<String>) -> HttpResponse {
    match state.timelines.get_timeline(&id).await {
        Ok(timeline) => Json(timeline).into_response(),
        Err(err) => node_error_response(err),
    }
}

#[derive(Deserialize)]
pub struct RecentQuery {
    timelines: String,
    until: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn get_recent(State(state): State<AppState>, Query(query): Query<RecentQuery>) -> HttpResponse {
    let timelines: Vec<String> = query.timelines.split(',').map(str::to_owned).collect();
    let until = query.until.unwrap_or_else(Utc::now);
    let limit = query.limit.unwrap_or(50);
    match state.timelines.get_recent_items(&timelines, until, limit).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => node_error_response(err),
    }
}

#[derive(Deserialize)]
pub struct ImmediateQuery {
    timelines: String,
    since: DateTime<Utc>,
    limit: Option<usize>,
}

pub async fn get_immediate(State(state): State<AppState>, Query(query): Query<ImmediateQuery>) -> HttpResponse {
    let timelines: Vec<String> = query.timelines.split(',').map(str::to_owned).collect();
    let limit = query.limit.unwrap_or(50);
    match state.timelines.get_immediate_items(&timelines, query.since, limit).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => node_error_response(err),
    }
}

#[derive(Deserialize)]
pub struct ChunksRequest {
    timelines: Vec<String>,
    time: DateTime<Utc>,
}

#[derive(serde::Serialize)]
struct ChunksResponseEntry {
    items: Vec<TimelineItem>,
}

pub async fn post_chunks(State(state): State<AppState>, Json(body): Json<ChunksRequest>) -> HttpResponse {
    if body.timelines.is_empty() {
        return bad_request("timelines must not be empty");
    }
    match state.timelines.get_chunks(&body.timelines, body.time).await {
        Ok(by_timeline) => {
            let response: HashMap<String, ChunksResponseEntry> = by_timeline
                .into_iter()
                .map(|(timeline, items)| (timeline, ChunksResponseEntry { items }))
                .collect();
            Json(response).into_response()
        }
        Err(err) => node_error_response(err),
    }
}

#[derive(Deserialize)]
pub struct SubscriptionsQuery {
    ccid: String,
}

pub async fn get_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionsQuery>,
) -> HttpResponse {
    let subscriptions = state.timelines.list_subscriptions(&query.ccid).await;
    Json(subscriptions).into_response()
}
