// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers. Every endpoint is a read of on-disk state.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::DashState;

/// Default and upper bound for `/api/messages?limit=N`.
const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 1000;

pub fn build_router(state: Arc<DashState>) -> Router {
    Router::new()
        .route("/api/agents", get(agents))
        .route("/api/messages", get(messages))
        .route("/api/locks", get(locks))
        .route("/api/stats", get(stats))
        .route("/api/stream", get(stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn agents(State(state): State<Arc<DashState>>) -> impl IntoResponse {
    Json(state.agents_snapshot())
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

async fn messages(
    State(state): State<Arc<DashState>>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).min(MAX_MESSAGE_LIMIT);
    match state.messages_snapshot(limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn locks(State(state): State<Arc<DashState>>) -> impl IntoResponse {
    match state.locks_snapshot() {
        Ok(views) => Json(views).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn stats(State(state): State<Arc<DashState>>) -> impl IntoResponse {
    match state.stats_snapshot() {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Server-sent events: named `agents`, `messages`, `locks`, `stats` events
/// when the backing files change, plus periodic `heartbeat`s.
async fn stream(
    State(state): State<Arc<DashState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|event| {
        event.ok().map(|event| Ok(Event::default().event(event.kind).data(event.data)))
    });
    Sse::new(stream)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
