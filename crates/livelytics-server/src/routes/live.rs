use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use livelytics_aggregator::broadcast::DashboardUpdate;
use livelytics_aggregator::topn::Dimension;
use livelytics_aggregator::Window;

use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/live/overview` — the dashboard's initial-load handshake:
/// full stats snapshot plus the recent-visitors and activity panels.
pub async fn overview(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let overview = state
        .aggregator
        .overview()
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(overview).into_response())
}

/// `GET /api/live/stats` — the stats snapshot alone, same shape as the
/// streamed `stats_update`.
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let snapshot = state
        .aggregator
        .snapshot()
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(snapshot).into_response())
}

/// `GET /api/live/hourly` — per-minute series for the trailing hour from
/// the in-memory buffer. The store-backed authoritative series arrives
/// over the stream instead.
pub async fn hourly(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let series = state
        .aggregator
        .hourly_histogram()
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(json!({ "hourly_traffic": series })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VisitorsParams {
    pub window: Option<String>,
}

/// `GET /api/live/visitors?window=30m` — unique sessions within one
/// trailing window (`1m`, `30m`, `1h`, `6h`, `12h`, `24h`).
pub async fn visitors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VisitorsParams>,
) -> Result<Response, AppError> {
    let raw = params.window.unwrap_or_else(|| "30m".to_string());
    let window = Window::parse(&raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "window must be one of: 1m, 30m, 1h, 6h, 12h, 24h (got {raw})"
        ))
    })?;
    let count = state
        .aggregator
        .window_count(window)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(json!({ "window": raw, "count": count })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TopParams {
    pub limit: Option<usize>,
}

/// `GET /api/live/top/{dimension}` — a ranked breakdown for one of:
/// `pages`, `countries`, `referrers`, `bots`, `os`, `browsers`.
pub async fn top(
    State(state): State<Arc<AppState>>,
    Path(dimension): Path<String>,
    Query(params): Query<TopParams>,
) -> Result<Response, AppError> {
    let dimension = Dimension::parse(&dimension).ok_or_else(|| {
        AppError::BadRequest(format!(
            "dimension must be one of: pages, countries, referrers, bots, os, browsers \
             (got {dimension})"
        ))
    })?;
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let breakdown = state
        .aggregator
        .top_breakdown(dimension, limit)
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(breakdown).into_response())
}

/// `GET /api/live/ws` — WebSocket upgrade for the dashboard stream.
///
/// Every aggregator broadcast is forwarded as a text frame:
/// `{"event": "new_visit" | "stats_update" | "hourly_traffic_update",
///   "data": <payload>}`.
pub async fn stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let rx = state.broadcaster.subscribe();
    ws.on_upgrade(move |socket| forward_updates(socket, rx))
}

async fn forward_updates(
    mut socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<DashboardUpdate>,
) {
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    let frame = json!({
                        "event": update.event_name(),
                        "data": update.payload(),
                    });
                    if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow client: it skips ahead and the next stats tick
                    // brings it back in sync.
                    debug!(skipped, "dashboard client lagged behind the broadcast stream");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Ignore client chatter; the transport answers pings itself.
                Some(Ok(_)) => {}
                // Client closed or errored.
                _ => break,
            },
        }
    }
}
