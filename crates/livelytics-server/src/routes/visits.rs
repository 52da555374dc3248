use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use livelytics_core::visit::{now_ms, VisitEvent};

use crate::classifier::{classify_agent, lookup_country};
use crate::state::AppState;

/// The beacon payload the tracking snippet posts on each page view.
/// Everything else on the event — IP, agent classification, country —
/// is resolved server-side from the request itself.
#[derive(Debug, Deserialize)]
pub struct VisitPayload {
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub session_id: Option<String>,
    /// Milliseconds since the Unix epoch; defaults to receipt time.
    pub timestamp: Option<i64>,
}

/// `POST /api/visits` — ingest one page view.
///
/// ## Auth
/// None. The beacon is embedded on the public site.
///
/// ## Enrichment
/// - client IP from `X-Forwarded-For` (first entry), `"unknown"` otherwise
/// - `browser`/`os`/`device`/`bot` via `woothee`
/// - `country` via `maxminddb` (empty if the .mmdb is absent)
///
/// ## Response
/// `202 Accepted` with `{ "ok": true }`. Ingestion is fire-and-forget into
/// the aggregator actor; the response never waits on aggregation, and
/// missing optional fields degrade to defaults rather than rejecting.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<VisitPayload>,
) -> impl IntoResponse {
    let ip = extract_client_ip(&headers);

    let agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let classification = classify_agent(&agent);
    let country = lookup_country(&state.config.geoip_path, &ip);

    let event = VisitEvent {
        path: payload.path.unwrap_or_default(),
        agent,
        ip,
        country,
        referer: payload.referrer.unwrap_or_default(),
        session_id: payload.session_id.unwrap_or_default(),
        timestamp: payload.timestamp.unwrap_or_else(now_ms),
        browser: classification.browser,
        os: classification.os,
        device: classification.device,
        bot: classification.bot,
    };

    state.aggregator.ingest(event);

    (axum::http::StatusCode::ACCEPTED, Json(json!({ "ok": true })))
}

/// Extract the real client IP from `X-Forwarded-For` (first entry).
/// Falls back to `"unknown"` when the header is absent.
fn extract_client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
