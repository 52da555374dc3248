use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use livelytics_aggregator::{Aggregator, Broadcaster, SessionStamp, VisitStore};
use livelytics_core::config::Config;
use livelytics_core::visit::VisitEvent;
use livelytics_server::app::build_app;
use livelytics_server::state::AppState;

struct EmptyStore;

#[async_trait]
impl VisitStore for EmptyStore {
    async fn visits_last_hour(&self) -> anyhow::Result<Vec<VisitEvent>> {
        Ok(Vec::new())
    }

    async fn session_activity_last_hour(&self) -> anyhow::Result<Vec<SessionStamp>> {
        Ok(Vec::new())
    }
}

fn test_config() -> Config {
    Config {
        port: 0,
        store_url: "http://localhost:8123".to_string(),
        store_user: "default".to_string(),
        store_password: String::new(),
        store_database: "livelytics_test".to_string(),
        geoip_path: "/nonexistent/GeoLite2-City.mmdb".to_string(),
        cors_origins: vec![],
    }
}

fn setup() -> (Aggregator, axum::Router) {
    let broadcaster = Broadcaster::new();
    let aggregator = Aggregator::start(Arc::new(EmptyStore), broadcaster.clone());
    let state = Arc::new(AppState::new(
        aggregator.clone(),
        broadcaster,
        test_config(),
    ));
    (aggregator, build_app(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

fn visit(path: &str, session: &str) -> VisitEvent {
    VisitEvent {
        path: path.to_string(),
        session_id: session.to_string(),
        ..VisitEvent::default()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let (_aggregator, app) = setup();
    let response = app.oneshot(get("/health")).await.expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn overview_combines_stats_and_panels() {
    let (aggregator, app) = setup();
    for i in 0..25 {
        aggregator.ingest(visit("/menu", &format!("s{i}")));
    }

    let response = app
        .oneshot(get("/api/live/overview"))
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    // Stats fields are flattened at the top level.
    assert_eq!(body["last_hour_count"], 25);
    assert_eq!(body["top_pages"][0]["path"], "/menu");
    // Panels are capped at their dashboard sizes.
    assert_eq!(body["recent_visitors"].as_array().map(Vec::len), Some(20));
    assert_eq!(body["activity_buffer"].as_array().map(Vec::len), Some(25));
}

#[tokio::test]
async fn visitors_defaults_to_the_half_hour_window() {
    let (aggregator, app) = setup();
    aggregator.ingest(visit("/", "s1"));

    let body = json_body(
        app.oneshot(get("/api/live/visitors"))
            .await
            .expect("send request"),
    )
    .await;
    assert_eq!(body["window"], "30m");
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn visitors_rejects_unknown_windows() {
    let (_aggregator, app) = setup();
    let response = app
        .oneshot(get("/api/live/visitors?window=2h"))
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn top_breakdown_uses_dimension_labels() {
    let (aggregator, app) = setup();
    aggregator.ingest(VisitEvent {
        country: "IT".to_string(),
        ..visit("/menu", "s1")
    });

    let body = json_body(
        app.clone()
            .oneshot(get("/api/live/top/countries"))
            .await
            .expect("send request"),
    )
    .await;
    assert_eq!(body[0]["country"], "IT");

    let body = json_body(
        app.oneshot(get("/api/live/top/pages?limit=5"))
            .await
            .expect("send request"),
    )
    .await;
    assert_eq!(body[0]["path"], "/menu");
}

#[tokio::test]
async fn top_breakdown_rejects_unknown_dimensions() {
    let (_aggregator, app) = setup();
    let response = app
        .oneshot(get("/api/live/top/planets"))
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hourly_series_is_always_sixty_buckets() {
    let (aggregator, app) = setup();
    aggregator.ingest(visit("/", "s1"));

    let body = json_body(
        app.oneshot(get("/api/live/hourly"))
            .await
            .expect("send request"),
    )
    .await;
    let series = body["hourly_traffic"].as_array().expect("series array");
    assert_eq!(series.len(), 60);
    assert_eq!(series[0], 1);
}
