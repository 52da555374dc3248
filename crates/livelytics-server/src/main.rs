use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use livelytics_aggregator::{Aggregator, Broadcaster, ClickHouseStore};
use livelytics_server::app::build_app;
use livelytics_server::state::AppState;

/// `livelytics health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$LIVELYTICS_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("LIVELYTICS_PORT").unwrap_or_else(|_| "4000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Health-check subcommand — handled before tokio does any real work
    // so the binary stays cheap as a Docker HEALTHCHECK probe.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Initialise structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livelytics=info".parse()?),
        )
        .json()
        .init();

    let cfg = livelytics_core::config::Config::from_env()?;

    // Log a warning (not panic) if the GeoIP database is absent — visits
    // are aggregated without country breakdowns until one is provided.
    if !std::path::Path::new(&cfg.geoip_path).exists() {
        tracing::warn!(
            geoip_path = %cfg.geoip_path,
            "GeoIP database not found. Visits aggregate with empty country fields. \
             Set LIVELYTICS_GEOIP_PATH to a MaxMind country database to enable geography."
        );
    }

    // The durable visit log. Read-only here: the aggregator preloads its
    // state from it at startup and queries it for the hourly series. If
    // it is unreachable the aggregator degrades to live traffic only.
    let store = Arc::new(ClickHouseStore::new(
        &cfg.store_url,
        &cfg.store_user,
        &cfg.store_password,
        &cfg.store_database,
    ));

    let broadcaster = Broadcaster::new();
    let aggregator = Aggregator::start(store, broadcaster.clone());

    let state = Arc::new(AppState::new(aggregator, broadcaster, cfg.clone()));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = build_app(Arc::clone(&state));

    info!(port = cfg.port, "Livelytics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    // Aggregation state is ephemeral by design — nothing to flush.
    state.aggregator.stop().await;
    info!("Livelytics shut down");
    Ok(())
}
