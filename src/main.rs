//! venue-payments server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and the
//! background optimization tasks.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use venue_payments::api;
use venue_payments::app_state::AppState;
use venue_payments::config::{CoreConfig, GatewayMode};
use venue_payments::optimization::{run_event_listener, run_load_sampler};
use venue_payments::payment::{GatewayClient, HttpGatewayClient, IdempotencyStore, SimulatedGateway};
use venue_payments::persistence::postgres::PostgresIdempotencyStore;
use venue_payments::ws::handler::ws_handler;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = CoreConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting venue-payments");

    let gateway: Arc<dyn GatewayClient> = match config.gateway.mode {
        GatewayMode::Http => {
            tracing::info!(base_url = %config.gateway.base_url, "using HTTP payment gateway");
            Arc::new(HttpGatewayClient::new(
                config.gateway.base_url.clone(),
                config.gateway.api_key.clone(),
                config.gateway.timeout,
            )?)
        }
        GatewayMode::Simulated => {
            tracing::warn!("using simulated payment gateway");
            Arc::new(SimulatedGateway::new())
        }
    };

    let app_state = if config.persistence_enabled {
        let store = Arc::new(
            PostgresIdempotencyStore::connect(
                &config.database_url,
                config.database_max_connections,
                Duration::from_secs(config.database_connect_timeout_secs),
            )
            .await?,
        );
        tracing::info!("idempotency records persisted to PostgreSQL");
        spawn_purge(Arc::clone(&store));
        AppState::new(&config, gateway, store as Arc<dyn IdempotencyStore>)
    } else {
        AppState::in_memory(&config, gateway)
    };

    tokio::spawn(run_event_listener(
        Arc::clone(&app_state.optimization),
        app_state.event_bus.subscribe(),
    ));
    tokio::spawn(run_load_sampler(
        Arc::clone(&app_state.optimization),
        Arc::clone(&app_state.load_monitor),
        Arc::clone(&app_state.tracker),
        config.optimization.sample_interval,
    ));

    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// `LOG_FORMAT=json` switches to structured JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn spawn_purge(store: Arc<PostgresIdempotencyStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "purged expired idempotency records"),
                Err(err) => tracing::warn!(error = %err, "idempotency purge failed"),
            }
        }
    });
}
