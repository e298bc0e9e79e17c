//! X402 facilitator HTTP entrypoint.
//!
//! Launches an Axum server exposing payment verification and settlement:
//! - `GET /health` – liveness probe
//! - `POST /verify` – verify a payment payload against requirements
//! - `POST /settle` – settle a verified payment on the ledger
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `LEDGER_RPC_URL` points at the ledger node
//! - `RUST_LOG` controls tracing output

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use pay402::config::Config;
use pay402::facilitator_local::FacilitatorLocal;
use pay402::handlers;
use pay402::ledger_rpc::JsonRpcLedger;
use pay402::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    telemetry::init();

    let config = Config::load().unwrap_or_else(|e| e.exit());

    let ledger = JsonRpcLedger::try_new(
        config.ledger_rpc_url.clone(),
        config.ledger_rpc_timeout(),
    )?;
    let facilitator = FacilitatorLocal::new(ledger);
    let axum_state = Arc::new(facilitator);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(network = %config.network, "Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, stopping server");
}
