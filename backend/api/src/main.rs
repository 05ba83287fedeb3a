//! Freelance-marketplace lifecycle API — entry point.
//!
//! Exposes the contract & milestone lifecycle engine over an Axum REST API
//! backed by SQLite. Identity resolution and binary deliverable storage are
//! external collaborators reached over HTTP; the audit trail is written
//! best-effort off the request path.

mod admin;
mod api;
mod audit;
mod auth;
mod config;
mod db;
mod errors;
mod storage;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by the identity and file-storage collaborators.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let api_port = config.api_port;
    let state = Arc::new(api::ApiState {
        pool,
        client,
        config,
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route(
            "/contracts",
            post(api::create_contract).get(api::list_contracts),
        )
        .route("/contracts/:id", get(api::get_contract))
        .route(
            "/contracts/:id/payment-details",
            post(api::set_payment_details),
        )
        .route("/contracts/:id/milestones", post(api::add_milestone))
        .route(
            "/contracts/:id/milestones/:mid",
            axum::routing::patch(api::edit_milestone).delete(api::delete_milestone),
        )
        .route(
            "/contracts/:id/milestones/:mid/submit",
            post(api::submit_milestone),
        )
        .route(
            "/contracts/:id/milestones/:mid/release",
            post(api::release_milestone),
        )
        .route(
            "/contracts/:id/milestones/:mid/deliver",
            post(api::deliver_milestone),
        )
        .route("/contracts/:id/dispute", post(api::dispute_contract))
        .route("/contracts/:id/complete", post(api::complete_contract))
        .route("/contracts/:id/terminate", post(api::terminate_contract))
        .route("/admin/disputes", get(admin::list_disputes))
        .route("/admin/disputes/:id/resolve", post(admin::resolve_dispute))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{api_port}");
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
