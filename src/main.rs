//! OAI-PMH Explore Backend
//!
//! Searches records harvested from OAI-PMH registries and manages which
//! registries a saved explore query federates over.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod search;
mod sources;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use config::Config;
use db::Repository;

/// Path all service routes are mounted under.
pub const ROUTE_PREFIX: &str = "/explore/oaipmh";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Starting OAI-PMH Explore Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Pagination backend: {:?}", config.pagination);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!(
            "No API PSK configured (EXPLORE_OAIPMH_API_PSK). Authentication is disabled!"
        );
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let registries = repo.list_registries(true).await?;
    tracing::info!("{} activated registries available", registries.len());

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    let explore_routes = Router::new()
        // Query execution
        .route(
            "/rest/execute-query",
            post(api::execute_query_post).get(api::execute_query_get),
        )
        .route("/rest/result", get(api::get_result))
        // Saved-query data sources
        .route("/get_data_sources", get(api::get_data_sources))
        .route("/update_data_sources", get(api::update_data_sources))
        // Record detail page
        .route("/data", get(api::data_detail))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest(ROUTE_PREFIX, explore_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
