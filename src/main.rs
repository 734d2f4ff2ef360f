use anyhow::{Context, Result};
use axum::{extract::FromRef, Router};
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;
use crate::supabase::SupabaseClient;

// Declare modules
mod auth_middleware;
mod campaigns;
mod config;
mod error;
mod filters;
mod financing;
mod forms;
mod models;
mod routes;
mod supabase;

// Shared state handed to every handler and extractor
#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    // Owns the shared HTTP client
    pub backend: SupabaseClient,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, http_client: Arc<Client>) -> Self {
        let backend = SupabaseClient::new(http_client, Arc::clone(&settings));
        AppState { settings, backend }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "dealership_rust=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing dealership server...");

    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    if settings.supabase_jwt_secret.is_empty() {
        tracing::warn!("APP_SUPABASE_JWT_SECRET is not set; admin routes will reject every request.");
    }
    let shared_settings = Arc::new(settings);

    let http_client = Arc::new(
        Client::builder()
            .user_agent(concat!("dealership_rust/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build shared reqwest client")?,
    );
    tracing::info!("Shared HTTP client created for {}", shared_settings.supabase_url);

    let app_state = AppState::new(Arc::clone(&shared_settings), http_client);

    let app: Router = routes::create_router(app_state)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = shared_settings.server_address.parse().map_err(|e| {
        tracing::error!(
            "Invalid server address format in configuration ('{}'): {}",
            shared_settings.server_address,
            e
        );
        anyhow::anyhow!("Invalid server address format: {}", shared_settings.server_address)
    })?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
