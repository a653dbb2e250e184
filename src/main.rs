use cep_weather_api::app::build_router;
use cep_weather_api::config::Config;
use cep_weather_api::handlers::AppState;
use cep_weather_api::http_client::default_client;
use cep_weather_api::telemetry::Tracer;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Span collector.
/// - External API clients.
/// - HTTP routes and middleware.
///
/// It then starts the Axum server. Missing required configuration aborts
/// before the listener is bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cep_weather_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Span export uses its own client so collector slowness never shares a
    // pool with the upstream APIs
    let tracer = Tracer::from_endpoint(
        config.service_name.clone(),
        config.collector_endpoint.as_deref(),
        default_client()?,
    );
    tracing::info!("Tracer initialized for service {}", tracer.service());

    let port = config.port;
    let app_state = Arc::new(AppState::new(config, tracer)?);
    tracing::info!("✓ Upstream clients initialized");

    let app = build_router(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
