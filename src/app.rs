use crate::handlers::{self, AppState};
use crate::models::{CepRequest, LocationRequest, WeatherResponse};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Inbound bodies are a handful of short strings.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CEP Weather API",
        description = "Current temperature for a Brazilian postal code or a location"
    ),
    paths(
        handlers::health,
        handlers::weather_by_cep,
        handlers::weather_by_location,
        handlers::weather_by_location_query,
    ),
    components(schemas(CepRequest, LocationRequest, WeatherResponse)),
    tags(
        (name = "weather", description = "Temperature lookups"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Builds the full application router: API routes, docs and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/cep", post(handlers::weather_by_cep))
        .route(
            "/weather",
            get(handlers::weather_by_location_query).post(handlers::weather_by_location),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(state)
        // API Documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        assert!(paths.iter().any(|p| p.as_str() == "/cep"));
        assert!(paths.iter().any(|p| p.as_str() == "/weather"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }

    #[test]
    fn test_openapi_exposes_wire_names() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("temp_C"));
        assert!(json.contains("temp_F"));
        assert!(json.contains("temp_K"));
    }
}
