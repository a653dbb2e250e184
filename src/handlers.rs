use crate::cep::sanitize_cep;
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::http_client::default_client;
use crate::models::{CepRequest, LocationRequest, WeatherQuery, WeatherResponse};
use crate::services::{BrasilApiService, WeatherApiService};
use crate::telemetry::{Span, TraceContext, Tracer};
use crate::usecases::{LocateByCep, WeatherByLocation};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Span factory handed down the call chain.
    pub tracer: Tracer,
    /// CEP → address use case.
    pub locate_by_cep: LocateByCep,
    /// Location → current weather use case.
    pub weather_by_location: WeatherByLocation,
}

impl AppState {
    /// Wires the upstream services from configuration.
    ///
    /// A single `reqwest::Client` is shared by both upstreams.
    pub fn new(config: Config, tracer: Tracer) -> Result<Self, AppError> {
        let client = default_client()?;

        let locate_by_cep = LocateByCep::new(BrasilApiService::new(
            client.clone(),
            config.brasil_api_base_url.clone(),
        ));
        let weather_by_location = WeatherByLocation::new(
            config.weather_api_key.clone(),
            WeatherApiService::new(client, config.weather_api_base_url.clone()),
        );

        Ok(Self {
            config,
            tracer,
            locate_by_cep,
            weather_by_location,
        })
    }
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /cep
///
/// Resolves the CEP to an address, then returns the current temperature for
/// it. The address lookup must succeed before the weather API is called.
#[utoipa::path(
    post,
    path = "/cep",
    tag = "weather",
    request_body = CepRequest,
    responses(
        (status = 200, description = "Current temperature at the CEP", body = WeatherResponse),
        (status = 404, description = "CEP not found upstream (relayed)"),
        (status = 422, description = "Invalid zipcode or unusable upstream response"),
        (status = 500, description = "Weather API key not configured")
    )
)]
pub async fn weather_by_cep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CepRequest>, JsonRejection>,
) -> Result<Json<WeatherResponse>, AppError> {
    let remote = TraceContext::from_headers(&headers);
    let request_span = state.tracer.start(remote.as_ref(), "cep_request");

    let cep = {
        let mut span = request_span.child("validate_zipcode");
        span.event("extract POST body", &[]);
        let Json(request) = payload.map_err(|e| {
            span.event("error on decode body", &[("error", json!(e.body_text()))]);
            AppError::Validation("cant decode zipcode".to_string())
        })?;

        span.event("sanitize zipcode", &[("zipcode", json!(request.cep))]);
        let cep = sanitize_cep(&request.cep).inspect_err(|e| {
            span.event("error on validate zipcode", &[("error", json!(e.to_string()))]);
        })?;
        span.event("sanitized zipcode", &[("zipcode", json!(cep))]);
        cep
    };
    tracing::info!("POST /cep - zipcode: {}", cep);

    let address = {
        let mut span = request_span.child("zipcode_search");
        span.event("search location by zipcode", &[]);
        let result = state.locate_by_cep.execute(&span, &cep).await;
        if let Err(ref e) = result {
            span.event("error on search location", &[("error", json!(e.to_string()))]);
        }
        result.with_context(|| format!("zipcode search for {}", cep))?
    };

    let weather = {
        let mut span = request_span.child("weather_search");
        let query = WeatherQuery::from(&address);
        span.event("search weather by location", &[("location", json!(query.location()))]);
        let result = state.weather_by_location.execute(&span, &query).await;
        if let Err(ref e) = result {
            span.event("error on search weather", &[("error", json!(e.to_string()))]);
        }
        result.context("weather search")?
    };

    let response = WeatherResponse::new(address.city, weather.temperature);
    respond(&request_span, response)
}

/// POST /weather
///
/// Current temperature for coordinates, or for city/state when coordinates
/// are missing.
#[utoipa::path(
    post,
    path = "/weather",
    tag = "weather",
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Current temperature at the location", body = WeatherResponse),
        (status = 422, description = "Undecodable body or unusable upstream response"),
        (status = 500, description = "Weather API key not configured")
    )
)]
pub async fn weather_by_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<Json<WeatherResponse>, AppError> {
    let payload = payload.map(|Json(request)| request).map_err(|e| e.body_text());
    location_weather(&state, &headers, payload).await
}

/// GET /weather
///
/// Same as `POST /weather` with the location in the query string.
#[utoipa::path(
    get,
    path = "/weather",
    tag = "weather",
    params(LocationRequest),
    responses(
        (status = 200, description = "Current temperature at the location", body = WeatherResponse),
        (status = 422, description = "Undecodable query or unusable upstream response"),
        (status = 500, description = "Weather API key not configured")
    )
)]
pub async fn weather_by_location_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    params: Result<Query<LocationRequest>, QueryRejection>,
) -> Result<Json<WeatherResponse>, AppError> {
    let payload = params
        .map(|Query(request)| request)
        .map_err(|e| e.body_text());
    location_weather(&state, &headers, payload).await
}

async fn location_weather(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<LocationRequest, String>,
) -> Result<Json<WeatherResponse>, AppError> {
    let remote = TraceContext::from_headers(headers);
    let request_span = state.tracer.start(remote.as_ref(), "weather_request");

    let request = {
        let mut span = request_span.child("validate_location");
        span.event("extract location", &[]);
        let request = payload.map_err(|error| {
            span.event("error on decode body", &[("error", json!(error))]);
            AppError::Validation("cant decode location".to_string())
        })?;
        span.event(
            "location data",
            &[
                ("latitude", json!(request.latitude)),
                ("longitude", json!(request.longitude)),
                ("city", json!(request.city)),
                ("state", json!(request.state)),
            ],
        );
        request
    };
    let query = WeatherQuery::from(&request);
    tracing::info!("/weather - location: {}", query.location());

    let weather = {
        let mut span = request_span.child("weather_search");
        let result = state.weather_by_location.execute(&span, &query).await;
        if let Err(ref e) = result {
            span.event("error on search weather", &[("error", json!(e.to_string()))]);
        }
        result?
    };

    // Prefer the caller's own city name over the upstream's spelling
    let city = if query.city.is_empty() {
        weather.city
    } else {
        query.city
    };
    respond(&request_span, WeatherResponse::new(city, weather.temperature))
}

fn respond(parent: &Span, response: WeatherResponse) -> Result<Json<WeatherResponse>, AppError> {
    let mut span = parent.child("weather_response");
    span.event(
        "response success",
        &[
            ("city", json!(response.city)),
            ("temp_C", json!(response.temp_c)),
            ("temp_F", json!(response.temp_f)),
            ("temp_K", json!(response.temp_k)),
        ],
    );
    tracing::info!(
        "✓ {}: {:.2}°C / {:.2}°F / {:.2}K",
        response.city,
        response.temp_c,
        response.temp_f,
        response.temp_k
    );
    Ok(Json(response))
}
