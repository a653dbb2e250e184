//! Orchestration between the handlers and the upstream services.

use crate::errors::AppError;
use crate::models::{AddressRecord, WeatherQuery, WeatherResult};
use crate::services::{BrasilApiService, WeatherApiService};
use crate::telemetry::Span;
use serde_json::json;

/// Resolves a sanitized CEP to an address and coordinates.
#[derive(Debug, Clone)]
pub struct LocateByCep {
    service: BrasilApiService,
}

impl LocateByCep {
    pub fn new(service: BrasilApiService) -> Self {
        Self { service }
    }

    pub async fn execute(&self, parent: &Span, cep: &str) -> Result<AddressRecord, AppError> {
        let mut span = parent.child("service_search_zipcode");
        span.event("zipcode to search", &[("zipcode", json!(cep))]);

        span.event("try search", &[]);
        let result = self.service.search(&span, cep).await;
        match result {
            Ok(address) => {
                span.event(
                    "search success",
                    &[
                        ("latitude", json!(address.latitude)),
                        ("longitude", json!(address.longitude)),
                    ],
                );
                Ok(address)
            }
            Err(e) => {
                span.event("error on search", &[("error", json!(e.to_string()))]);
                Err(e)
            }
        }
    }
}

/// Fetches current weather for a location, owning the API key.
#[derive(Clone)]
pub struct WeatherByLocation {
    api_key: String,
    service: WeatherApiService,
}

impl WeatherByLocation {
    pub fn new(api_key: impl Into<String>, service: WeatherApiService) -> Self {
        Self {
            api_key: api_key.into(),
            service,
        }
    }

    pub async fn execute(
        &self,
        parent: &Span,
        query: &WeatherQuery,
    ) -> Result<WeatherResult, AppError> {
        let mut span = parent.child("service_search_weather");

        if self.api_key.is_empty() {
            span.event("key[WEATHER_API_KEY] not found", &[]);
            return Err(AppError::Configuration(
                "weather API key [WEATHER_API_KEY] not found".to_string(),
            ));
        }

        span.event(
            "weather input",
            &[
                ("latitude", json!(query.latitude)),
                ("longitude", json!(query.longitude)),
                ("city", json!(query.city)),
                ("state", json!(query.state)),
            ],
        );

        let location = query.location();

        span.event("try search", &[("location", json!(location))]);
        let result = self.service.search(&span, &self.api_key, &location).await;
        match result {
            Ok(weather) => {
                span.event(
                    "search success",
                    &[
                        ("temp_C", json!(weather.temperature.celsius())),
                        ("temp_F", json!(weather.temperature.fahrenheit())),
                        ("temp_K", json!(weather.temperature.kelvin())),
                    ],
                );
                Ok(weather)
            }
            Err(e) => {
                span.event("error on search", &[("error", json!(e.to_string()))]);
                Err(e)
            }
        }
    }
}

// The API key must never reach the logs
impl std::fmt::Debug for WeatherByLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherByLocation")
            .field("api_key", &"[REDACTED]")
            .field("service", &self.service)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{RecordingCollector, Tracer};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        // Nothing listens on port 9; a request attempt would surface as
        // UpstreamUnavailable rather than Configuration.
        let service = WeatherApiService::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let use_case = WeatherByLocation::new("", service);

        let collector = Arc::new(RecordingCollector::new());
        let tracer = Tracer::new("test", collector.clone());
        let root = tracer.start(None, "root");

        let query = WeatherQuery {
            city: "São Paulo".into(),
            state: "SP".into(),
            ..Default::default()
        };
        let result = use_case.execute(&root, &query).await;
        drop(root);

        assert!(matches!(result, Err(AppError::Configuration(_))));
        let span = collector.find("service_search_weather").unwrap();
        assert!(span.has_event("key[WEATHER_API_KEY] not found"));
        assert!(collector.find("service_weatherapi_request").is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let service = WeatherApiService::new(reqwest::Client::new(), "http://localhost");
        let use_case = WeatherByLocation::new("super-secret", service);
        let rendered = format!("{:?}", use_case);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
