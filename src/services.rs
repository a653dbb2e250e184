use crate::errors::AppError;
use crate::models::{AddressRecord, Temperature, WeatherResult};
use crate::telemetry::{Span, TRACEPARENT_HEADER};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Instrument;

/// Client for the BrasilAPI CEP v2 endpoint.
#[derive(Debug, Clone)]
pub struct BrasilApiService {
    client: Client,
    base_url: String,
}

impl BrasilApiService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Looks up the address of an already sanitized CEP. Single attempt.
    pub async fn search(&self, parent: &Span, cep: &str) -> Result<AddressRecord, AppError> {
        let mut span = parent.child("service_brasilapi_request");
        let url = format!("{}/api/cep/v2/{}", self.base_url, cep);

        span.event("zipcode to search", &[("zipcode", json!(cep))]);
        tracing::info!("Fetching address for CEP {} from BrasilAPI", cep);

        let result = self
            .client
            .get(&url)
            .header(TRACEPARENT_HEADER, span.context().traceparent())
            .send()
            .instrument(span.tracing_span().clone())
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                span.event("error on search", &[("error", json!(e.to_string()))]);
                return Err(AppError::UpstreamUnavailable(format!(
                    "BrasilAPI request failed: {}",
                    e
                )));
            }
        };

        let status = response.status();
        span.event("read response", &[("status", json!(status.as_u16()))]);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                span.event("error on read response", &[("error", json!(e.to_string()))]);
                return Err(AppError::UpstreamUnavailable(format!(
                    "Failed to read BrasilAPI response: {}",
                    e
                )));
            }
        };

        if !status.is_success() {
            span.event("response error", &[("error", json!(body))]);
            tracing::warn!("BrasilAPI returned {} for CEP {}", status, cep);
            return Err(AppError::UpstreamRejected {
                service: "BrasilAPI",
                status: status.as_u16(),
                body,
            });
        }

        span.event("parse response", &[]);
        let address = parse_address(&body).inspect_err(|e| {
            span.event("error on parse response", &[("error", json!(e.to_string()))]);
        })?;

        span.event(
            "response success",
            &[
                ("latitude", json!(address.latitude)),
                ("longitude", json!(address.longitude)),
            ],
        );
        tracing::info!("✓ CEP {} resolved to {}/{}", cep, address.city, address.state);
        Ok(address)
    }
}

/// Maps a BrasilAPI CEP v2 body into an [`AddressRecord`].
///
/// Only the document itself must be valid JSON; any field that is missing or
/// not a string becomes an empty string.
pub fn parse_address(body: &str) -> Result<AddressRecord, AppError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| AppError::Decode(format!("Failed to parse BrasilAPI response: {}", e)))?;

    let text = |pointer: &str| -> String {
        data.pointer(pointer)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Ok(AddressRecord {
        street: text("/street"),
        neighborhood: text("/neighborhood"),
        state: text("/state"),
        city: text("/city"),
        latitude: text("/location/coordinates/latitude"),
        longitude: text("/location/coordinates/longitude"),
    })
}

/// Client for the WeatherAPI `current.json` endpoint.
#[derive(Debug, Clone)]
pub struct WeatherApiService {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    #[serde(default)]
    location: Option<WaLocation>,
    current: WaCurrent,
}

impl WeatherApiService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches current conditions for `location` ("lat,long" or "city,state").
    ///
    /// An empty `api_key` fails before any request is sent.
    pub async fn search(
        &self,
        parent: &Span,
        api_key: &str,
        location: &str,
    ) -> Result<WeatherResult, AppError> {
        let mut span = parent.child("service_weatherapi_request");

        if api_key.is_empty() {
            span.event("key[WEATHER_API_KEY] not found", &[]);
            return Err(AppError::Configuration(
                "weather API key [WEATHER_API_KEY] not provided".to_string(),
            ));
        }

        // Query values are percent-encoded
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/current.json", self.base_url),
            &[("key", api_key), ("q", location)],
        )
        .map_err(|e| AppError::Configuration(format!("Failed to build WeatherAPI URL: {}", e)))?;

        span.event("location to search", &[("location", json!(location))]);
        tracing::info!("Fetching current weather for '{}'", location);
        // Key redacted
        tracing::debug!(
            "WeatherAPI URL: {}/v1/current.json?key=[REDACTED]&q={}",
            self.base_url,
            location
        );

        let result = self
            .client
            .get(url)
            .header(TRACEPARENT_HEADER, span.context().traceparent())
            .send()
            .instrument(span.tracing_span().clone())
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                // reqwest embeds the URL, key included, in its error text
                let error = e.without_url().to_string();
                span.event("error on search", &[("error", json!(error))]);
                return Err(AppError::UpstreamUnavailable(format!(
                    "WeatherAPI request failed: {}",
                    error
                )));
            }
        };

        let status = response.status();
        span.event("read response", &[("status", json!(status.as_u16()))]);
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let error = e.without_url().to_string();
                span.event("error on read response", &[("error", json!(error))]);
                return Err(AppError::UpstreamUnavailable(format!(
                    "Failed to read WeatherAPI response: {}",
                    error
                )));
            }
        };

        if !status.is_success() {
            span.event(
                "response error",
                &[("status", json!(status.as_u16())), ("error", json!(body))],
            );
            tracing::warn!("WeatherAPI returned {} for '{}'", status, location);
            return Err(AppError::UpstreamRejected {
                service: "WeatherAPI",
                status: status.as_u16(),
                body,
            });
        }

        span.event("parse response", &[]);
        let weather = parse_current_weather(&body).inspect_err(|e| {
            span.event("error on parse response", &[("error", json!(e.to_string()))]);
        })?;

        span.event(
            "response success",
            &[
                ("temp_C", json!(weather.temperature.celsius())),
                ("temp_F", json!(weather.temperature.fahrenheit())),
                ("temp_K", json!(weather.temperature.kelvin())),
            ],
        );
        Ok(weather)
    }
}

/// Maps a WeatherAPI `current.json` body into a [`WeatherResult`].
///
/// `current.temp_c` is required; Fahrenheit and Kelvin are always derived
/// from it, never read from the upstream.
pub fn parse_current_weather(body: &str) -> Result<WeatherResult, AppError> {
    let parsed: WaResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Decode(format!("Failed to parse WeatherAPI response: {}", e)))?;

    Ok(WeatherResult {
        city: parsed
            .location
            .and_then(|l| l.name)
            .unwrap_or_default(),
        temperature: Temperature::from_celsius(parsed.current.temp_c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{RecordingCollector, Tracer};
    use std::sync::Arc;

    #[test]
    fn test_parse_full_address() {
        let body = r#"{
            "cep": "01001000",
            "state": "SP",
            "city": "São Paulo",
            "neighborhood": "Sé",
            "street": "Praça da Sé",
            "service": "open-cep",
            "location": {
                "type": "Point",
                "coordinates": {"longitude": "-46.6339", "latitude": "-23.5503"}
            }
        }"#;
        let address = parse_address(body).unwrap();

        assert_eq!(address.street, "Praça da Sé");
        assert_eq!(address.neighborhood, "Sé");
        assert_eq!(address.state, "SP");
        assert_eq!(address.city, "São Paulo");
        assert_eq!(address.latitude, "-23.5503");
        assert_eq!(address.longitude, "-46.6339");
    }

    #[test]
    fn test_parse_address_without_coordinates() {
        let body = r#"{
            "cep": "01001000", "state": "SP", "city": "São Paulo",
            "neighborhood": null, "street": "Praça da Sé",
            "location": {"type": "Point", "coordinates": {}}
        }"#;
        let address = parse_address(body).unwrap();

        assert_eq!(address.neighborhood, "");
        assert_eq!(address.latitude, "");
        assert_eq!(address.longitude, "");
        assert_eq!(address.city, "São Paulo");
    }

    #[test]
    fn test_parse_address_numeric_coordinates_are_ignored() {
        let body = r#"{"city": "Recife", "location": {"coordinates": {"latitude": -8.05, "longitude": -34.9}}}"#;
        let address = parse_address(body).unwrap();
        assert_eq!(address.latitude, "");
        assert_eq!(address.longitude, "");
    }

    #[test]
    fn test_parse_address_rejects_non_json() {
        assert!(matches!(
            parse_address("<html>oops</html>"),
            Err(AppError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_current_weather() {
        let body = r#"{
            "location": {"name": "Sao Paulo", "region": "Sao Paulo", "country": "Brazil"},
            "current": {"temp_c": 25.0, "temp_f": 77.0, "condition": {"text": "Sunny"}}
        }"#;
        let weather = parse_current_weather(body).unwrap();

        assert_eq!(weather.city, "Sao Paulo");
        assert_eq!(weather.temperature.celsius(), 25.0);
        assert_eq!(weather.temperature, Temperature::from_celsius(25.0));
    }

    #[test]
    fn test_parse_current_weather_derives_instead_of_reading() {
        // Upstream temp_f disagrees with temp_c; ours must not
        let body = r#"{"current": {"temp_c": -3.5, "temp_f": 100.0}}"#;
        let weather = parse_current_weather(body).unwrap();

        assert_eq!(weather.city, "");
        assert_eq!(weather.temperature.fahrenheit(), -3.5 * 1.8 + 32.0);
        assert_eq!(weather.temperature.kelvin(), -3.5 + 273.15);
    }

    #[test]
    fn test_parse_current_weather_requires_temperature() {
        assert!(matches!(
            parse_current_weather(r#"{"current": {}}"#),
            Err(AppError::Decode(_))
        ));
        assert!(matches!(
            parse_current_weather("not json"),
            Err(AppError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_never_exposes_api_key() {
        // Nothing listens on port 9
        let service = WeatherApiService::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let collector = Arc::new(RecordingCollector::new());
        let tracer = Tracer::new("test", collector.clone());

        let root = tracer.start(None, "root");
        let result = service.search(&root, "secret-key-123", "-23.55,-46.63").await;
        drop(root);

        let error = result.unwrap_err();
        assert!(matches!(error, AppError::UpstreamUnavailable(_)));
        assert!(!error.to_string().contains("secret-key-123"));

        let span = collector.find("service_weatherapi_request").unwrap();
        let recorded = serde_json::to_string(&span).unwrap();
        assert!(span.has_event("error on search"));
        assert!(!recorded.contains("secret-key-123"));
    }
}
