use serde::Deserialize;

pub const DEFAULT_BRASIL_API_BASE_URL: &str = "https://brasilapi.com.br";
pub const DEFAULT_WEATHER_API_BASE_URL: &str = "http://api.weatherapi.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub service_name: String,
    /// May be empty; the weather use case rejects requests until it is set.
    pub weather_api_key: String,
    pub brasil_api_base_url: String,
    pub weather_api_base_url: String,
    pub collector_endpoint: Option<String>, // Optional, spans are dropped without it
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a closure over a map instead of
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            port: lookup("PORT")
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("server port [PORT] not configured yet"))?
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            service_name: lookup("SERVICE_NAME")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| anyhow::anyhow!("service name [SERVICE_NAME] not configured yet"))?,
            weather_api_key: lookup("WEATHER_API_KEY")
                .map(|key| key.trim().to_string())
                .unwrap_or_default(),
            brasil_api_base_url: base_url(
                &lookup,
                "BRASIL_API_BASE_URL",
                DEFAULT_BRASIL_API_BASE_URL,
            )?,
            weather_api_base_url: base_url(
                &lookup,
                "WEATHER_API_BASE_URL",
                DEFAULT_WEATHER_API_BASE_URL,
            )?,
            collector_endpoint: lookup("COLLECTOR_ENDPOINT")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(|endpoint| {
                    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                        endpoint
                    } else {
                        // Bare host:port, the collector listens on plain HTTP
                        format!("http://{}", endpoint)
                    }
                }),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Service name: {}", config.service_name);
        tracing::debug!("BrasilAPI Base URL: {}", config.brasil_api_base_url);
        tracing::debug!("WeatherAPI Base URL: {}", config.weather_api_base_url);
        if config.weather_api_key.is_empty() {
            tracing::warn!("WEATHER_API_KEY not set, weather lookups will be rejected");
        }
        match config.collector_endpoint {
            Some(ref endpoint) => tracing::info!("Span collector configured: {}", endpoint),
            None => tracing::info!("COLLECTOR_ENDPOINT not set, span export disabled"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn base_url<F>(lookup: &F, key: &str, default: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let url = match lookup(key) {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => return Ok(default.to_string()),
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("PORT", "8080"), ("SERVICE_NAME", "svc-a")]))
                .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.service_name, "svc-a");
        assert_eq!(config.weather_api_key, "");
        assert_eq!(config.brasil_api_base_url, DEFAULT_BRASIL_API_BASE_URL);
        assert_eq!(config.weather_api_base_url, DEFAULT_WEATHER_API_BASE_URL);
        assert!(config.collector_endpoint.is_none());
    }

    #[test]
    fn test_missing_port_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[("SERVICE_NAME", "svc-a")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let result =
            Config::from_lookup(lookup_from(&[("PORT", "http"), ("SERVICE_NAME", "svc-a")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_service_name_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "8080"), ("SERVICE_NAME", "  ")]))
            .unwrap_err();
        assert!(err.to_string().contains("SERVICE_NAME"));
    }

    #[test]
    fn test_overrides_and_collector_scheme() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("SERVICE_NAME", "svc-b"),
            ("WEATHER_API_KEY", " abc123 "),
            ("BRASIL_API_BASE_URL", "http://localhost:9001/"),
            ("WEATHER_API_BASE_URL", "http://localhost:9002"),
            ("COLLECTOR_ENDPOINT", "otel-collector:4318"),
        ]))
        .unwrap();

        assert_eq!(config.weather_api_key, "abc123");
        assert_eq!(config.brasil_api_base_url, "http://localhost:9001");
        assert_eq!(config.weather_api_base_url, "http://localhost:9002");
        assert_eq!(
            config.collector_endpoint.as_deref(),
            Some("http://otel-collector:4318")
        );
    }

    #[test]
    fn test_base_url_requires_scheme() {
        let result = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("SERVICE_NAME", "svc-a"),
            ("WEATHER_API_BASE_URL", "api.weatherapi.com"),
        ]));
        assert!(result.is_err());
    }
}
