use crate::errors::AppError;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("cep-weather-api/", env!("CARGO_PKG_VERSION"));

/// Outbound request timeout. Not configurable.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the outbound HTTP client shared by every upstream integration.
///
/// One instance lives for the whole process; `reqwest::Client` pools
/// connections internally and is safe to clone across requests.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Client with the standard 30 second timeout.
pub fn default_client() -> Result<reqwest::Client, AppError> {
    build_client(REQUEST_TIMEOUT)
}
