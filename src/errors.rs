use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::fmt;

/// Application-specific error types.
///
/// Every variant is terminal for the request that produced it; nothing in the
/// call chain retries.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Malformed inbound input (undecodable body, invalid zipcode).
    Validation(String),
    /// Required runtime configuration is missing (e.g. the weather API key).
    Configuration(String),
    /// An external API could not be reached.
    UpstreamUnavailable(String),
    /// An external API answered with a non-2xx status.
    UpstreamRejected {
        /// Name of the upstream, for diagnostics only.
        service: &'static str,
        /// Status code returned by the upstream.
        status: u16,
        /// Raw response body returned by the upstream.
        body: String,
    },
    /// An external API answered 2xx with a body we could not interpret.
    Decode(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// HTTP status this error is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "{}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            AppError::UpstreamRejected {
                service,
                status,
                body,
            } => write!(f, "{} returned {}: {}", service, status, body),
            AppError::Decode(msg) => write!(f, "Decode error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into a plain-text HTTP response.
    ///
    /// Upstream rejections are relayed verbatim: the upstream status code and
    /// body become ours. Everything else gets a short message.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Validation(msg) => {
                tracing::debug!("Rejected input: {}", msg);
                msg.clone()
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                "service misconfigured".to_string()
            }
            AppError::UpstreamUnavailable(msg) => {
                tracing::error!("Upstream unavailable: {}", msg);
                "cant get data".to_string()
            }
            AppError::UpstreamRejected {
                service,
                status,
                body,
            } => {
                tracing::warn!("{} rejected request with {}: {}", service, status, body);
                body.clone()
            }
            AppError::Decode(msg) => {
                tracing::error!("Decode error: {}", msg);
                "cant parse data".to_string()
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.clone().into_response();
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("invalid zipcode".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::UpstreamUnavailable("timeout".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Decode("bad json".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Configuration("missing key".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_status_is_relayed() {
        let err = AppError::UpstreamRejected {
            service: "WeatherAPI",
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let bogus = AppError::UpstreamRejected {
            service: "WeatherAPI",
            status: 42,
            body: String::new(),
        };
        assert_eq!(bogus.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_context_keeps_source_status() {
        let result: Result<(), AppError> = Err(AppError::UpstreamRejected {
            service: "BrasilAPI",
            status: 404,
            body: "not found".into(),
        });
        let err = result.context("zipcode search").unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(matches!(err.root(), AppError::UpstreamRejected { .. }));
        assert_eq!(
            err.to_string(),
            "zipcode search: BrasilAPI returned 404: not found"
        );
    }
}
