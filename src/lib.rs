//! CEP Weather API Library
//!
//! Resolves a Brazilian postal code (CEP) to a location through BrasilAPI and
//! reports the current temperature there through WeatherAPI, in Celsius,
//! Fahrenheit and Kelvin.
//!
//! # Modules
//!
//! - `api`: API-layer namespace (handlers, router).
//! - `domain`: Domain-layer namespace (models, use cases, errors).
//! - `integrations`: Upstream-facing namespace (services, HTTP client, telemetry).
//! - `app`: Router, middleware and OpenAPI document.
//! - `cep`: CEP sanitation.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `http_client`: Shared outbound HTTP client.
//! - `models`: Domain and wire models.
//! - `services`: BrasilAPI and WeatherAPI clients.
//! - `telemetry`: Spans, trace context and collectors.
//! - `usecases`: Orchestration between handlers and services.

pub mod api;
pub mod domain;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod app;
pub mod cep;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod http_client;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod usecases;
