use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// ============ Domain Models ============

/// Address resolved from a CEP by the address lookup API.
///
/// Every field defaults to an empty string when the upstream omits it.
/// Coordinates are kept exactly as the upstream sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Street name (logradouro).
    pub street: String,
    /// Neighborhood (bairro).
    pub neighborhood: String,
    /// State abbreviation (UF), e.g. "SP".
    pub state: String,
    /// City name.
    pub city: String,
    /// Latitude, as the upstream represents it.
    pub latitude: String,
    /// Longitude, as the upstream represents it.
    pub longitude: String,
}

/// Location descriptor handed to the weather lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherQuery {
    pub latitude: String,
    pub longitude: String,
    pub city: String,
    pub state: String,
}

impl WeatherQuery {
    /// Location string sent to the weather API.
    ///
    /// Coordinates win when both are present; otherwise the lowercased
    /// `city,state` pair is used, even if that leaves the query empty.
    pub fn location(&self) -> String {
        if !self.latitude.is_empty() && !self.longitude.is_empty() {
            format!("{},{}", self.latitude, self.longitude)
        } else {
            format!("{},{}", self.city, self.state).to_lowercase()
        }
    }
}

impl From<&AddressRecord> for WeatherQuery {
    fn from(address: &AddressRecord) -> Self {
        Self {
            latitude: address.latitude.clone(),
            longitude: address.longitude.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
        }
    }
}

impl From<&LocationRequest> for WeatherQuery {
    fn from(request: &LocationRequest) -> Self {
        Self {
            latitude: request.latitude.trim().to_string(),
            longitude: request.longitude.trim().to_string(),
            city: request.city.trim().to_string(),
            state: request.state.trim().to_string(),
        }
    }
}

/// A temperature in the three supported scales.
///
/// Only constructible from Celsius so the derived scales always agree with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    celsius: f64,
    fahrenheit: f64,
    kelvin: f64,
}

impl Temperature {
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: celsius * 1.8 + 32.0,
            kelvin: celsius + 273.15,
        }
    }

    pub fn celsius(&self) -> f64 {
        self.celsius
    }

    pub fn fahrenheit(&self) -> f64 {
        self.fahrenheit
    }

    pub fn kelvin(&self) -> f64 {
        self.kelvin
    }
}

/// Current conditions returned by the weather lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherResult {
    /// Location name as reported by the weather API (may be empty).
    pub city: String,
    pub temperature: Temperature,
}

// ============ API Request/Response Models ============

/// Body of `POST /cep`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CepRequest {
    /// Postal code; punctuation is ignored, 8 digits must remain.
    #[schema(example = "01001-000")]
    pub cep: String,
}

/// Body of `POST /weather`, or query string of `GET /weather`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(default)]
pub struct LocationRequest {
    #[schema(example = "-23.5505")]
    pub latitude: String,
    #[schema(example = "-46.6333")]
    pub longitude: String,
    #[schema(example = "São Paulo")]
    pub city: String,
    #[schema(example = "SP")]
    pub state: String,
}

/// Successful response of every weather endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherResponse {
    pub city: String,
    #[serde(rename = "temp_C")]
    pub temp_c: f64,
    #[serde(rename = "temp_F")]
    pub temp_f: f64,
    #[serde(rename = "temp_K")]
    pub temp_k: f64,
}

impl WeatherResponse {
    pub fn new(city: impl Into<String>, temperature: Temperature) -> Self {
        Self {
            city: city.into(),
            temp_c: temperature.celsius(),
            temp_f: temperature.fahrenheit(),
            temp_k: temperature.kelvin(),
        }
    }
}
