/// Open-Meteo forecast API client
///
/// Retrieves hourly precipitation, precipitation probability, and WMO
/// weather codes for a location, covering the previous day and the current
/// day in the location's timezone.
///
/// API Documentation: https://open-meteo.com/en/docs

use reqwest::Url;
use serde::Deserialize;

use crate::ingest::http_cache::CachedHttpClient;
use crate::model::{HourlyPoint, HourlySeries, Location, PipelineError};

/// Hourly variables requested, in the order the series is assembled from.
pub const HOURLY_FIELDS: [&str; 3] = ["precipitation", "precipitation_probability", "weather_code"];

// ============================================================================
// Source trait
// ============================================================================

/// Anything that can produce an hourly series for a location.
pub trait WeatherSource {
    fn fetch_series(&self, location: &Location) -> Result<HourlySeries, PipelineError>;
}

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub hourly: HourlyBlock,
}

/// Column-oriented hourly data; all arrays are aligned by index.
#[derive(Debug, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    pub precipitation: Vec<Option<f64>>,
    pub precipitation_probability: Vec<Option<f64>>,
    pub weather_code: Vec<Option<f64>>,
}

// ============================================================================
// Client
// ============================================================================

pub struct OpenMeteoSource {
    http: CachedHttpClient,
    base_url: String,
}

impl OpenMeteoSource {
    pub fn new(http: CachedHttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }
}

impl WeatherSource for OpenMeteoSource {
    fn fetch_series(&self, location: &Location) -> Result<HourlySeries, PipelineError> {
        let unavailable = |status: Option<u16>, reason: String| PipelineError::SourceUnavailable {
            location: location.label(),
            status,
            reason,
        };

        let url = build_forecast_url(&self.base_url, location).map_err(|e| unavailable(None, e))?;
        let body = self.http.get_text(&url).map_err(|failure| {
            unavailable(failure.last_error.status(), failure.to_string())
        })?;

        parse_forecast_response(&body).map_err(|e| unavailable(None, e))
    }
}

/// Build the forecast request for a location: one past day, one forecast day.
///
/// The full URL (including query) is also the cache signature.
pub fn build_forecast_url(base_url: &str, location: &Location) -> Result<Url, String> {
    let latitude = location.latitude.to_string();
    let longitude = location.longitude.to_string();
    let hourly = HOURLY_FIELDS.join(",");

    Url::parse_with_params(
        base_url,
        &[
            ("latitude", latitude.as_str()),
            ("longitude", longitude.as_str()),
            ("hourly", hourly.as_str()),
            ("timezone", location.timezone.as_str()),
            ("past_days", "1"),
            ("forecast_days", "1"),
        ],
    )
    .map_err(|e| format!("Invalid weather URL '{}': {}", base_url, e))
}

/// Decode a forecast body into an hourly series.
///
/// Missing values (`null`) become 0.0 / code 0. Arrays of different lengths
/// mean the response cannot be aligned and are rejected.
pub fn parse_forecast_response(body: &str) -> Result<HourlySeries, String> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|e| format!("Parse error: {}", e))?;
    let hourly = response.hourly;

    let len = hourly.precipitation.len();
    if hourly.precipitation_probability.len() != len || hourly.weather_code.len() != len {
        return Err(format!(
            "Parse error: misaligned hourly arrays (precipitation={}, probability={}, weather_code={})",
            len,
            hourly.precipitation_probability.len(),
            hourly.weather_code.len()
        ));
    }

    let points = hourly
        .precipitation
        .iter()
        .zip(&hourly.precipitation_probability)
        .zip(&hourly.weather_code)
        .map(|((precip, prob), code)| {
            HourlyPoint::new(
                precip.unwrap_or(0.0),
                prob.unwrap_or(0.0),
                code.map(|c| c.round() as i32).unwrap_or(0),
            )
        })
        .collect();

    Ok(HourlySeries {
        times: hourly.time,
        points,
    })
}

// ============================================================================
// Tests
// ============================================================================
