use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    Coordinate, FetchError, Metric, Reading,
    http::RetryingHttpClient,
    provider::{ProviderAdapter, ProviderId},
};

const BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
precipitation,surface_pressure,wind_speed_10m,wind_direction_10m";

/// Open-Meteo current conditions. Free, no API key.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: RetryingHttpClient,
    base_url: String,
}

impl OpenMeteoProvider {
    pub fn new(http: RetryingHttpClient) -> Self {
        Self::with_base_url(http, BASE_URL)
    }

    pub fn with_base_url(http: RetryingHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn params(coordinate: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", coordinate.latitude.to_string()),
            ("longitude", coordinate.longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("wind_speed_unit", "ms".to_string()),
            ("timeformat", "unixtime".to_string()),
            ("timezone", "UTC".to_string()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OmCurrent {
    time: Option<i64>,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    precipitation: Option<f64>,
    surface_pressure: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OmResponse {
    error: bool,
    reason: Option<String>,
    current: Option<OmCurrent>,
}

fn to_reading(parsed: OmResponse) -> Result<Reading, FetchError> {
    if parsed.error {
        return Err(FetchError::unparseable(format!(
            "Open-Meteo reported an error: {}",
            parsed.reason.as_deref().unwrap_or("no reason given")
        )));
    }

    let current = parsed.current.unwrap_or_default();
    let observed_at = current
        .time
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    Ok(Reading::new(ProviderId::OpenMeteo, observed_at)
        .with(Metric::Temperature, current.temperature_2m)
        .with(Metric::FeelsLike, current.apparent_temperature)
        .with(Metric::Humidity, current.relative_humidity_2m)
        .with(Metric::Pressure, current.surface_pressure)
        .with(Metric::WindSpeed, current.wind_speed_10m)
        .with(Metric::WindDirection, current.wind_direction_10m)
        .with(Metric::Precipitation, current.precipitation))
}

#[async_trait]
impl ProviderAdapter for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError> {
        let parsed: OmResponse = self
            .http
            .fetch_json(&self.base_url, &Self::params(coordinate), None)
            .await?;

        to_reading(parsed)
    }
}
