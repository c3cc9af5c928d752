use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Coordinate, FetchError, Metric, Reading,
    http::RetryingHttpClient,
    provider::{ProviderAdapter, ProviderId},
};

const BASE_URL: &str = "https://my.meteoblue.com/packages/basic-1h_package";

#[derive(Debug, Clone)]
pub struct MeteoBlueProvider {
    api_key: String,
    http: RetryingHttpClient,
    base_url: String,
}

impl MeteoBlueProvider {
    pub fn new(api_key: String, http: RetryingHttpClient) -> Self {
        Self::with_base_url(api_key, http, BASE_URL)
    }

    pub fn with_base_url(
        api_key: String,
        http: RetryingHttpClient,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key,
            http,
            base_url: base_url.into(),
        }
    }

    fn params(&self, coordinate: Coordinate) -> Result<Vec<(&'static str, String)>, FetchError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(FetchError::configuration("MeteoBlue API key is not configured"));
        }

        Ok(vec![
            ("lat", coordinate.latitude.to_string()),
            ("lon", coordinate.longitude.to_string()),
            ("apikey", api_key.to_string()),
            ("format", "json".to_string()),
            ("timeformat", "timestamp_utc".to_string()),
            ("windspeed", "ms-1".to_string()),
        ])
    }
}

/// Hourly series, one column per variable, aligned by index with `time`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MbHourly {
    time: Vec<Value>,
    temperature: Vec<Option<f64>>,
    #[serde(alias = "felttemperature")]
    feels_like: Vec<Option<f64>>,
    #[serde(alias = "relativehumidity")]
    relative_humidity: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    #[serde(alias = "windspeed")]
    wind_speed: Vec<Option<f64>>,
    #[serde(alias = "winddirection")]
    wind_direction: Vec<Option<f64>>,
    #[serde(alias = "sealevelpressure")]
    pressure_msl: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MbResponse {
    error: Option<bool>,
    error_message: Option<String>,
    data_1h: Option<MbHourly>,
}

/// Unix seconds, or `YYYY-MM-DD HH:MM` read as UTC.
fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)),
        Value::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .ok()
            .map(|naive| naive.and_utc()),
        _ => None,
    }
}

fn at(column: &[Option<f64>], index: usize) -> Option<f64> {
    column.get(index).copied().flatten()
}

fn to_reading(parsed: MbResponse, now: DateTime<Utc>) -> Result<Reading, FetchError> {
    if parsed.error == Some(true) || parsed.error_message.is_some() {
        return Err(FetchError::unparseable(format!(
            "MeteoBlue reported an error: {}",
            parsed.error_message.as_deref().unwrap_or("no message")
        )));
    }

    let hourly = parsed
        .data_1h
        .filter(|hourly| !hourly.time.is_empty())
        .ok_or_else(|| FetchError::unparseable("MeteoBlue response has no hourly data"))?;

    let times: Vec<_> = hourly.time.iter().map(parse_time).collect();

    // The package is a forecast: take the latest hour that is not in the
    // future, or the last entry when no hour qualifies.
    let index = times
        .iter()
        .copied()
        .rposition(|time| time.is_some_and(|time| time <= now))
        .unwrap_or(times.len() - 1);
    let observed_at = times[index].unwrap_or(now);

    Ok(Reading::new(ProviderId::MeteoBlue, observed_at)
        .with(Metric::Temperature, at(&hourly.temperature, index))
        .with(Metric::FeelsLike, at(&hourly.feels_like, index))
        .with(Metric::Humidity, at(&hourly.relative_humidity, index))
        .with(Metric::Pressure, at(&hourly.pressure_msl, index))
        .with(Metric::WindSpeed, at(&hourly.wind_speed, index))
        .with(Metric::WindDirection, at(&hourly.wind_direction, index))
        .with(Metric::Precipitation, at(&hourly.precipitation, index)))
}

#[async_trait]
impl ProviderAdapter for MeteoBlueProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MeteoBlue
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError> {
        let params = self.params(coordinate)?;

        let parsed: MbResponse = self.http.fetch_json(&self.base_url, &params, None).await?;

        to_reading(parsed, Utc::now())
    }
}
