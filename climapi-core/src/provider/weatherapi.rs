use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    Coordinate, FetchError, Metric, Reading,
    http::RetryingHttpClient,
    provider::{ProviderAdapter, ProviderId},
};

const BASE_URL: &str = "https://api.weatherapi.com/v1/current.json";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: RetryingHttpClient,
    base_url: String,
}

impl WeatherApiProvider {
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
            return Err(FetchError::configuration("WeatherAPI.com API key is not configured"));
        }

        Ok(vec![
            ("key", api_key.to_string()),
            ("q", format!("{},{}", coordinate.latitude, coordinate.longitude)),
        ])
    }
}

#[derive(Debug, Deserialize)]
struct WaError {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    humidity: Option<f64>,
    pressure_mb: Option<f64>,
    wind_kph: Option<f64>,
    wind_degree: Option<f64>,
    precip_mm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaResponse {
    error: Option<WaError>,
    current: Option<WaCurrent>,
}

fn to_reading(parsed: WaResponse) -> Result<Reading, FetchError> {
    if let Some(err) = parsed.error {
        return Err(FetchError::unparseable(format!(
            "WeatherAPI.com reported error {}: {}",
            err.code.map_or_else(|| "?".to_string(), |code| code.to_string()),
            err.message.as_deref().unwrap_or("no message")
        )));
    }

    let current = parsed.current.unwrap_or_default();
    let observed_at = current
        .last_updated_epoch
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    // km/h -> m/s
    let wind_speed = current.wind_kph.map(|kph| kph / 3.6);

    Ok(Reading::new(ProviderId::WeatherApi, observed_at)
        .with(Metric::Temperature, current.temp_c)
        .with(Metric::FeelsLike, current.feelslike_c)
        .with(Metric::Humidity, current.humidity)
        .with(Metric::Pressure, current.pressure_mb)
        .with(Metric::WindSpeed, wind_speed)
        .with(Metric::WindDirection, current.wind_degree)
        .with(Metric::Precipitation, current.precip_mm))
}

#[async_trait]
impl ProviderAdapter for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError> {
        let params = self.params(coordinate)?;

        let parsed: WaResponse = self.http.fetch_json(&self.base_url, &params, None).await?;

        to_reading(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(json: &str) -> Result<Reading, FetchError> {
        to_reading(serde_json::from_str(json).expect("valid json"))
    }

    #[test]
    fn converts_wind_to_metres_per_second() {
        let reading = parse(
            r#"{
                "location": {"name": "Medellin", "country": "Colombia"},
                "current": {
                    "last_updated_epoch": 1717243200,
                    "temp_c": 23.0, "feelslike_c": 25.1, "humidity": 69,
                    "wind_kph": 18.0, "wind_degree": 200, "pressure_mb": 1014.0,
                    "precip_mm": 0.0, "condition": {"text": "Partly cloudy"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(reading.get(Metric::WindSpeed), Some(5.0));
        assert_eq!(reading.get(Metric::Temperature), Some(23.0));
        assert_eq!(reading.get(Metric::Precipitation), Some(0.0));
        assert_eq!(reading.observed_at.timestamp(), 1_717_243_200);
    }

    #[test]
    fn error_object_fails() {
        let err = parse(r#"{"error": {"code": 1006, "message": "No matching location found."}}"#)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnparseableResponse);
        assert!(err.message.contains("1006"));
    }

    #[test]
    fn absent_current_block_is_an_empty_reading() {
        let reading = parse(r#"{"location": {}}"#).unwrap();
        assert!(reading.is_empty());
    }

    #[test]
    fn coordinate_is_sent_as_single_query() {
        let provider = WeatherApiProvider::new(
            "KEY".into(),
            RetryingHttpClient::new(Default::default()).unwrap(),
        );
        let params = provider.params(Coordinate::new(6.25, -75.5).unwrap()).unwrap();
        assert!(params.contains(&("q", "6.25,-75.5".to_string())));
    }

    #[test]
    fn blank_key_is_rejected_before_request() {
        let provider = WeatherApiProvider::new(
            String::new(),
            RetryingHttpClient::new(Default::default()).unwrap(),
        );
        let err = provider.params(Coordinate::new(0.0, 0.0).unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
