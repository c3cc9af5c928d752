use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Coordinate, FetchError, Metric, Reading,
    http::RetryingHttpClient,
    provider::{ProviderAdapter, ProviderId},
};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: RetryingHttpClient,
    base_url: String,
}

impl OpenWeatherProvider {
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
            return Err(FetchError::configuration(
                "OpenWeatherMap API key is not configured",
            ));
        }

        Ok(vec![
            ("lat", coordinate.latitude.to_string()),
            ("lon", coordinate.longitude.to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ])
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwCurrentResponse {
    // 200 as a number on success, sometimes a string on errors.
    cod: Option<Value>,
    message: Option<String>,
    dt: Option<i64>,
    main: Option<OwMain>,
    wind: Option<OwWind>,
    rain: Option<OwRain>,
}

fn response_code(cod: &Value) -> Option<i64> {
    match cod {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn to_reading(parsed: OwCurrentResponse) -> Result<Reading, FetchError> {
    if let Some(code) = parsed
        .cod
        .as_ref()
        .and_then(response_code)
        .filter(|code| *code != 200)
    {
        return Err(FetchError::unparseable(format!(
            "OpenWeatherMap reported error {code}: {}",
            parsed.message.as_deref().unwrap_or("no message")
        )));
    }

    let observed_at = parsed
        .dt
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);
    let main = parsed.main.unwrap_or_default();
    let wind = parsed.wind.unwrap_or_default();
    let rain = parsed.rain.unwrap_or_default();

    Ok(Reading::new(ProviderId::OpenWeather, observed_at)
        .with(Metric::Temperature, main.temp)
        .with(Metric::FeelsLike, main.feels_like)
        .with(Metric::Humidity, main.humidity)
        .with(Metric::Pressure, main.pressure)
        .with(Metric::WindSpeed, wind.speed)
        .with(Metric::WindDirection, wind.deg)
        .with(Metric::Precipitation, rain.one_hour))
}

#[async_trait]
impl ProviderAdapter for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError> {
        let params = self.params(coordinate)?;

        let parsed: OwCurrentResponse = self.http.fetch_json(&self.base_url, &params, None).await?;

        to_reading(parsed)
    }
}
