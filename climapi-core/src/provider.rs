use crate::{Coordinate, FetchError, Reading};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug};

pub mod fixed;
pub mod meteoblue;
pub mod open_meteo;
pub mod openweather;
pub mod weatherapi;

pub use fixed::FixedStationProvider;
pub use meteoblue::MeteoBlueProvider;
pub use open_meteo::OpenMeteoProvider;
pub use openweather::OpenWeatherProvider;
pub use weatherapi::WeatherApiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "open_meteo")]
    OpenMeteo,
    #[serde(rename = "fixed_siata")]
    FixedSiata,
    #[serde(rename = "openweather")]
    OpenWeather,
    #[serde(rename = "meteoblue")]
    MeteoBlue,
    #[serde(rename = "weatherapi")]
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "open_meteo",
            ProviderId::FixedSiata => "fixed_siata",
            ProviderId::OpenWeather => "openweather",
            ProviderId::MeteoBlue => "meteoblue",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenMeteo,
            ProviderId::FixedSiata,
            ProviderId::OpenWeather,
            ProviderId::MeteoBlue,
            ProviderId::WeatherApi,
        ]
    }

    /// Environment variable holding this provider's API key, if it needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenWeather => Some("OPENWEATHER_API_KEY"),
            ProviderId::MeteoBlue => Some("METEOBLUE_API_KEY"),
            ProviderId::WeatherApi => Some("WEATHERAPI_API_KEY"),
            ProviderId::OpenMeteo | ProviderId::FixedSiata => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        ProviderId::all()
            .iter()
            .find(|id| id.as_str() == lower)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown provider '{value}'. \
                     Supported providers: open_meteo, fixed_siata, openweather, meteoblue, \
                     weatherapi."
                )
            })
    }
}

/// Static metadata for one provider, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: String,
    /// Lower sorts first.
    pub priority: u32,
    pub enabled: bool,
}

/// A weather data source translated into canonical [`Reading`]s.
///
/// Implementations keep only construction-time configuration, so the same
/// adapter may serve concurrent aggregations without locking. Configuration
/// problems must be reported before any network I/O happens.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError>;
}
