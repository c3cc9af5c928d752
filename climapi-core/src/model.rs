use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, FetchError};
use crate::provider::ProviderId;

/// A point on the globe, validated at the boundary of the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Error> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Reject latitudes outside [-90, 90], longitudes outside [-180, 180] and NaN.
    pub fn validate(&self) -> Result<(), Error> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidArgument(format!(
                "latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidArgument(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Coordinate scaled to 1e-4 degrees (about 11 m), used for cache keys.
    pub fn rounded(&self) -> (i64, i64) {
        (
            (self.latitude * 10_000.0).round() as i64,
            (self.longitude * 10_000.0).round() as i64,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Canonical metric names shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// Air temperature, °C.
    Temperature,
    /// Apparent temperature, °C.
    FeelsLike,
    /// Relative humidity, %.
    Humidity,
    /// Surface pressure, hPa.
    Pressure,
    /// Wind speed, m/s.
    WindSpeed,
    /// Wind direction, degrees.
    WindDirection,
    /// Precipitation, mm.
    Precipitation,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::FeelsLike => "feelsLike",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::WindSpeed => "windSpeed",
            Metric::WindDirection => "windDirection",
            Metric::Precipitation => "precipitation",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sparse set of metrics reported by one provider.
///
/// A metric the provider did not report is absent, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub provider: ProviderId,
    pub observed_at: DateTime<Utc>,
    pub metrics: BTreeMap<Metric, f64>,
}

impl Reading {
    pub fn new(provider: ProviderId, observed_at: DateTime<Utc>) -> Self {
        Self {
            provider,
            observed_at,
            metrics: BTreeMap::new(),
        }
    }

    /// Record `metric` if the provider sent a finite value for it.
    pub fn with(mut self, metric: Metric, value: Option<f64>) -> Self {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.metrics.insert(metric, value);
        }
        self
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Result of asking one provider once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchOutcome {
    #[serde(rename = "data")]
    Success(Reading),
    #[serde(rename = "error")]
    Failure(FetchError),
}

impl FetchOutcome {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            FetchOutcome::Success(reading) => Some(reading),
            FetchOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure(err) => Some(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// One entry of [`AggregatedRecord::sources`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub id: ProviderId,
    pub name: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

/// Cross-provider summary of a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    #[serde(rename = "sources")]
    pub contributing_count: usize,
}

/// Immutable snapshot handed back to the caller of `fetch_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    #[serde(rename = "location")]
    pub coordinate: Coordinate,
    #[serde(rename = "sources")]
    pub per_provider: Vec<ProviderOutcome>,
    pub statistics: BTreeMap<Metric, MetricStats>,
    #[serde(rename = "timestamp")]
    pub generated_at: DateTime<Utc>,
}

impl AggregatedRecord {
    pub fn successful(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.per_provider.iter().filter(|p| p.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.per_provider.iter().filter(|p| !p.outcome.is_success())
    }

    pub fn has_data(&self) -> bool {
        !self.statistics.is_empty()
    }
}
