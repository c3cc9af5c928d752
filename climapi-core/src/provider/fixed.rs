//! Offline provider that answers with a fixed station reading.
//!
//! Useful for demos and as a local baseline next to the network providers.
//! It covers a square window around the station and refuses anything outside.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    Coordinate, FetchError, Metric, Reading,
    error::ErrorKind,
    provider::{ProviderAdapter, ProviderId},
};

#[derive(Debug, Clone)]
pub struct FixedStationProvider {
    id: ProviderId,
    station: String,
    center: Coordinate,
    /// Half-width of the covered window, in degrees on each axis.
    radius_deg: f64,
    metrics: BTreeMap<Metric, f64>,
}

impl FixedStationProvider {
    pub fn new(
        id: ProviderId,
        station: impl Into<String>,
        center: Coordinate,
        radius_deg: f64,
        metrics: BTreeMap<Metric, f64>,
    ) -> Self {
        Self {
            id,
            station: station.into(),
            center,
            radius_deg,
            metrics,
        }
    }

    /// SIATA network station in Medellín.
    pub fn siata() -> Self {
        Self::new(
            ProviderId::FixedSiata,
            "Medellín",
            Coordinate {
                latitude: 6.2442,
                longitude: -75.5812,
            },
            1.0,
            BTreeMap::from([
                (Metric::Temperature, 22.5),
                (Metric::Humidity, 65.0),
                (Metric::Pressure, 1013.0),
                (Metric::WindSpeed, 3.2),
            ]),
        )
    }

    pub fn covers(&self, coordinate: Coordinate) -> bool {
        (coordinate.latitude - self.center.latitude).abs() < self.radius_deg
            && (coordinate.longitude - self.center.longitude).abs() < self.radius_deg
    }
}

#[async_trait]
impl ProviderAdapter for FixedStationProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn fetch(&self, coordinate: Coordinate) -> Result<Reading, FetchError> {
        if !self.covers(coordinate) {
            return Err(FetchError::new(
                ErrorKind::OutOfCoverage,
                format!("{} only serves locations near {}", self.id, self.station),
            ));
        }

        Ok(Reading {
            provider: self.id,
            observed_at: Utc::now(),
            metrics: self.metrics.clone(),
        })
    }
}
