//! The set of providers known to this process.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    Config, Error,
    http::{RetryPolicy, RetryingHttpClient},
    provider::{
        FixedStationProvider, MeteoBlueProvider, OpenMeteoProvider, OpenWeatherProvider,
        ProviderAdapter, ProviderDescriptor, ProviderId, WeatherApiProvider,
    },
};

/// A descriptor plus the adapter behind it. Disabled entries carry no adapter.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub descriptor: ProviderDescriptor,
    adapter: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderEntry {
    pub fn enabled(
        display_name: impl Into<String>,
        priority: u32,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id: adapter.id(),
                display_name: display_name.into(),
                priority,
                enabled: true,
            },
            adapter: Some(adapter),
        }
    }

    pub fn disabled(id: ProviderId, display_name: impl Into<String>, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                id,
                display_name: display_name.into(),
                priority,
                enabled: false,
            },
            adapter: None,
        }
    }

    pub fn adapter(&self) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapter.as_ref()
    }
}

/// Ordered, immutable provider set.
///
/// Whether a provider is enabled is decided once when the registry is built;
/// it is never re-evaluated per request.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    /// Build a registry, sorted by ascending priority.
    pub fn new(mut entries: Vec<ProviderEntry>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.descriptor.id) {
                return Err(Error::DuplicateProvider(entry.descriptor.id));
            }
        }

        // stable: equal priorities keep registration order
        entries.sort_by_key(|entry| entry.descriptor.priority);

        Ok(Self { entries })
    }

    /// Build the standard provider set from configuration.
    ///
    /// Keyed providers without a key are registered as disabled.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let http = RetryingHttpClient::new(RetryPolicy::from(&config.http))
            .map_err(|err| Error::Configuration(err.message))?;

        let mut entries = vec![ProviderEntry::enabled(
            "Open-Meteo",
            1,
            Arc::new(OpenMeteoProvider::new(http.clone())),
        )];

        entries.push(if config.fixed.enabled {
            ProviderEntry::enabled("SIATA (Medellín)", 2, Arc::new(FixedStationProvider::siata()))
        } else {
            ProviderEntry::disabled(ProviderId::FixedSiata, "SIATA (Medellín)", 2)
        });

        entries.push(match config.provider_api_key(ProviderId::OpenWeather) {
            Some(key) => ProviderEntry::enabled(
                "OpenWeatherMap",
                3,
                Arc::new(OpenWeatherProvider::new(key.to_owned(), http.clone())),
            ),
            None => ProviderEntry::disabled(ProviderId::OpenWeather, "OpenWeatherMap", 3),
        });

        entries.push(match config.provider_api_key(ProviderId::MeteoBlue) {
            Some(key) => ProviderEntry::enabled(
                "MeteoBlue",
                4,
                Arc::new(MeteoBlueProvider::new(key.to_owned(), http.clone())),
            ),
            None => ProviderEntry::disabled(ProviderId::MeteoBlue, "MeteoBlue", 4),
        });

        entries.push(match config.provider_api_key(ProviderId::WeatherApi) {
            Some(key) => ProviderEntry::enabled(
                "WeatherAPI.com",
                5,
                Arc::new(WeatherApiProvider::new(key.to_owned(), http)),
            ),
            None => ProviderEntry::disabled(ProviderId::WeatherApi, "WeatherAPI.com", 5),
        });

        for entry in &entries {
            debug!(
                provider = %entry.descriptor.id,
                enabled = entry.descriptor.enabled,
                priority = entry.descriptor.priority,
                "registered provider"
            );
        }

        let registry = Self::new(entries)?;
        info!(
            enabled = registry.enabled().count(),
            total = registry.len(),
            "provider registry ready"
        );
        Ok(registry)
    }

    /// Every registered provider, enabled or not, in priority order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    /// Enabled providers with their adapters, in priority order.
    pub fn enabled(&self) -> impl Iterator<Item = (&ProviderDescriptor, &Arc<dyn ProviderAdapter>)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.adapter().map(|adapter| (&entry.descriptor, adapter)))
    }

    pub fn enabled_adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.enabled().map(|(_, adapter)| Arc::clone(adapter)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
