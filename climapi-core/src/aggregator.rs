//! Concurrent fan-out over every enabled provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    AggregatedRecord, Config, Coordinate, Error, FetchError, FetchOutcome, ProviderOutcome,
    Reading,
    cache::{CacheKey, TtlCache},
    error::ErrorKind,
    normalize,
    provider::ProviderDescriptor,
    registry::ProviderRegistry,
};

pub type ReadingCache = TtlCache<CacheKey, Reading>;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a provider's outcome comes from during one aggregation.
enum Slot {
    Ready(ProviderOutcome),
    InFlight {
        descriptor: ProviderDescriptor,
        task: JoinHandle<Result<Reading, FetchError>>,
    },
}

/// Queries all enabled providers in parallel and merges what comes back.
///
/// Cheap to share: the registry and cache are reference counted, so the
/// entry point builds one aggregator and hands clones to its consumers.
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ReadingCache>,
    per_provider_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<ReadingCache>,
        per_provider_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            per_provider_timeout,
        }
    }

    /// Registry, cache and timeouts as described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let registry = ProviderRegistry::from_config(config)?;
        let cache = TtlCache::new(config.cache.ttl(), config.cache.max_size);

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(cache),
            config.http.provider_timeout(),
        ))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    pub fn per_provider_timeout(&self) -> Duration {
        self.per_provider_timeout
    }

    /// [`fetch_all_with_timeout`](Self::fetch_all_with_timeout) with the configured timeout.
    pub async fn fetch_all(&self, coordinate: Coordinate) -> Result<AggregatedRecord, Error> {
        self.fetch_all_with_timeout(coordinate, self.per_provider_timeout)
            .await
    }

    /// Current conditions at `coordinate` from every enabled provider.
    ///
    /// Returns exactly one outcome per enabled provider, in priority order.
    /// Live cache entries are used instead of calling the provider. Every other
    /// provider runs on its own task bounded by `per_provider_timeout`, and all
    /// tasks are awaited whatever the others do; provider failures end up as
    /// `Failure` outcomes, never as an error of this call.
    ///
    /// Fails only for an invalid coordinate or when no provider is enabled,
    /// in both cases before any provider is contacted.
    pub async fn fetch_all_with_timeout(
        &self,
        coordinate: Coordinate,
        per_provider_timeout: Duration,
    ) -> Result<AggregatedRecord, Error> {
        coordinate.validate()?;

        let mut slots = Vec::new();
        for (descriptor, adapter) in self.registry.enabled() {
            let key = CacheKey::new(descriptor.id, coordinate);

            if let Some(reading) = self.cache.get(&key) {
                debug!(provider = %descriptor.id, %coordinate, "serving provider from cache");
                slots.push(Slot::Ready(outcome(descriptor, Ok(reading), true)));
                continue;
            }

            debug!(provider = %descriptor.id, %coordinate, "dispatching provider");
            let adapter = Arc::clone(adapter);
            let cache = Arc::clone(&self.cache);
            let task = tokio::spawn(async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(
                    per_provider_timeout,
                    adapter.fetch(coordinate),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::timeout(format!(
                        "no answer within {} ms",
                        per_provider_timeout.as_millis()
                    ))),
                };

                debug!(
                    provider = %key.provider,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "provider finished"
                );

                if let Ok(reading) = &result {
                    cache.set(key, reading.clone());
                }
                result
            });

            slots.push(Slot::InFlight {
                descriptor: descriptor.clone(),
                task,
            });
        }

        if slots.is_empty() {
            return Err(Error::NoProviders);
        }

        let per_provider = join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Ready(outcome) => outcome,
                Slot::InFlight { descriptor, task } => {
                    let result = task.await.unwrap_or_else(|err| {
                        Err(FetchError::new(
                            ErrorKind::Internal,
                            format!("provider task failed: {err}"),
                        ))
                    });
                    outcome(&descriptor, result, false)
                }
            }
        }))
        .await;

        for failed in per_provider.iter().filter(|p| !p.outcome.is_success()) {
            if let Some(err) = failed.outcome.error() {
                warn!(
                    provider = %failed.id,
                    kind = %err.kind,
                    error = %err.message,
                    "provider failed"
                );
            }
        }

        let record = normalize::merge(coordinate, per_provider);
        info!(
            %coordinate,
            providers = record.per_provider.len(),
            succeeded = record.successful().count(),
            cached = record.per_provider.iter().filter(|p| p.cached).count(),
            "aggregation complete"
        );

        Ok(record)
    }
}

fn outcome(
    descriptor: &ProviderDescriptor,
    result: Result<Reading, FetchError>,
    cached: bool,
) -> ProviderOutcome {
    let (outcome, timestamp) = match result {
        Ok(reading) => {
            let observed_at = reading.observed_at;
            (FetchOutcome::Success(reading), observed_at)
        }
        Err(err) => (FetchOutcome::Failure(err), Utc::now()),
    };

    ProviderOutcome {
        id: descriptor.id,
        name: descriptor.display_name.clone(),
        outcome,
        cached,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Metric,
        provider::{ProviderAdapter, ProviderId},
        registry::ProviderEntry,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(900);

    #[derive(Debug)]
    enum Behavior {
        Succeed(Vec<(Metric, f64)>),
        Fail(ErrorKind),
        Panic,
    }

    #[derive(Debug)]
    struct StubProvider {
        id: ProviderId,
        delay: Duration,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(id: ProviderId, delay: Duration, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                delay,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn fetch(&self, _coordinate: Coordinate) -> Result<Reading, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            match &self.behavior {
                Behavior::Succeed(metrics) => {
                    Ok(metrics
                        .iter()
                        .fold(Reading::new(self.id, Utc::now()), |reading, (metric, value)| {
                            reading.with(*metric, Some(*value))
                        }))
                }
                Behavior::Fail(kind) => Err(FetchError::new(*kind, "stub failure")),
                Behavior::Panic => panic!("stub provider exploded"),
            }
        }
    }

    fn aggregator(providers: &[(u32, Arc<StubProvider>)]) -> Aggregator {
        let entries = providers
            .iter()
            .map(|(priority, stub)| {
                let adapter: Arc<dyn ProviderAdapter> = stub.clone();
                ProviderEntry::enabled(stub.id.to_string(), *priority, adapter)
            })
            .collect();
        let registry = ProviderRegistry::new(entries).unwrap();

        Aggregator::new(
            Arc::new(registry),
            Arc::new(TtlCache::new(TTL, 100)),
            DEFAULT_PROVIDER_TIMEOUT,
        )
    }

    fn temperature(value: f64) -> Behavior {
        Behavior::Succeed(vec![(Metric::Temperature, value)])
    }

    fn failing(id: ProviderId, kind: ErrorKind) -> Arc<StubProvider> {
        StubProvider::new(id, Duration::ZERO, Behavior::Fail(kind))
    }

    fn medellin() -> Coordinate {
        Coordinate::new(6.2442, -75.5812).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn averages_three_successful_providers() {
        let agg = aggregator(&[
            (1, StubProvider::new(ProviderId::OpenMeteo, Duration::ZERO, temperature(20.0))),
            (2, StubProvider::new(ProviderId::OpenWeather, Duration::ZERO, temperature(22.0))),
            (3, StubProvider::new(ProviderId::WeatherApi, Duration::ZERO, temperature(24.0))),
        ]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(record.per_provider.len(), 3);
        assert_eq!(record.successful().count(), 3);
        let stats = record.statistics[&Metric::Temperature];
        assert_eq!(stats.average, 22.0);
        assert_eq!(stats.min, 20.0);
        assert_eq!(stats.max, 24.0);
        assert_eq!(stats.contributing_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_without_affecting_the_other() {
        let slow = StubProvider::new(ProviderId::OpenMeteo, Duration::from_secs(60), temperature(1.0));
        let fast = StubProvider::new(
            ProviderId::OpenWeather,
            Duration::from_millis(50),
            Behavior::Succeed(vec![(Metric::Humidity, 65.0)]),
        );
        let agg = aggregator(&[(1, slow), (2, fast)]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(record.per_provider.len(), 2);
        let first = &record.per_provider[0];
        assert_eq!(first.id, ProviderId::OpenMeteo);
        assert_eq!(first.outcome.error().map(|e| e.kind), Some(ErrorKind::Timeout));
        assert!(record.per_provider[1].outcome.is_success());
        assert_eq!(
            record.statistics[&Metric::Humidity],
            crate::MetricStats {
                average: 65.0,
                min: 65.0,
                max: 65.0,
                contributing_count: 1,
            }
        );
        assert!(!record.statistics.contains_key(&Metric::Temperature));
    }

    #[tokio::test(start_paused = true)]
    async fn one_outcome_per_provider_whatever_fails() {
        let agg = aggregator(&[
            (1, failing(ProviderId::OpenMeteo, ErrorKind::Network)),
            (2, StubProvider::new(ProviderId::FixedSiata, Duration::from_secs(30), temperature(5.0))),
            (3, failing(ProviderId::OpenWeather, ErrorKind::HttpStatus(503))),
            (4, failing(ProviderId::MeteoBlue, ErrorKind::Configuration)),
            (5, StubProvider::new(ProviderId::WeatherApi, Duration::from_secs(1), temperature(7.0))),
        ]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        let ids: Vec<_> = record.per_provider.iter().map(|p| p.id).collect();
        assert_eq!(ids, ProviderId::all().to_vec());
        assert_eq!(record.failed().count(), 4);
        assert_eq!(record.statistics[&Metric::Temperature].contributing_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_still_produce_a_record() {
        let agg = aggregator(&[
            (1, failing(ProviderId::OpenMeteo, ErrorKind::Timeout)),
            (2, failing(ProviderId::OpenWeather, ErrorKind::Configuration)),
        ]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(record.failed().count(), 2);
        assert!(record.statistics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn output_follows_priority_not_completion_order() {
        let agg = aggregator(&[
            (2, StubProvider::new(ProviderId::OpenWeather, Duration::ZERO, temperature(2.0))),
            (1, StubProvider::new(ProviderId::OpenMeteo, Duration::from_secs(3), temperature(1.0))),
            (3, StubProvider::new(ProviderId::WeatherApi, Duration::from_secs(1), temperature(3.0))),
        ]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        let ids: Vec<_> = record.per_provider.iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec![ProviderId::OpenMeteo, ProviderId::OpenWeather, ProviderId::WeatherApi]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn providers_run_in_parallel() {
        let agg = aggregator(&[
            (1, StubProvider::new(ProviderId::OpenMeteo, Duration::from_secs(4), temperature(1.0))),
            (2, StubProvider::new(ProviderId::OpenWeather, Duration::from_secs(4), temperature(2.0))),
            (3, StubProvider::new(ProviderId::WeatherApi, Duration::from_secs(4), temperature(3.0))),
        ]);

        let started = Instant::now();
        let record = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(record.successful().count(), 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn live_cache_entry_skips_the_network() {
        let stub = StubProvider::new(ProviderId::OpenMeteo, Duration::ZERO, temperature(30.0));
        let agg = aggregator(&[(1, Arc::clone(&stub))]);
        let coordinate = medellin();

        let cached = Reading::new(ProviderId::OpenMeteo, Utc::now())
            .with(Metric::Temperature, Some(19.0));
        agg.cache()
            .set(CacheKey::new(ProviderId::OpenMeteo, coordinate), cached);
        tokio::time::advance(Duration::from_secs(100)).await;

        let record = agg.fetch_all(coordinate).await.unwrap();

        assert_eq!(stub.calls(), 0);
        assert!(record.per_provider[0].cached);
        assert_eq!(record.statistics[&Metric::Temperature].average, 19.0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_fetch_is_cached_until_ttl() {
        let stub = StubProvider::new(ProviderId::OpenMeteo, Duration::ZERO, temperature(30.0));
        let agg = aggregator(&[(1, Arc::clone(&stub))]);

        let first = agg.fetch_all(medellin()).await.unwrap();
        let second = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(stub.calls(), 1);
        assert!(!first.per_provider[0].cached);
        assert!(second.per_provider[0].cached);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let third = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(stub.calls(), 2);
        assert!(!third.per_provider[0].cached);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let stub = failing(ProviderId::OpenMeteo, ErrorKind::Network);
        let agg = aggregator(&[(1, Arc::clone(&stub))]);

        agg.fetch_all(medellin()).await.unwrap();
        agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(stub.calls(), 2);
        assert_eq!(agg.cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_coordinate_is_rejected_before_dispatch() {
        let stub = StubProvider::new(ProviderId::OpenMeteo, Duration::ZERO, temperature(1.0));
        let agg = aggregator(&[(1, Arc::clone(&stub))]);

        let err = agg
            .fetch_all(Coordinate {
                latitude: 200.0,
                longitude: 0.0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn registry_without_enabled_providers_is_an_error() {
        let registry = ProviderRegistry::new(vec![ProviderEntry::disabled(
            ProviderId::OpenWeather,
            "OpenWeatherMap",
            1,
        )])
        .unwrap();
        let agg = Aggregator::new(
            Arc::new(registry),
            Arc::new(TtlCache::new(TTL, 10)),
            DEFAULT_PROVIDER_TIMEOUT,
        );

        let err = agg.fetch_all(medellin()).await.unwrap_err();

        assert!(matches!(err, Error::NoProviders));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_adapter_becomes_an_internal_failure() {
        let agg = aggregator(&[
            (1, StubProvider::new(ProviderId::OpenMeteo, Duration::ZERO, Behavior::Panic)),
            (2, StubProvider::new(ProviderId::OpenWeather, Duration::ZERO, temperature(12.0))),
        ]);

        let record = agg.fetch_all(medellin()).await.unwrap();

        assert_eq!(
            record.per_provider[0].outcome.error().map(|e| e.kind),
            Some(ErrorKind::Internal)
        );
        assert!(record.per_provider[1].outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_aggregations_share_the_cache() {
        let stub = StubProvider::new(ProviderId::OpenMeteo, Duration::from_millis(10), temperature(15.0));
        let agg = aggregator(&[(1, Arc::clone(&stub))]);

        let (a, b) = tokio::join!(agg.fetch_all(medellin()), agg.fetch_all(medellin()));

        assert!(a.unwrap().per_provider[0].outcome.is_success());
        assert!(b.unwrap().per_provider[0].outcome.is_success());
        assert_eq!(agg.cache().size(), 1);
    }
}
