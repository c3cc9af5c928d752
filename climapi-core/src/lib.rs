//! Core library for `climapi`, a multi-provider current-weather aggregator.
//!
//! This crate defines:
//! - A retrying HTTP client shared by all network providers
//! - The provider contract and its built-in adapters
//! - The provider registry, built once from configuration
//! - A TTL cache and the concurrent aggregator that consults it
//! - Shared domain models (coordinates, readings, aggregated records)
//!
//! It is used by `climapi-cli`, but can also be embedded in a server or dashboard:
//! build one [`Aggregator`] at startup and pass it to whatever needs it.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod registry;

pub use aggregator::{Aggregator, DEFAULT_PROVIDER_TIMEOUT, ReadingCache};
pub use cache::{CacheKey, TtlCache};
pub use config::{CacheConfig, Config, FixedConfig, HttpConfig, ProviderConfig};
pub use error::{Error, ErrorKind, FetchError};
pub use http::{RetryPolicy, RetryingHttpClient};
pub use model::{
    AggregatedRecord, Coordinate, FetchOutcome, Metric, MetricStats, ProviderOutcome, Reading,
};
pub use provider::{ProviderAdapter, ProviderDescriptor, ProviderId};
pub use registry::{ProviderEntry, ProviderRegistry};
