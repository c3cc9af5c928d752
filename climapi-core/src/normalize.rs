//! Merging per-provider outcomes into one record.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::{AggregatedRecord, Coordinate, Metric, MetricStats, ProviderOutcome};

/// Build the aggregated record for `coordinate` from one outcome per provider.
///
/// Outcomes are kept in the order given.
pub fn merge(coordinate: Coordinate, per_provider: Vec<ProviderOutcome>) -> AggregatedRecord {
    let statistics = summarize(&per_provider);

    AggregatedRecord {
        coordinate,
        per_provider,
        statistics,
        generated_at: Utc::now(),
    }
}

/// Average, min and max of every metric reported by at least one successful
/// provider. Values are used as reported; no unit conversion happens here.
pub fn summarize(per_provider: &[ProviderOutcome]) -> BTreeMap<Metric, MetricStats> {
    let mut values: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();

    for reading in per_provider.iter().filter_map(|p| p.outcome.reading()) {
        for (metric, value) in &reading.metrics {
            values.entry(*metric).or_default().push(*value);
        }
    }

    values
        .into_iter()
        .map(|(metric, values)| (metric, stats(&values)))
        .collect()
}

fn stats(values: &[f64]) -> MetricStats {
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    MetricStats {
        average: sum / values.len() as f64,
        min,
        max,
        contributing_count: values.len(),
    }
}
