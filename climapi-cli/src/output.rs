//! Human-readable rendering of aggregation results.

use std::fmt::Write;

use chrono::Local;
use climapi_core::{AggregatedRecord, FetchOutcome, ProviderDescriptor};

pub fn render_record(record: &AggregatedRecord) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Weather at {} ({})",
        record.coordinate,
        record.generated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    for source in &record.per_provider {
        match &source.outcome {
            FetchOutcome::Success(reading) => {
                let metrics = reading
                    .metrics
                    .iter()
                    .map(|(metric, value)| format!("{metric}={value:.1}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                let cached = if source.cached { " [cached]" } else { "" };
                let metrics = if metrics.is_empty() { "(no metrics)".to_string() } else { metrics };
                let _ = writeln!(out, "  ok    {:<20} {metrics}{cached}", source.name);
            }
            FetchOutcome::Failure(err) => {
                let _ = writeln!(out, "  fail  {:<20} {err}", source.name);
            }
        }
    }

    if record.statistics.is_empty() {
        let _ = writeln!(out, "No data available.");
        return out;
    }

    let _ = writeln!(out, "Summary:");
    for (metric, stats) in &record.statistics {
        let _ = writeln!(
            out,
            "  {:<14} avg {:>8.2}  min {:>8.2}  max {:>8.2}  ({} sources)",
            metric.as_str(),
            stats.average,
            stats.min,
            stats.max,
            stats.contributing_count
        );
    }

    out
}

pub fn render_providers<'a>(descriptors: impl Iterator<Item = &'a ProviderDescriptor>) -> String {
    let mut out = String::new();
    for descriptor in descriptors {
        let state = if descriptor.enabled { "enabled" } else { "disabled" };
        let hint = if !descriptor.enabled && descriptor.id.requires_api_key() {
            format!(" (run `climapi configure {}`)", descriptor.id)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{:>2}. {:<12} {:<20} {state}{hint}",
            descriptor.priority,
            descriptor.id.as_str(),
            descriptor.display_name
        );
    }
    out
}
