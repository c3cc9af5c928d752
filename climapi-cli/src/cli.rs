use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use climapi_core::{Aggregator, Config, Coordinate, ProviderId, ProviderRegistry};
use inquire::{Password, PasswordDisplayMode};
use tracing::debug;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "climapi", version, about = "Current weather from every reachable provider")]
pub struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather", "meteoblue" or "weatherapi".
        provider: String,
    },

    /// List known providers and whether they are enabled.
    Providers,

    /// Show current weather at a coordinate, merged across providers.
    Current {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Per-provider timeout in seconds; defaults to the configured value.
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the aggregated record as JSON.
        #[arg(long)]
        json: bool,

        /// Query this many times in a row (later runs are served from cache).
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Providers => {
                let config = load_config()?;
                let registry = ProviderRegistry::from_config(&config)?;
                print!("{}", output::render_providers(registry.descriptors()));
                Ok(())
            }
            Command::Current {
                lat,
                lon,
                timeout,
                json,
                repeat,
            } => {
                let coordinate = Coordinate::new(lat, lon)?;
                let config = load_config()?;
                let aggregator = Aggregator::from_config(&config)?;
                let timeout = timeout
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| aggregator.per_provider_timeout());

                for _ in 0..repeat.max(1) {
                    let record = aggregator
                        .fetch_all_with_timeout(coordinate, timeout)
                        .await?;

                    if json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&record)
                                .context("Failed to serialize aggregated record")?
                        );
                    } else {
                        print!("{}", output::render_record(&record));
                    }
                }
                Ok(())
            }
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    debug!(cache_ttl_minutes = config.cache.ttl_minutes, "configuration loaded");
    Ok(config)
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    if !id.requires_api_key() {
        bail!("Provider '{id}' does not need an API key.");
    }

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let mut config = Config::load()?;
    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!(
        "Saved API key for {id} to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from(["climapi", "current", "--lat", "6.24", "--lon", "-75.58"])
            .expect("valid args");

        match cli.command {
            Command::Current { lat, lon, repeat, json, .. } => {
                assert_eq!(lat, 6.24);
                assert_eq!(lon, -75.58);
                assert_eq!(repeat, 1);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_level_defaults_to_warn() {
        let cli = Cli::try_parse_from(["climapi", "providers"]).expect("valid args");
        assert_eq!(cli.log_level, "warn");
    }
}
