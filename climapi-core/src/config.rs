use anyhow::{Context, Result, anyhow, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::provider::ProviderId;

/// Credentials for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_minutes: u64,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 15,
            max_size: 100,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

/// Timeouts and retry budget for provider requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub provider_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 5,
            max_retries: 3,
            backoff_base_ms: 500,
            provider_timeout_secs: 10,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Offline fixed-station provider switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedConfig {
    pub enabled: bool,
}

impl Default for FixedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    pub cache: CacheConfig,

    pub http: HttpConfig,

    pub fixed: FixedConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make every provider call fail.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.http.request_timeout_secs > 0,
            "http.request_timeout_secs must be at least 1"
        );
        ensure!(
            self.http.provider_timeout_secs > 0,
            "http.provider_timeout_secs must be at least 1"
        );
        Ok(())
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "climapi", "climapi")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override stored API keys with `<PROVIDER>_API_KEY` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in ProviderId::all() {
            let Some(var) = id.api_key_env() else {
                continue;
            };
            if let Some(key) = lookup(var).filter(|key| !key.trim().is_empty()) {
                self.upsert_provider_api_key(*id, key);
            }
        }
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns the API key for a provider, if present and non-blank.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.trim())
            .filter(|key| !key.is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();

        assert_eq!(cfg.cache.ttl(), Duration::from_secs(900));
        assert_eq!(cfg.cache.max_size, 100);
        assert_eq!(cfg.http.max_retries, 3);
        assert_eq!(cfg.http.backoff_base_ms, 500);
        assert_eq!(cfg.http.provider_timeout(), Duration::from_secs(10));
        assert!(cfg.fixed.enabled);
    }

    #[test]
    fn set_api_key_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());

        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("OPEN_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::OpenWeather));
        assert!(!cfg.is_provider_configured(ProviderId::WeatherApi));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "   ".into());

        assert!(!cfg.is_provider_configured(ProviderId::WeatherApi));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = Config::from_toml(
            r#"
            [providers.openweather]
            api_key = "abc"

            [cache]
            max_size = 5
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("abc"));
        assert_eq!(cfg.cache.max_size, 5);
        assert_eq!(cfg.cache.ttl_minutes, 15);
        assert_eq!(cfg.http, HttpConfig::default());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let err = Config::from_toml("[http]\nrequest_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));

        let err = Config::from_toml("[http]\nprovider_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("provider_timeout_secs"));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let cfg = Config::from_toml(&format!("[cache]\nttl_minutes = {}\n", i64::MAX))
            .expect("valid toml");

        assert_eq!(cfg.cache.ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn env_keys_override_stored_keys() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "stored".into());

        cfg.apply_env_from(|name| match name {
            "OPENWEATHER_API_KEY" => Some("from-env".into()),
            "WEATHERAPI_API_KEY" => Some(String::new()),
            "METEOBLUE_API_KEY" => Some("mb".into()),
            _ => None,
        });

        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("from-env"));
        assert_eq!(cfg.provider_api_key(ProviderId::MeteoBlue), Some("mb"));
        assert!(!cfg.is_provider_configured(ProviderId::WeatherApi));
    }

    #[test]
    fn toml_roundtrip_keeps_sections() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "wk".into());
        cfg.fixed.enabled = false;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed = Config::from_toml(&text).expect("parse");

        assert_eq!(parsed.provider_api_key(ProviderId::WeatherApi), Some("wk"));
        assert!(!parsed.fixed.enabled);
    }
}
