//! Pipeline configuration (TOML).
//!
//! Loaded once and passed by reference into every stage; nothing reads
//! settings from globals. Credentials are never stored here: providers name
//! the environment variable that holds their key.

use chrono::NaiveDate;
use cryptonest_core::cache::{RetryPolicy, StoreFailurePolicy};
use cryptonest_core::source::{ProviderSettings, COINGECKO_PRO_URL, DEFILLAMA_URL, LUNARCRUSH_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {var} is not set")]
    MissingCredential { var: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
    /// First month of the reconstructed universe and earliest dataset date.
    pub start_date: NaiveDate,
    /// Last date fetched; the run date when unset.
    pub end_date: Option<NaiveDate>,
    /// Entities kept per month.
    pub universe_size: usize,
    /// Entities considered for ranking, taken from the current listing.
    pub candidate_size: usize,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            end_date: None,
            universe_size: 200,
            candidate_size: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheSettings {
    pub bucket: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Override for emulators; the public endpoint when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "GCS_ACCESS_TOKEN".into()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub local_dir: PathBuf,
    pub remote: Option<RemoteCacheSettings>,
    pub on_store_error: StoreFailurePolicy,
    pub retry: RetrySettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from("cache"),
            remote: None,
            on_store_error: StoreFailurePolicy::Abort,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: Option<String>,
    /// Concurrent requests in flight against this provider.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

impl ProviderConfig {
    fn new(base_url: &str, api_key_env: &str, max_in_flight: usize) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_env: Some(api_key_env.into()),
            max_in_flight,
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    /// Client settings with the API key resolved from the environment.
    pub fn settings(&self) -> Result<ProviderSettings, ConfigError> {
        let api_key = match &self.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ConfigError::MissingCredential { var: var.clone() })?,
            ),
            None => None,
        };
        Ok(ProviderSettings {
            base_url: self.base_url.clone(),
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSettings {
    pub coingecko: ProviderConfig,
    pub defillama: ProviderConfig,
    pub lunarcrush: ProviderConfig,
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        Self {
            coingecko: ProviderConfig::new(COINGECKO_PRO_URL, "COINGECKO_PRO_API_KEY", 4),
            defillama: ProviderConfig::new(DEFILLAMA_URL, "DEFILLAMA_PRO_API_KEY", 4),
            lunarcrush: ProviderConfig::new(LUNARCRUSH_URL, "LUNARCRUSH_PRO_API_KEY", 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub universe_file: PathBuf,
    pub dataset_file: PathBuf,
    pub dashboard_file: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            universe_file: PathBuf::from("cache/universe_cache.json"),
            dataset_file: PathBuf::from("crypto_market_data.parquet"),
            dashboard_file: PathBuf::from("dashboard_market_data.parquet"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// TOML `[aliases]` table; the built-in table when unset.
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub universe: UniverseSettings,
    pub cache: CacheSettings,
    pub providers: ProvidersSettings,
    pub output: OutputSettings,
    pub identity: IdentitySettings,
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = &self.universe;
        if u.universe_size == 0 {
            return Err(ConfigError::Invalid("universe.universe_size must be > 0".into()));
        }
        if u.candidate_size < u.universe_size {
            return Err(ConfigError::Invalid(format!(
                "universe.candidate_size ({}) must be >= universe_size ({})",
                u.candidate_size, u.universe_size
            )));
        }
        if let Some(end) = u.end_date {
            if end < u.start_date {
                return Err(ConfigError::Invalid(format!(
                    "universe.end_date {end} is before start_date {}",
                    u.start_date
                )));
            }
        }
        for (name, p) in [
            ("coingecko", &self.providers.coingecko),
            ("defillama", &self.providers.defillama),
            ("lunarcrush", &self.providers.lunarcrush),
        ] {
            if p.max_in_flight == 0 {
                return Err(ConfigError::Invalid(format!(
                    "providers.{name}.max_in_flight must be > 0"
                )));
            }
            if p.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "providers.{name}.timeout_secs must be > 0"
                )));
            }
        }
        if let Some(remote) = &self.cache.remote {
            if remote.bucket.trim().is_empty() {
                return Err(ConfigError::Invalid("cache.remote.bucket is empty".into()));
            }
        }
        Ok(())
    }

    /// Last date to fetch for a run on `today`.
    pub fn end_date(&self, today: NaiveDate) -> NaiveDate {
        self.universe.end_date.unwrap_or(today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_and_round_trip() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[providers.coingecko]"));
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [universe]
            start_date = "2023-06-01"
            universe_size = 50

            [cache]
            on_store_error = "fetch_live"

            [cache.remote]
            bucket = "cryptonest-cache"
            "#,
        )
        .unwrap();
        assert_eq!(config.universe.universe_size, 50);
        assert_eq!(config.universe.candidate_size, 500);
        assert_eq!(config.cache.on_store_error, StoreFailurePolicy::FetchLive);
        let remote = config.cache.remote.unwrap();
        assert_eq!(remote.token_env, "GCS_ACCESS_TOKEN");
        assert_eq!(remote.timeout_secs, 30);
        assert_eq!(config.providers.lunarcrush.max_in_flight, 2);
    }

    #[test]
    fn rejects_small_candidate_pool() {
        let err = PipelineConfig::from_toml(
            r#"
            [universe]
            universe_size = 300
            candidate_size = 200
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = PipelineConfig::default();
        config.providers.defillama.max_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let mut p = PipelineConfig::default().providers.coingecko;
        p.api_key_env = Some("CRYPTONEST_TEST_UNSET_KEY_VAR".into());
        match p.settings() {
            Err(ConfigError::MissingCredential { var }) => assert_eq!(var, "CRYPTONEST_TEST_UNSET_KEY_VAR"),
            other => panic!("expected missing credential, got {other:?}"),
        }
        p.api_key_env = None;
        assert!(p.settings().unwrap().api_key.is_none());
    }

    #[test]
    fn retry_settings_map_to_policy() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }
}
