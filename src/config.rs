//! Configuration loading for umrahfare.
//!
//! Settings come from an optional TOML file plus a few environment
//! variables. The file is found via `--config`, then `UMRAHFARE_CONFIG`,
//! then `umrahfare.toml` inside the data directory. Every section is
//! optional and falls back to defaults.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::aggregator::AggregatorConfig;
use crate::http_client::HttpConfig;
use crate::normalize::DedupConfig;
use crate::rate_limit::{RateLimitConfig, MAX_DELAY_SECS};
use crate::scheduler::{SchedulerConfig, MAX_INTERVAL_HOURS};
use crate::sources::{ApiSourceConfig, ScraperTarget};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "umrahfare.db";

/// Config file looked up inside the data directory.
pub const CONFIG_FILENAME: &str = "umrahfare.toml";

pub const ENV_CONFIG: &str = "UMRAHFARE_CONFIG";
pub const ENV_DATA_DIR: &str = "UMRAHFARE_DATA_DIR";
pub const ENV_DATABASE: &str = "UMRAHFARE_DATABASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn check_range(field: &str, value: f64, max: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be between 0 and {}, got {}", field, max, value))
    }
}

/// Which sources the aggregator is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Hotel price APIs.
    pub api: Vec<ApiSourceConfig>,
    /// Travel agency result pages.
    pub scrapers: Vec<ScraperTarget>,
    /// Approved partner feeds.
    pub partner: bool,
    /// Previously stored offers, consulted when live sources come up short.
    pub database_fallback: bool,
    /// Built-in sample hotels, for trying things out without API keys.
    pub demo: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            api: Vec::new(),
            scrapers: Vec::new(),
            partner: true,
            database_fallback: true,
            demo: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Query responses kept in memory.
    pub max_entries: usize,
    /// Per-source TTL overrides in seconds, keyed by source name.
    pub source_ttl_secs: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
            source_ttl_secs: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn source_ttls(&self) -> HashMap<String, Duration> {
        self.source_ttl_secs
            .iter()
            .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Budget for sources without an override.
    pub default: RateLimitConfig,
    /// Per-source overrides, keyed by source name.
    pub sources: HashMap<String, RateLimitConfig>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database file, relative to the data directory unless absolute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub aggregator: AggregatorConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub http: HttpConfig,
    pub rate_limit: RateLimitSettings,
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Reject delays and intervals that cannot become durations. TOML
    /// accepts `inf` and `nan` for floats.
    pub fn validate(&self) -> Result<(), String> {
        check_range("http.retry_delay_secs", self.http.retry_delay_secs, MAX_DELAY_SECS)?;

        let mut limits = vec![("rate_limit.default".to_string(), &self.rate_limit.default)];
        limits.extend(
            self.rate_limit
                .sources
                .iter()
                .map(|(name, limit)| (format!("rate_limit.sources.{}", name), limit)),
        );
        for (section, limit) in limits {
            check_range(&format!("{}.min_delay_secs", section), limit.min_delay_secs, MAX_DELAY_SECS)?;
            check_range(&format!("{}.max_delay_secs", section), limit.max_delay_secs, MAX_DELAY_SECS)?;
            check_range(&format!("{}.backoff_factor", section), limit.backoff_factor, 100.0)?;
        }

        let scheduler = &self.scheduler;
        for (name, schedule) in [
            ("api_refresh", &scheduler.api_refresh),
            ("ota_scraping", &scheduler.ota_scraping),
            ("partner_sync", &scheduler.partner_sync),
            ("cache_cleanup", &scheduler.cache_cleanup),
            ("history_snapshot", &scheduler.history_snapshot),
        ] {
            check_range(
                &format!("scheduler.{}.interval_hours", name),
                schedule.interval_hours,
                MAX_INTERVAL_HOURS,
            )?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to `base_dir`. `~` is expanded.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// SHA-256 of the serialized config, for spotting changes between runs.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        hex::encode(Sha256::digest(json.as_bytes()))
    }
}

/// Resolved paths.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Config file in use, if any.
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl Settings {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            data_dir,
            config_path: None,
        }
    }

    pub fn database_exists(&self) -> bool {
        self.database_path.exists()
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;
        if let Some(parent) = self.database_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// `~/.local/share/umrahfare` or the platform equivalent.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("umrahfare")
}

/// Command-line overrides for loading.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    /// Resolve relative paths from the working directory instead of the
    /// config file's directory.
    pub use_cwd: bool,
}

/// Load settings and config using process environment variables.
pub fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    load_with_env(options, |key| {
        std::env::var(key).ok().filter(|s| !s.is_empty())
    })
}

/// Load settings and config, reading environment variables through `env`.
///
/// Precedence for the data directory: `--data-dir`, `UMRAHFARE_DATA_DIR`,
/// the config file, the platform default. `UMRAHFARE_DATABASE` beats the
/// config file's `database`.
pub fn load_with_env<F>(options: LoadOptions, env: F) -> Result<(Settings, Config), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let expand = |p: &str| PathBuf::from(shellexpand::tilde(p).as_ref());

    let cli_data_dir = options
        .data_dir
        .clone()
        .or_else(|| env(ENV_DATA_DIR).map(|d| expand(&d)));

    let config_path = options
        .config_path
        .clone()
        .or_else(|| env(ENV_CONFIG).map(|p| expand(&p)))
        .or_else(|| {
            let dir = cli_data_dir.clone().unwrap_or_else(default_data_dir);
            Some(dir.join(CONFIG_FILENAME)).filter(|p| p.exists())
        });

    let config = match &config_path {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Config::load_from_path(path)?
        }
        None => Config::default(),
    };

    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    let data_dir = cli_data_dir
        .or_else(|| {
            config
                .data_dir
                .as_deref()
                .map(|d| config.resolve_path(d, &base_dir))
        })
        .unwrap_or_else(default_data_dir);

    let mut settings = Settings::with_data_dir(data_dir);
    settings.config_path = config_path;
    if let Some(database) = env(ENV_DATABASE) {
        tracing::debug!("Using {} from environment: {}", ENV_DATABASE, database);
        settings.database_path = expand(&database);
    } else if let Some(database) = config.database.as_deref() {
        settings.database_path = config.resolve_path(database, &settings.data_dir);
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ApiProvider;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::from_toml(
            r#"
            data_dir = "./data"

            [aggregator]
            cache_ttl_secs = 120

            [rate_limit.sources.traveloka]
            requests_per_minute = 2

            [[sources.api]]
            provider = "xotelo"

            [scheduler.api_refresh]
            enabled = false
            interval_hours = 3.0
            "#,
            Path::new("/etc/umrahfare/umrahfare.toml"),
        )
        .unwrap();

        assert_eq!(config.aggregator.cache_ttl_secs, 120);
        assert_eq!(config.aggregator.max_concurrency, 3);
        assert_eq!(config.rate_limit.sources["traveloka"].requests_per_minute, 2);
        assert_eq!(config.rate_limit.sources["traveloka"].requests_per_hour, 100);
        assert_eq!(config.sources.api[0].provider, ApiProvider::Xotelo);
        assert!(config.sources.partner);
        assert!(!config.scheduler.api_refresh.enabled);
        assert_eq!(config.scheduler.partner_sync.interval_hours, 1.0);
        assert_eq!(config.base_dir(), Some(PathBuf::from("/etc/umrahfare")));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let err = Config::from_toml(
            "[rate_limit.default]\nmin_delay_secs = inf\n",
            Path::new("umrahfare.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("rate_limit.default.min_delay_secs"));

        let err = Config::from_toml("[http]\nretry_delay_secs = nan\n", Path::new("umrahfare.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("http.retry_delay_secs"));

        let err = Config::from_toml(
            "[rate_limit.sources.traveloka]\nbackoff_factor = -inf\n",
            Path::new("umrahfare.toml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("rate_limit.sources.traveloka.backoff_factor"));

        let err = Config::from_toml(
            "[scheduler.api_refresh]\nenabled = true\ninterval_hours = inf\n",
            Path::new("umrahfare.toml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("scheduler.api_refresh.interval_hours"));

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = Config::from_toml("aggregator = 3", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config bad.toml"));
    }

    #[test]
    fn test_data_dir_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILENAME);
        fs::write(&config_path, "data_dir = \"store\"\ndatabase = \"fares.db\"\n").unwrap();

        let (settings, _) = load_with_env(
            LoadOptions {
                config_path: Some(config_path.clone()),
                ..Default::default()
            },
            no_env,
        )
        .unwrap();
        assert_eq!(settings.data_dir, dir.path().join("store"));
        assert_eq!(settings.database_path, dir.path().join("store").join("fares.db"));
        assert_eq!(settings.config_path, Some(config_path.clone()));

        let override_dir = dir.path().join("override");
        let (settings, _) = load_with_env(
            LoadOptions {
                config_path: Some(config_path),
                data_dir: Some(override_dir.clone()),
                ..Default::default()
            },
            no_env,
        )
        .unwrap();
        assert_eq!(settings.data_dir, override_dir);
    }

    #[test]
    fn test_config_found_in_data_dir_and_env_database() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            "[aggregator]\nmax_concurrency = 5\n",
        )
        .unwrap();

        let (settings, config) = load_with_env(
            LoadOptions {
                data_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            |key| (key == ENV_DATABASE).then(|| "/tmp/other.db".to_string()),
        )
        .unwrap();
        assert_eq!(config.aggregator.max_concurrency, 5);
        assert_eq!(settings.database_path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = load_with_env(
            LoadOptions {
                config_path: Some(PathBuf::from("/nonexistent/umrahfare.toml")),
                ..Default::default()
            },
            no_env,
        );
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_hash_tracks_changes() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.hash(), b.hash());
        b.aggregator.cache_ttl_secs = 60;
        assert_ne!(a.hash(), b.hash());
    }
}
