//! Configuration file for docscout.
//!
//! One TOML file with `[search]`, `[api_keys]`, `[credits]`, `[discovery]`
//! and `[store]` sections. Every field has a default, so an empty file is
//! a valid configuration. The config is loaded once at start and shared
//! read-only afterwards.

use std::path::{Path, PathBuf};

use docscout_search::{Provider, SearchConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub search: SearchConfig,
    pub api_keys: ApiKeys,
    pub credits: CostSchedule,
    pub discovery: DiscoveryConfig,
    pub store: StoreConfig,
}

/// Provider and mapper credentials.
///
/// Any key may be supplied through the environment instead of the file;
/// see [`ApiKeys::apply_env_overrides`].
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub serper: Option<String>,
    pub brave: Option<String>,
    pub yandex: Option<String>,
    pub yandex_folder_id: Option<String>,
    pub firecrawl: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("ApiKeys")
            .field("serper", &mask(&self.serper))
            .field("brave", &mask(&self.brave))
            .field("yandex", &mask(&self.yandex))
            .field("yandex_folder_id", &self.yandex_folder_id)
            .field("firecrawl", &mask(&self.firecrawl))
            .finish()
    }
}

impl ApiKeys {
    /// Replace keys with non-empty values from `SERPER_API_KEY`,
    /// `BRAVE_API_KEY`, `YANDEX_API_KEY`, `YANDEX_FOLDER_ID` and
    /// `FIRECRAWL_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = read("SERPER_API_KEY") {
            self.serper = Some(v);
        }
        if let Some(v) = read("BRAVE_API_KEY") {
            self.brave = Some(v);
        }
        if let Some(v) = read("YANDEX_API_KEY") {
            self.yandex = Some(v);
        }
        if let Some(v) = read("YANDEX_FOLDER_ID") {
            self.yandex_folder_id = Some(v);
        }
        if let Some(v) = read("FIRECRAWL_API_KEY") {
            self.firecrawl = Some(v);
        }
    }
}

/// Credit cost per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSchedule {
    /// Flat cost of a request served from the result cache.
    pub cache_hit: u64,
    pub google: u64,
    pub brave: u64,
    pub yandex: u64,
    pub duckduckgo: u64,
    /// Cost per site-mapping call. Probes are free.
    pub discovery_map: u64,
    /// Balance given to new accounts by the in-memory ledger.
    pub starting_balance: u64,
}

impl Default for CostSchedule {
    fn default() -> Self {
        Self {
            cache_hit: 1,
            google: 10,
            brave: 10,
            yandex: 10,
            duckduckgo: 2,
            discovery_map: 5,
            starting_balance: 1_000,
        }
    }
}

impl CostSchedule {
    /// Unit cost of one page from `provider`.
    pub fn provider_cost(&self, provider: Provider) -> u64 {
        match provider {
            Provider::Google => self.google,
            Provider::Brave => self.brave,
            Provider::Yandex => self.yandex,
            Provider::DuckDuckGo => self.duckduckgo,
        }
    }
}

/// Source discovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Sources (directory paths) mapped per domain.
    pub max_sources_per_domain: usize,
    /// Upper bound on paths returned by one mapping call.
    pub max_paths_per_map: usize,
    /// Global cap on concurrent probes within one run.
    pub probe_concurrency: usize,
    /// Domains processed in parallel within one run.
    pub domain_concurrency: usize,
    pub map_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    /// Domains scanned more recently than this are skipped.
    pub rescan_after_hours: u64,
    pub min_bytes: u64,
    /// `None` means no upper bound.
    pub max_bytes: Option<u64>,
    /// Accept a confirmed document whose size the server does not report.
    pub accept_unknown_size: bool,
    /// Capacity of the progress event channel.
    pub event_buffer: usize,
    /// Override for the Firecrawl map endpoint.
    pub firecrawl_endpoint: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_sources_per_domain: 3,
            max_paths_per_map: 5_000,
            probe_concurrency: 50,
            domain_concurrency: 4,
            map_timeout_seconds: 60,
            probe_timeout_seconds: 10,
            rescan_after_hours: 24,
            min_bytes: 0,
            max_bytes: None,
            accept_unknown_size: true,
            event_buffer: 256,
            firecrawl_endpoint: None,
        }
    }
}

/// Discovery store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file path. Defaults to `discovery.db` in the data directory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::scout_dirs::discovery_db_file)
    }
}

impl ScoutConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScoutError::Config(e.to_string()))
    }

    /// Load `path` if given, the default file if it exists, or defaults.
    /// Environment key overrides are applied in every case.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_config_path();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if default_path.exists() => Self::from_file(&default_path)?,
            None => Self::default(),
        };
        config.api_keys.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScoutError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::scout_dirs::config_file()
    }

    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] for the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        // Any dispatch includes at least one provider, so this keeps a
        // cache hit strictly cheaper than the fresh aggregation.
        if let Some(cheapest) = self
            .search
            .providers
            .iter()
            .min_by_key(|p| self.credits.provider_cost(**p))
        {
            let cost = self.credits.provider_cost(*cheapest);
            if self.credits.cache_hit >= cost {
                return Err(ScoutError::Config(format!(
                    "credits.cache_hit ({}) must be below the cost of every enabled provider \
                     ({cheapest} costs {cost})",
                    self.credits.cache_hit
                )));
            }
        }
        let d = &self.discovery;
        for (name, value) in [
            ("discovery.max_sources_per_domain", d.max_sources_per_domain),
            ("discovery.max_paths_per_map", d.max_paths_per_map),
            ("discovery.probe_concurrency", d.probe_concurrency),
            ("discovery.domain_concurrency", d.domain_concurrency),
            ("discovery.event_buffer", d.event_buffer),
        ] {
            if value == 0 {
                return Err(ScoutError::Config(format!("{name} must be greater than 0")));
            }
        }
        if d.probe_timeout_seconds == 0 || d.map_timeout_seconds == 0 {
            return Err(ScoutError::Config(
                "discovery timeouts must be greater than 0".into(),
            ));
        }
        if d.max_bytes.is_some_and(|max| max < d.min_bytes) {
            return Err(ScoutError::Config(
                "discovery.max_bytes must not be below min_bytes".into(),
            ));
        }
        Ok(())
    }
}
