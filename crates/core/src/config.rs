//! Configuration management
//!
//! This module handles loading, saving, and migrating the awss configuration
//! file. The file is stored in TOML format at `~/.config/awss/config.toml`
//! (or under `$AWSS_CONFIG_DIR`) and holds user preferences and engine
//! settings. The bucket cache lives next to it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::bucket::{AccessLevel, Bucket};
use crate::cache::DEFAULT_MAX_AGE_DAYS;
use crate::error::{Error, Result};
use crate::scan::DEFAULT_SCAN_MAX_KEYS;

/// Current configuration schema version
///
/// Files written with an older version are upgraded on load.
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "AWSS_CONFIG_DIR";

const APP_DIR: &str = "awss";
const CONFIG_FILE: &str = "config.toml";
const CACHE_FILE: &str = "bucket-cache.json";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Favorite bucket names
    #[serde(default)]
    pub favorites: BTreeSet<String>,

    /// Bucket list view filters
    #[serde(default)]
    pub filters: BucketFilters,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            favorites: BTreeSet::new(),
            filters: BucketFilters::default(),
            engine: EngineSettings::default(),
        }
    }
}

/// Which buckets the bucket list hides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketFilters {
    pub hide_no_view: bool,
    pub hide_no_download: bool,
    pub hide_empty: bool,
    pub favorites_only: bool,
}

impl BucketFilters {
    pub fn is_active(&self) -> bool {
        self.hide_no_view || self.hide_no_download || self.hide_empty || self.favorites_only
    }

    /// Drop the buckets these filters hide, keeping order
    pub fn apply(&self, buckets: Vec<Bucket>, favorites: &BTreeSet<String>) -> Vec<Bucket> {
        buckets
            .into_iter()
            .filter(|b| self.shows(b, favorites))
            .collect()
    }

    fn shows(&self, bucket: &Bucket, favorites: &BTreeSet<String>) -> bool {
        if self.favorites_only && !favorites.contains(&bucket.name) {
            return false;
        }
        if self.hide_empty && bucket.is_empty == Some(true) {
            return false;
        }
        match bucket.access_level {
            AccessLevel::NoView => !self.hide_no_view,
            AccessLevel::NoDownload => !self.hide_no_download,
            AccessLevel::Good | AccessLevel::Unknown => true,
        }
    }
}

/// Limits and defaults for refresh, probing and scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Age after which the cache is refreshed
    pub cache_max_age_days: u32,

    /// Probes in flight at once
    pub probe_concurrency: usize,

    pub probe_timeout_ms: u64,

    /// Per-page timeout for scans and listings
    pub scan_timeout_ms: u64,

    /// Keys counted before a scan is truncated
    pub scan_max_keys: usize,

    /// Explicit profile list, replacing discovery when non-empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,

    /// Region pinned for every profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_max_age_days: DEFAULT_MAX_AGE_DAYS,
            probe_concurrency: 16,
            probe_timeout_ms: 10_000,
            scan_timeout_ms: 30_000,
            scan_max_keys: DEFAULT_SCAN_MAX_KEYS,
            profiles: Vec::new(),
            region: None,
        }
    }
}

impl EngineSettings {
    pub fn cache_max_age(&self) -> SignedDuration {
        SignedDuration::from_hours(24 * i64::from(self.cache_max_age_days))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Concurrency limit, never below one
    pub fn concurrency(&self) -> usize {
        self.probe_concurrency.max(1)
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        Ok(Self::in_dir(Self::default_dir()?))
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Create a ConfigManager rooted at an awss directory
    pub fn in_dir(dir: PathBuf) -> Self {
        Self::with_path(dir.join(CONFIG_FILE))
    }

    /// `$AWSS_CONFIG_DIR`, or `awss` under the platform config directory
    pub fn default_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".into()))?;
        Ok(config_dir.join(APP_DIR))
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Path of the bucket cache next to the configuration file
    pub fn cache_path(&self) -> PathBuf {
        self.config_path.with_file_name(CACHE_FILE)
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade awss.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        config.favorites = normalize_favorites(std::mem::take(&mut config.favorites));
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist, writes through a temp
    /// file and sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, permissions)?;
        }

        std::fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }

    pub fn favorites(&self) -> Result<BTreeSet<String>> {
        Ok(self.load()?.favorites)
    }

    /// Add or remove a favorite; returns whether it is now a favorite
    pub fn toggle_favorite(&self, bucket: &str) -> Result<bool> {
        let name = bucket.trim();
        if name.is_empty() {
            return Err(Error::InvalidBucket("bucket name cannot be empty".into()));
        }
        let mut config = self.load()?;
        let added = if config.favorites.remove(name) {
            false
        } else {
            config.favorites.insert(name.to_string());
            true
        };
        self.save(&config)?;
        tracing::debug!(bucket = name, added, "Updated favorites");
        Ok(added)
    }

    /// Make `bucket` a favorite or not; returns whether anything changed
    pub fn set_favorite(&self, bucket: &str, favorite: bool) -> Result<bool> {
        let is_favorite = self.favorites()?.contains(bucket.trim());
        if is_favorite == favorite {
            return Ok(false);
        }
        self.toggle_favorite(bucket)?;
        Ok(true)
    }

    pub fn filters(&self) -> Result<BucketFilters> {
        Ok(self.load()?.filters)
    }

    pub fn set_filters(&self, filters: BucketFilters) -> Result<()> {
        let mut config = self.load()?;
        config.filters = filters;
        self.save(&config)
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}

fn normalize_favorites(favorites: BTreeSet<String>) -> BTreeSet<String> {
    favorites
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::in_dir(temp_dir.path().join("awss"));
        (manager, temp_dir)
    }

    fn bucket(name: &str, level: AccessLevel, empty: Option<bool>) -> Bucket {
        Bucket {
            is_empty: empty,
            access_level: level,
            ..Bucket::unknown(name)
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert!(config.favorites.is_empty());
        assert!(!config.filters.is_active());
        assert_eq!(config.engine.cache_max_age_days, 30);
        assert_eq!(config.engine.scan_max_keys, 50_000);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cache_path_is_sibling() {
        let (manager, temp_dir) = temp_config_manager();
        assert_eq!(
            manager.cache_path(),
            temp_dir.path().join("awss").join("bucket-cache.json")
        );
    }

    #[test]
    fn test_save_and_load() {
        let (manager, _temp_dir) = temp_config_manager();

        let mut config = Config::default();
        config.favorites.insert("alpha".into());
        config.filters.hide_empty = true;
        config.engine.profiles = vec!["dev".into(), "prod".into()];
        config.engine.region = Some("eu-west-1".into());

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
        assert!(!manager.config_path().with_extension("toml.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (manager, _temp_dir) = temp_config_manager();
        manager.save(&Config::default()).unwrap();
        let mode = std::fs::metadata(manager.config_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::create_dir_all(manager.config_path().parent().unwrap()).unwrap();
        std::fs::write(
            manager.config_path(),
            r#"
            schema_version = 1
            favorites = [" alpha ", ""]

            [engine]
            probe_concurrency = 4
            "#,
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.favorites, BTreeSet::from(["alpha".to_string()]));
        assert_eq!(config.engine.probe_concurrency, 4);
        assert_eq!(config.engine.probe_timeout_ms, 10_000);
        assert_eq!(config.filters, BucketFilters::default());
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::create_dir_all(manager.config_path().parent().unwrap()).unwrap();

        let content = format!("schema_version = {}\n", SCHEMA_VERSION + 1);
        std::fs::write(manager.config_path(), content).unwrap();

        let result = manager.load();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("newer than supported")
        );
    }

    #[test]
    fn test_toggle_favorite() {
        let (manager, _temp_dir) = temp_config_manager();
        assert!(manager.toggle_favorite(" alpha ").unwrap());
        assert!(manager.favorites().unwrap().contains("alpha"));
        assert!(!manager.toggle_favorite("alpha").unwrap());
        assert!(manager.favorites().unwrap().is_empty());
        assert!(manager.toggle_favorite("  ").is_err());
    }

    #[test]
    fn test_set_favorite_is_idempotent() {
        let (manager, _temp_dir) = temp_config_manager();
        assert!(manager.set_favorite("alpha", true).unwrap());
        assert!(!manager.set_favorite("alpha", true).unwrap());
        assert!(manager.set_favorite("alpha", false).unwrap());
        assert!(manager.favorites().unwrap().is_empty());
    }

    #[test]
    fn test_set_filters_round_trip() {
        let (manager, _temp_dir) = temp_config_manager();
        let filters = BucketFilters {
            hide_no_view: true,
            favorites_only: true,
            ..Default::default()
        };
        manager.set_filters(filters).unwrap();
        assert_eq!(manager.filters().unwrap(), filters);
    }

    #[test]
    fn test_filters_apply() {
        let buckets = vec![
            bucket("alpha", AccessLevel::Good, None),
            bucket("beta", AccessLevel::NoDownload, Some(true)),
            bucket("gamma", AccessLevel::NoView, None),
            bucket("delta", AccessLevel::Unknown, None),
        ];
        let favorites = BTreeSet::from(["alpha".to_string(), "gamma".to_string()]);
        let names = |filters: BucketFilters| -> Vec<String> {
            filters
                .apply(buckets.clone(), &favorites)
                .into_iter()
                .map(|b| b.name)
                .collect()
        };

        assert_eq!(names(BucketFilters::default()).len(), 4);
        assert_eq!(
            names(BucketFilters {
                hide_no_view: true,
                ..Default::default()
            }),
            vec!["alpha", "beta", "delta"]
        );
        assert_eq!(
            names(BucketFilters {
                hide_empty: true,
                ..Default::default()
            }),
            vec!["alpha", "gamma", "delta"]
        );
        assert_eq!(
            names(BucketFilters {
                favorites_only: true,
                hide_no_view: true,
                ..Default::default()
            }),
            vec!["alpha"]
        );
    }
}
