//! Configuration management for memwatch.
//!
//! This module handles loading, validating and atomically reloading
//! configuration from YAML, JSON or TOML files. All runtime components read
//! configuration through [`ConfigService`] so that a reload is observed
//! everywhere at once.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::process::classifier::{default_rules, ProcessClassifier, RuleEntry};
use crate::roles::Role;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9230;

/// Default locations probed when no config file is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 4] = [
    "/etc/memwatch/memwatch.yaml",
    "/etc/memwatch/memwatch.yml",
    "./memwatch.yaml",
    "./memwatch.json",
];

/// Errors that prevent the monitor from starting or a reload from applying.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("history capacity must be positive")]
    ZeroCapacity,
    #[error("sampling interval must be positive")]
    ZeroInterval,
    #[error("read timeout must be positive")]
    ZeroReadTimeout,
    #[error("rule table is empty")]
    EmptyRuleTable,
    #[error("rule #{index} has no match pattern")]
    EmptyRule { index: usize },
    #[error("no rule assigns role '{0}'")]
    RoleWithoutRule(Role),
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid trend threshold: {0}")]
    InvalidThreshold(String),
    #[error("publish queue capacity must be at least {0}")]
    QueueTooSmall(usize),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub enable_health: bool,
    pub enable_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            enable_health: true,
            enable_metrics: true,
        }
    }
}

/// Sampler timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Tick interval in milliseconds (default: 1000)
    pub interval_ms: u64,
    /// Upper bound for one role's memory/CPU read in milliseconds (default: 500)
    pub read_timeout_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            read_timeout_ms: 500,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Per-role history retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples retained per role (default: 3600, one hour at 1s)
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 3600 }
    }
}

/// Leak-detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Short analysis window in seconds; drives classification (default: 300)
    pub short_window_secs: u64,
    /// Long analysis window in seconds; reported for context (default: 3600)
    pub long_window_secs: u64,
    /// Minimum samples in a window before any verdict is given (default: 10)
    pub min_samples: usize,
    /// Slope above which memory counts as growing, bytes/s (default: 51200)
    pub growth_threshold_bytes_per_sec: f64,
    /// Consecutive growing evaluations before reporting a leak (default: 3)
    pub leak_debounce_cycles: usize,
    /// Sample count at which the population factor of confidence reaches 1.0 (default: 30)
    pub confident_sample_count: usize,
    /// Growth with confidence below this is reported as stable (default: 0.3)
    pub min_confidence: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            short_window_secs: 300,
            long_window_secs: 3600,
            min_samples: 10,
            growth_threshold_bytes_per_sec: 51_200.0,
            leak_debounce_cycles: 3,
            confident_sample_count: 30,
            min_confidence: 0.3,
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Outbound messages buffered per subscriber before it is dropped (default: 64)
    pub queue_capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub server: ServerConfig,
    pub sampling: SamplingConfig,
    pub history: HistoryConfig,
    pub trend: TrendConfig,
    pub publish: PublishConfig,
    pub rules: Vec<RuleEntry>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sampling: SamplingConfig::default(),
            history: HistoryConfig::default(),
            trend: TrendConfig::default(),
            publish: PublishConfig::default(),
            rules: default_rules(),
        }
    }
}

impl MonitorConfig {
    /// Checks every bound the monitor relies on and compiles the rule table.
    pub fn validate(&self) -> Result<ProcessClassifier, ConfigError> {
        if self.history.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.sampling.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }

        let t = &self.trend;
        if !t.growth_threshold_bytes_per_sec.is_finite() || t.growth_threshold_bytes_per_sec <= 0.0
        {
            return Err(ConfigError::InvalidThreshold(
                "growth_threshold_bytes_per_sec must be a positive number".into(),
            ));
        }
        if t.min_samples < 2 {
            return Err(ConfigError::InvalidThreshold(
                "min_samples must be at least 2".into(),
            ));
        }
        if t.leak_debounce_cycles == 0 {
            return Err(ConfigError::InvalidThreshold(
                "leak_debounce_cycles must be at least 1".into(),
            ));
        }
        if t.short_window_secs == 0 || t.short_window_secs > t.long_window_secs {
            return Err(ConfigError::InvalidThreshold(
                "short_window_secs must be positive and not exceed long_window_secs".into(),
            ));
        }
        if t.confident_sample_count == 0 {
            return Err(ConfigError::InvalidThreshold(
                "confident_sample_count must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&t.min_confidence) {
            return Err(ConfigError::InvalidThreshold(
                "min_confidence must be within [0, 1]".into(),
            ));
        }

        if self.publish.queue_capacity < Role::ALL.len() {
            return Err(ConfigError::QueueTooSmall(Role::ALL.len()));
        }

        ProcessClassifier::new(&self.rules)
    }
}

/// Configuration format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => FileFormat::Json,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Yaml,
        }
    }
}

/// Parses configuration text in the given format.
pub fn parse_config(content: &str, format: FileFormat, path: &Path) -> Result<MonitorConfig, ConfigError> {
    let parse_err = |reason: String| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    match format {
        FileFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        FileFormat::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        FileFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

/// Renders configuration in the given format.
pub fn render_config(config: &MonitorConfig, format: FileFormat) -> Result<String, ConfigError> {
    let out = match format {
        FileFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
        }
        FileFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
        }
        FileFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
        }
    };
    Ok(out)
}

/// Loads configuration from a file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    if !path.exists() {
        return Ok(MonitorConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content, FileFormat::from_path(path), path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Returns the first default config location that exists.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Values applied on top of whatever the file says.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub interval_ms: Option<u64>,
    pub capacity: Option<usize>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.sampling.interval_ms = interval_ms;
        }
        if let Some(capacity) = self.capacity {
            config.history.capacity = capacity;
        }
    }
}

/// A validated configuration together with its compiled rule table.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    pub config: MonitorConfig,
    pub classifier: ProcessClassifier,
}

/// Single source of configuration for all components.
///
/// Readers take a cheap `Arc` of the active config per use and never keep
/// their own copy. `reload()` builds and validates a complete replacement
/// before swapping it in, so there is no window with a partial table.
pub struct ConfigService {
    source: Option<PathBuf>,
    overrides: ConfigOverrides,
    active: RwLock<Arc<ActiveConfig>>,
    stale: AtomicBool,
}

impl ConfigService {
    /// Loads and validates the initial configuration. Errors here are the
    /// only ones that prevent the monitor from starting.
    pub fn load(source: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let active = Self::build(source.as_deref(), &overrides)?;
        Ok(Self {
            source,
            overrides,
            active: RwLock::new(Arc::new(active)),
            stale: AtomicBool::new(false),
        })
    }

    /// Wraps an in-memory configuration with no backing file.
    pub fn from_config(config: MonitorConfig) -> Result<Self, ConfigError> {
        let classifier = config.validate()?;
        Ok(Self {
            source: None,
            overrides: ConfigOverrides::default(),
            active: RwLock::new(Arc::new(ActiveConfig { config, classifier })),
            stale: AtomicBool::new(false),
        })
    }

    fn build(source: Option<&Path>, overrides: &ConfigOverrides) -> Result<ActiveConfig, ConfigError> {
        let mut config = match source {
            Some(path) => load_config(path)?,
            None => MonitorConfig::default(),
        };
        overrides.apply(&mut config);
        let classifier = config.validate()?;
        Ok(ActiveConfig { config, classifier })
    }

    /// Returns the active configuration, re-reading the source first if it
    /// was invalidated.
    pub fn current(&self) -> Arc<ActiveConfig> {
        if self.stale.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.reload() {
                warn!("Reload after invalidation failed, keeping previous config: {}", e);
            }
        }
        match self.active.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-reads the source and swaps in the new config. On error the previous
    /// config stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let next = Self::build(self.source.as_deref(), &self.overrides)?;
        self.swap(next);
        info!("Configuration reloaded");
        Ok(())
    }

    /// Marks the active config stale; the next `current()` reloads it.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Validates `config`, writes it to the backing file and makes it active
    /// under one write lock so readers never see the old value after the
    /// file has changed.
    pub fn persist(&self, config: MonitorConfig) -> Result<(), ConfigError> {
        let mut effective = config.clone();
        self.overrides.apply(&mut effective);
        let classifier = effective.validate()?;

        let mut guard = match self.active.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(path) = &self.source {
            let rendered = render_config(&config, FileFormat::from_path(path))?;
            fs::write(path, rendered).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        }
        *guard = Arc::new(ActiveConfig {
            config: effective,
            classifier,
        });
        self.stale.store(false, Ordering::Release);
        Ok(())
    }

    fn swap(&self, next: ActiveConfig) {
        let mut guard = match self.active.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(next);
    }

    /// Backing file, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
