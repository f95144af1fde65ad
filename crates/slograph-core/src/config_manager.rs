use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::{MAX_TRAVERSAL_DEPTH, MIN_TRAVERSAL_DEPTH};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for SloGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SloGraphConfig {
    /// Availability analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Subgraph traversal defaults
    #[serde(default)]
    pub traversal: TraversalConfig,

    /// Ingestion and staleness settings
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// SLO target (percent) used when a request does not name one
    #[serde(default = "default_slo_target")]
    pub default_slo_target: f64,

    /// Telemetry lookback window in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Upper bound on a single telemetry lookup
    #[serde(default = "default_telemetry_timeout_ms")]
    pub telemetry_timeout_ms: u64,

    /// Availability assumed when telemetry is missing or times out
    #[serde(default = "default_fallback_availability")]
    pub fallback_availability: f64,

    /// Telemetry lookups allowed in flight per analysis
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_slo_target: default_slo_target(),
            lookback_days: default_lookback_days(),
            telemetry_timeout_ms: default_telemetry_timeout_ms(),
            fallback_availability: default_fallback_availability(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
        }
    }
}

impl AnalysisConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(u64::from(self.lookback_days) * 24 * 60 * 60)
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_traversal_depth")]
    pub default_depth: u32,

    #[serde(default)]
    pub include_stale: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_depth: default_traversal_depth(),
            include_stale: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Edges unobserved for longer than this are flagged stale
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_slo_target() -> f64 {
    99.9
}
fn default_lookback_days() -> u32 {
    30
}
fn default_telemetry_timeout_ms() -> u64 {
    2_000
}
fn default_fallback_availability() -> f64 {
    0.999
}
fn default_max_concurrent_lookups() -> usize {
    16
}
fn default_traversal_depth() -> u32 {
    3
}
fn default_stale_after_hours() -> u64 {
    72
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: SloGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.slograph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading SloGraph configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(path = %path.display(), "Configuration loaded"),
            None => info!("Configuration loaded from defaults"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".slograph.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .slograph.env: {}", e);
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.slograph.toml
    /// 2. ~/.slograph/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(SloGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".slograph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".slograph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((SloGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<SloGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: SloGraphConfig) -> SloGraphConfig {
        if let Some(target) = env_parse("SLOGRAPH_SLO_TARGET") {
            config.analysis.default_slo_target = target;
        }
        if let Some(days) = env_parse("SLOGRAPH_LOOKBACK_DAYS") {
            config.analysis.lookback_days = days;
        }
        if let Some(ms) = env_parse("SLOGRAPH_TELEMETRY_TIMEOUT_MS") {
            config.analysis.telemetry_timeout_ms = ms;
        }
        if let Some(depth) = env_parse("SLOGRAPH_TRAVERSAL_DEPTH") {
            config.traversal.default_depth = depth;
        }
        if let Some(hours) = env_parse("SLOGRAPH_STALE_AFTER_HOURS") {
            config.ingestion.stale_after_hours = hours;
        }
        if let Ok(format) = std::env::var("SLOGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            // Only plain levels; filter directives are left to EnvFilter.
            if !level.contains('=') && !level.contains(',') {
                config.logging.level = level.to_lowercase();
            }
        }

        config
    }

    fn validate_config(config: &SloGraphConfig) -> Result<(), ConfigError> {
        let target = config.analysis.default_slo_target;
        if !(target > 0.0 && target <= 100.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid default SLO target: {}. Must be in (0, 100]",
                target
            )));
        }

        let fallback = config.analysis.fallback_availability;
        if !(0.0..=1.0).contains(&fallback) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid fallback availability: {}. Must be in [0, 1]",
                fallback
            )));
        }

        if config.analysis.max_concurrent_lookups == 0 {
            return Err(ConfigError::ValidationError(
                "At least one concurrent telemetry lookup is required".to_string(),
            ));
        }

        if config.analysis.telemetry_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Telemetry timeout must be positive".to_string(),
            ));
        }

        if !(MIN_TRAVERSAL_DEPTH..=MAX_TRAVERSAL_DEPTH).contains(&config.traversal.default_depth) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid traversal depth: {}. Must be in {}..={}",
                config.traversal.default_depth, MIN_TRAVERSAL_DEPTH, MAX_TRAVERSAL_DEPTH
            )));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &SloGraphConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = SloGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={}", name, raw);
            None
        }
    }
}
