//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! scan limits, the request cool-down, logging format, and default paths.
//! `AppConfig` is the root configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// HTTP Response Cache Control
// =============================================================================

/// Scan results reflect live history and must never be served from a cache
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

// =============================================================================
// Scan Limits
// =============================================================================

/// Messages pulled per scan when the request does not ask for a count
pub const DEFAULT_MESSAGE_LIMIT: u64 = 5000;

/// Upper bound on messages pulled per scan, whatever the request asks for
pub const MAX_MESSAGE_LIMIT: u64 = 10000;

/// Minimum interval between accepted scan requests, measured from the start
/// of the last accepted request
pub const SCAN_COOLDOWN_SECS: u64 = 10;

/// Emit a progress event every this many scanned messages
pub const SCAN_PROGRESS_INTERVAL: u64 = 100;

// =============================================================================
// Result Formatting
// =============================================================================

/// Format of `last_message_date` in scan results (UTC)
pub const LAST_MESSAGE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder for senders whose messages carried no date
pub const UNKNOWN_DATE: &str = "Unknown";

/// Public link prefix stripped from group identifiers
pub const TELEGRAM_LINK_PREFIX: &str = "https://t.me/";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Crate name as it appears in log targets
pub const CRATE_NAME: &str = "tg_roster";

/// Product name shown to API clients
pub const PRODUCT_NAME: &str = "tg-roster";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default directory holding archived group histories
pub const DEFAULT_ARCHIVE_DIR: &str = "data/archive";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = formatcp!("{}=debug,tower_http=debug", CRATE_NAME);

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Message returned by the health endpoint
pub const HEALTH_MESSAGE: &str = formatcp!("{} API is running", PRODUCT_NAME);

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Scan limits and request throttling
    #[serde(default)]
    pub scan: ScanConfig,
    /// Archived history session provider
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

/// Scan limits and request throttling
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Messages pulled when a request gives no `message_limit` (default: 5000)
    #[serde(default = "ScanConfig::default_message_limit")]
    pub default_message_limit: u64,
    /// Hard cap on `message_limit` (default: 10000)
    #[serde(default = "ScanConfig::default_max_message_limit")]
    pub max_message_limit: u64,
    /// Cool-down between accepted requests in seconds (default: 10)
    #[serde(default = "ScanConfig::default_cooldown")]
    pub cooldown_seconds: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_message_limit: Self::default_message_limit(),
            max_message_limit: Self::default_max_message_limit(),
            cooldown_seconds: Self::default_cooldown(),
        }
    }
}

impl ScanConfig {
    fn default_message_limit() -> u64 {
        DEFAULT_MESSAGE_LIMIT
    }

    fn default_max_message_limit() -> u64 {
        MAX_MESSAGE_LIMIT
    }

    fn default_cooldown() -> u64 {
        SCAN_COOLDOWN_SECS
    }
}

/// Archived history session provider
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Directory of `<group>.json` history files
    #[serde(default = "ArchiveConfig::default_dir")]
    pub dir: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
        }
    }
}

impl ArchiveConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from(DEFAULT_ARCHIVE_DIR)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    /// Whether structured JSON output was requested
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scan = &self.scan;
        if scan.default_message_limit == 0 || scan.max_message_limit == 0 {
            return Err(ConfigError::Validation(
                "scan.default_message_limit and scan.max_message_limit must be positive".to_string(),
            ));
        }
        if scan.default_message_limit > scan.max_message_limit {
            return Err(ConfigError::Validation(format!(
                "scan.default_message_limit ({}) exceeds scan.max_message_limit ({})",
                scan.default_message_limit, scan.max_message_limit
            )));
        }
        match self.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
