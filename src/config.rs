//! # Coordinator Configuration
//!
//! Configuration for the batch API client, transaction journal, and
//! operation queue. Supports environment variables, toml config files, and
//! compiled defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{
    DEFAULT_STATUS_RETRIES, DEFAULT_TIMEOUT_MS, JOURNAL_CAPACITY, QUEUE_WARN_DEPTH,
};
use crate::error::{CoordinatorError, Result};

/// Top-level coordinator configuration
///
/// # Examples
///
/// ```rust
/// use chartbatch_core::config::CoordinatorConfig;
///
/// // Default configuration
/// let config = CoordinatorConfig::default();
/// assert_eq!(config.api.base_url, "http://localhost:8080");
/// assert_eq!(config.journal.capacity, 20);
/// ```
///
/// ```rust,no_run
/// use chartbatch_core::config::CoordinatorConfig;
///
/// // Load configuration from environment and config files
/// let config = CoordinatorConfig::load().expect("Failed to load config");
/// println!("API URL: {}", config.api.base_url);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Charting batch API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Transaction journal configuration
    #[serde(default)]
    pub journal: JournalConfig,
    /// Operation queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Batch API endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the charting API (e.g., "<http://localhost:8080>")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum attempts for transaction status reads. Writes are never
    /// retried regardless of this value.
    pub max_retries: u32,
    /// Bearer token for the API (if required)
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_STATUS_RETRIES,
            auth_token: None,
        }
    }
}

/// Transaction journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal file location; `None` selects the platform data directory.
    pub path: Option<PathBuf>,
    /// Maximum retained entries; oldest are evicted first.
    pub capacity: usize,
    /// Disable to keep the journal purely in memory.
    pub persist: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: JOURNAL_CAPACITY,
            persist: true,
        }
    }
}

/// Operation queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue depth at which enqueueing logs a warning.
    pub warn_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            warn_depth: QUEUE_WARN_DEPTH,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables and config file
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`CHARTBATCH_*`)
    /// 2. Config file (`./chartbatch.toml` and standard locations)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::find_config_file() {
            debug!("Loading config from: {}", config_path.display());
            match Self::load_from_file(&config_path) {
                Ok(file_config) => config = file_config,
                Err(e) => {
                    debug!("Failed to load config file: {}", e);
                    // Continue with defaults if config file fails
                }
            }
        }

        config.apply_env_overrides();

        debug!("Loaded coordinator configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::config_error(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            CoordinatorError::config_error(format!("Failed to parse config file: {e}"))
        })?;

        Ok(config)
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![
            // Current directory
            PathBuf::from("./chartbatch.toml"),
            PathBuf::from("./config/chartbatch.toml"),
        ];
        // User home and platform config directories
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".chartbatch").join("config.toml"));
        }
        if let Some(config) = dirs::config_dir() {
            candidates.push(config.join("chartbatch").join("config.toml"));
        }

        candidates.into_iter().find(|path| path.is_file())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CHARTBATCH_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(timeout) = std::env::var("CHARTBATCH_API_TIMEOUT_MS") {
            if let Ok(timeout_ms) = timeout.parse() {
                self.api.timeout_ms = timeout_ms;
            }
        }
        if let Ok(token) = std::env::var("CHARTBATCH_API_TOKEN") {
            self.api.auth_token = Some(token);
        }
        if let Ok(path) = std::env::var("CHARTBATCH_JOURNAL_PATH") {
            self.journal.path = Some(PathBuf::from(path));
        }
        if let Ok(capacity) = std::env::var("CHARTBATCH_JOURNAL_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                self.journal.capacity = capacity;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoordinatorError::config_error(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            CoordinatorError::config_error(format!("Failed to serialize config: {e}"))
        })?;

        std::fs::write(path, content).map_err(|e| {
            CoordinatorError::config_error(format!("Failed to write config file: {e}"))
        })?;

        Ok(())
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| CoordinatorError::config_error("Could not determine home directory"))?;

        Ok(home_dir.join(".chartbatch").join("config.toml"))
    }
}
