//! Configuration file loading.
//!
//! Every field has a default, so an empty or missing `coach.toml` yields a
//! working setup against a Stockfish binary on `PATH`.

use chess_analysis::{AnalyzerConfig, ClassificationThresholds, EngineSettings, EvenMoveConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::queue::QueuePolicy;
use crate::worker::PoolSettings;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Engine process settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to a UCI engine. Defaults to "stockfish" (assumes it's in PATH).
    #[serde(default = "default_engine_path")]
    pub path: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_hash_mb")]
    pub hash_mb: u32,
    /// Upper bound on one engine exchange.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Fresh processes tried after a crash before a call gives up.
    #[serde(default = "default_max_respawns")]
    pub max_respawns: u32,
}

fn default_engine_path() -> String {
    "stockfish".to_string()
}

fn default_threads() -> u32 {
    1
}

fn default_hash_mb() -> u32 {
    64
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_max_respawns() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            threads: default_threads(),
            hash_mb: default_hash_mb(),
            call_timeout_ms: default_call_timeout_ms(),
            max_respawns: default_max_respawns(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            path: self.path.clone(),
            threads: self.threads,
            hash_mb: self.hash_mb,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

/// Search depths and classification cutoffs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisSection {
    #[serde(default = "default_quick_depth")]
    pub quick_depth: u32,
    #[serde(default = "default_deep_depth")]
    pub deep_depth: u32,
    #[serde(default)]
    pub thresholds: ClassificationThresholds,
}

fn default_quick_depth() -> u32 {
    8
}

fn default_deep_depth() -> u32 {
    18
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            quick_depth: default_quick_depth(),
            deep_depth: default_deep_depth(),
            thresholds: ClassificationThresholds::default(),
        }
    }
}

impl AnalysisSection {
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            quick_depth: self.quick_depth,
            deep_depth: self.deep_depth,
            thresholds: self.thresholds,
        }
    }
}

/// Worker pool and job lifecycle settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueueConfig {
    /// Worker threads, and engine processes, since each worker leases one.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Analyzing jobs without progress for this long are requeued.
    #[serde(default = "default_stall_window_secs")]
    pub stall_window_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles with each further retry.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    #[serde(default = "default_storage_write_attempts")]
    pub storage_write_attempts: u32,
}

fn default_workers() -> usize {
    2
}

fn default_lease_ttl_secs() -> u64 {
    120
}

fn default_stall_window_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_watchdog_interval_ms() -> u64 {
    5000
}

fn default_storage_write_attempts() -> u32 {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lease_ttl_secs: default_lease_ttl_secs(),
            stall_window_secs: default_stall_window_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            storage_write_attempts: default_storage_write_attempts(),
        }
    }
}

impl QueueConfig {
    pub fn policy(&self) -> QueuePolicy {
        QueuePolicy {
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
            stall_window: Duration::from_secs(self.stall_window_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            workers: self.workers,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            watchdog_interval: Duration::from_millis(self.watchdog_interval_ms),
            heartbeat_interval: Duration::from_secs(self.lease_ttl_secs.max(1)) / 3,
            storage_write_attempts: self.storage_write_attempts,
        }
    }
}

/// Main configuration, loaded from `coach.toml`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoachConfig {
    /// SQLite database holding games, jobs and annotations.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub even_move: EvenMoveConfig,
}

fn default_database() -> PathBuf {
    PathBuf::from("data/coach.db")
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            engine: EngineConfig::default(),
            analysis: AnalysisSection::default(),
            queue: QueueConfig::default(),
            even_move: EvenMoveConfig::default(),
        }
    }
}

impl CoachConfig {
    /// Loads the configuration at `path`.
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Default location: `coach.toml` in the current directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from("coach.toml")
    }
}
