//! Configuration for the psyche state engine.
//!
//! Maps directly to `psyche.toml`. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsycheConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Delta validation and deadline settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// SQLite store settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Bounds used when building baseline records.
    #[serde(default)]
    pub bounds: BoundsConfig,
}

impl PsycheConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `PsycheError::Config` if the TOML is invalid or the values
    /// are inconsistent.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::PsycheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    /// Returns `PsycheError::Config` describing the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.bounds.default_min > self.bounds.default_max {
            return Err(crate::PsycheError::Config(format!(
                "bounds.default_min ({}) exceeds bounds.default_max ({})",
                self.bounds.default_min, self.bounds.default_max
            )));
        }
        if self.engine.default_deadline_ms == 0 {
            return Err(crate::PsycheError::Config(
                "engine.default_deadline_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Delta validation and deadline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How far into the future a memory timestamp may lie before it is
    /// rejected, to absorb clock skew between callers.
    #[serde(default = "default_2000")]
    pub clock_skew_tolerance_ms: u64,
    /// Deadline applied to store calls when the caller supplies none.
    #[serde(default = "default_5000")]
    pub default_deadline_ms: u64,
    /// Attempts made by the caller-side retry helper.
    #[serde(default = "default_3")]
    pub max_conflict_retries: u32,
    /// Base backoff between retry-helper attempts after `Unavailable`.
    #[serde(default = "default_25")]
    pub retry_backoff_ms: u64,
}

impl EngineConfig {
    /// Clock skew tolerance as a chrono duration.
    #[must_use]
    pub fn skew_tolerance(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.clock_skew_tolerance_ms).unwrap_or(i64::MAX))
    }

    /// Default deadline as a std duration.
    #[must_use]
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance_ms: 2000,
            default_deadline_ms: 5000,
            max_conflict_retries: 3,
            retry_backoff_ms: 25,
        }
    }
}

/// SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Detect corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5000,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

/// Bounds used by the baseline record constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsConfig {
    /// Lower bound of every baseline trait.
    #[serde(default)]
    pub default_min: i64,
    /// Upper bound of every baseline trait.
    #[serde(default = "default_100")]
    pub default_max: i64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            default_min: 0,
            default_max: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_3() -> u32 { 3 }
fn default_25() -> u64 { 25 }
fn default_100() -> i64 { 100 }
fn default_2000() -> u64 { 2000 }
fn default_5000() -> u64 { 5000 }
