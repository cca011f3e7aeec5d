//! TOML-based service configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::appliances::{ApplianceKind, ApplianceProfile, ProfileTable};

/// Top-level service configuration parsed from TOML.
///
/// Every section has defaults matching the stock household deployment, so an
/// empty file is a valid configuration. Load from TOML with
/// [`ServiceConfig::from_toml_file`] or use [`ServiceConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Loop cadence and retention parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Database and lock marker locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log filter settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-type profile replacements keyed by type tag.
    #[serde(default)]
    pub profiles: BTreeMap<String, ApplianceProfile>,
}

/// Loop cadence and retention parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Sleep between ticks that wrote a batch (ms).
    pub tick_interval_ms: u64,
    /// Sleep after a tick that found no active appliances (ms).
    pub idle_interval_ms: u64,
    /// Number of written ticks between retention passes.
    pub prune_every_ticks: u32,
    /// Samples older than this many days are deleted.
    pub retention_days: u32,
    /// Upper bound on how long `stop()` waits for the loop (ms).
    pub stop_timeout_ms: u64,
    /// Optional RNG seed; absent means OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            idle_interval_ms: 10_000,
            prune_every_ticks: 360,
            retention_days: 30,
            stop_timeout_ms: 5_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Database and lock marker locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Cross-process lock marker file.
    pub lock_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("havoc_ecowatt.db"),
            lock_path: PathBuf::from("simulation.lock"),
        }
    }
}

/// Log filter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.tick_interval_ms"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ServiceConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Builds the profile table: built-ins with any overrides applied.
    ///
    /// Overrides keyed by an unknown tag are skipped here and reported by
    /// [`ServiceConfig::validate`].
    pub fn profile_table(&self) -> ProfileTable {
        let mut table = ProfileTable::builtin();
        for (tag, profile) in &self.profiles {
            let kind = ApplianceKind::from_tag(tag);
            if kind != ApplianceKind::Other || tag == "other" {
                table.set(kind, profile.clone());
            }
        }
        table
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        for (field, value) in [
            ("simulation.tick_interval_ms", s.tick_interval_ms),
            ("simulation.idle_interval_ms", s.idle_interval_ms),
            ("simulation.stop_timeout_ms", s.stop_timeout_ms),
            ("simulation.prune_every_ticks", u64::from(s.prune_every_ticks)),
            ("simulation.retention_days", u64::from(s.retention_days)),
        ] {
            if value == 0 {
                errors.push(ConfigError::new(field, "must be > 0"));
            }
        }

        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ConfigError::new("storage.database_path", "must not be empty"));
        }
        if self.storage.lock_path.as_os_str().is_empty() {
            errors.push(ConfigError::new("storage.lock_path", "must not be empty"));
        }

        for (tag, profile) in &self.profiles {
            if ApplianceKind::from_tag(tag) == ApplianceKind::Other && tag != "other" {
                errors.push(ConfigError::new(
                    format!("profiles.{tag}"),
                    "unknown appliance type",
                ));
            }
            errors.extend(profile.validate(&format!("profiles.{tag}")));
        }

        errors
    }
}
