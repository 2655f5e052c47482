//! Orchestrator configuration: resource capacities, sequences, reconciliation
//! timing and data sources.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{default_capacities, ReconcileSettings, ResourceMap, SourceFilter, SourceKind};

/// Environment variable naming the JSON config file read by
/// [`OrchestratorConfig::from_env`].
pub const CONFIG_PATH_ENV: &str = "MIGRATION_SCHEDULER_CONFIG";

/// Identifier sequence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Ids reserved per durable refill; 1 disables caching.
    #[serde(default = "SequenceConfig::default_block_size")]
    pub block_size: u64,
}

impl SequenceConfig {
    const fn default_block_size() -> u64 {
        100
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            block_size: Self::default_block_size(),
        }
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Period between cycles in milliseconds.
    #[serde(default = "ReconcileConfig::default_interval_ms")]
    pub interval_ms: u64,
    /// Bound of the completion signal channel.
    #[serde(default = "ReconcileConfig::default_channel_capacity")]
    pub channel_capacity: usize,
    /// Reconcile every job once at startup.
    #[serde(default = "ReconcileConfig::default_reconcile_on_start")]
    pub reconcile_on_start: bool,
}

impl ReconcileConfig {
    const fn default_interval_ms() -> u64 {
        3_000
    }

    const fn default_channel_capacity() -> usize {
        1_024
    }

    const fn default_reconcile_on_start() -> bool {
        true
    }

    /// Loop settings derived from this config.
    #[must_use]
    pub const fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            interval: Duration::from_millis(self.interval_ms),
            channel_capacity: self.channel_capacity,
            reconcile_on_start: self.reconcile_on_start,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
            channel_capacity: Self::default_channel_capacity(),
            reconcile_on_start: Self::default_reconcile_on_start(),
        }
    }
}

/// One data source to register with the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name.
    pub name: String,
    /// Kind of system, selects the metadata loader.
    pub kind: SourceKind,
    /// Database and table selection.
    #[serde(default)]
    pub filter: SourceFilter,
    /// Concurrent metadata requests; defaults to the CPU count.
    #[serde(default)]
    pub parallelism: Option<usize>,
}

/// Root configuration of the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capacity per resource kind; kinds left out use their defaults.
    #[serde(default = "default_capacities")]
    pub resources: ResourceMap,
    /// Identifier sequences.
    #[serde(default)]
    pub sequence: SequenceConfig,
    /// Reconciliation loop.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Data sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            resources: default_capacities(),
            sequence: SequenceConfig::default(),
            reconcile: ReconcileConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Capacities with defaults filled in for kinds the config leaves out.
    #[must_use]
    pub fn capacities(&self) -> ResourceMap {
        let mut capacities: ResourceMap = default_capacities();
        capacities.extend(self.resources.iter().map(|(k, v)| (*k, *v)));
        capacities
    }

    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.sequence.block_size == 0 {
            return Err("sequence.block_size must be greater than 0".into());
        }
        if self.reconcile.interval_ms == 0 {
            return Err("reconcile.interval_ms must be greater than 0".into());
        }
        if self.reconcile.channel_capacity == 0 {
            return Err("reconcile.channel_capacity must be greater than 0".into());
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err("source name must not be empty".into());
            }
            if !seen.insert(source.name.as_str()) {
                return Err(format!("source `{}` defined twice", source.name));
            }
            if source.parallelism == Some(0) {
                return Err(format!(
                    "source `{}` invalid: parallelism must be greater than 0",
                    source.name
                ));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an I/O, parse or validation message.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&input)
    }

    /// Load `.env` if present, then read the file named by
    /// `MIGRATION_SCHEDULER_CONFIG`. Without the variable, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns a message when the named file cannot be loaded.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_path(path),
            Err(_) => {
                tracing::debug!(var = CONFIG_PATH_ENV, "no config file set, using defaults");
                Ok(Self::default())
            }
        }
    }
}
