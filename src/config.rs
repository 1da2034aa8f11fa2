//! Configuration system for simulation runs.
//!
//! A configuration file bundles run parameters with a netlist, so a complete
//! simulation can be described declaratively.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   horizon: 1000
//!   max_events: 100000
//!   record_states: true
//!   log_level: info
//!   variability:        # optional, off when absent
//!     seed: 7
//!     spread: 0.2
//!
//! netlist:
//!   cells:
//!     - name: in
//!       kind: SOURCE
//!     - name: out
//!       kind: SINK
//!   connections:
//!     - from: in.q
//!       to: out.a
//!   sources:
//!     - cell: in
//!       times: [0, 50]
//!   sinks: [out]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::circuit::Circuit;
use crate::error::SimError;
use crate::netlist::Netlist;
use crate::registry::{CellLibrary, CellParams};
use crate::types::SimTime;
use crate::variability::Variability;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Circuit construction failed: {0}")]
    Build(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Run parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Last simulation time to process; `None` runs to quiescence
    #[serde(default)]
    pub horizon: Option<SimTime>,

    /// Safety bound on processed events
    #[serde(default)]
    pub max_events: Option<u64>,

    /// Whether to record the state history of transitional cells
    #[serde(default = "default_record_states")]
    pub record_states: bool,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seeded firing-delay variation; `None` keeps nominal delays
    #[serde(default)]
    pub variability: Option<Variability>,
}

fn default_record_states() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            horizon: None,
            max_events: None,
            record_states: default_record_states(),
            log_level: default_log_level(),
            variability: None,
        }
    }
}

impl SimulationParams {
    /// Validates the parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_events == Some(0) {
            return Err(ConfigError::Validation(
                "max_events must be positive when set".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown log level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if let Some(v) = &self.variability {
            v.validate().map_err(ConfigError::Validation)?;
        }
        Ok(())
    }
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Run parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Circuit description
    #[serde(default)]
    pub netlist: Netlist,
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the parameters and the netlist structure.
    pub fn validate(&self) -> ConfigResult<()> {
        self.simulation.validate()?;
        self.netlist
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Builds the configured circuit.
    pub fn build_circuit(&self, library: &CellLibrary) -> ConfigResult<Circuit> {
        Ok(self.netlist.build(library)?)
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the number of cells in the netlist.
    pub fn cell_count(&self) -> usize {
        self.netlist.cells.len()
    }

    /// Returns the number of connections in the netlist.
    pub fn connection_count(&self) -> usize {
        self.netlist.connections.len()
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run horizon.
    pub fn horizon(mut self, time: SimTime) -> Self {
        self.config.simulation.horizon = Some(time);
        self
    }

    /// Sets the event budget.
    pub fn max_events(mut self, limit: u64) -> Self {
        self.config.simulation.max_events = Some(limit);
        self
    }

    /// Enables or disables state-history recording.
    pub fn record_states(mut self, enable: bool) -> Self {
        self.config.simulation.record_states = enable;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables seeded firing-delay variation.
    pub fn variability(mut self, variability: Variability) -> Self {
        self.config.simulation.variability = Some(variability);
        self
    }

    /// Adds a cell.
    pub fn cell(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.config.netlist = self.config.netlist.cell(name, kind);
        self
    }

    /// Adds a cell with parameters.
    pub fn cell_with(mut self, name: impl Into<String>, kind: impl Into<String>, params: CellParams) -> Self {
        self.config.netlist = self.config.netlist.cell_with(name, kind, params);
        self
    }

    /// Adds a connection between `cell.port` endpoints.
    pub fn connect<I, S>(mut self, from: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.netlist = self.config.netlist.connect(from, to);
        self
    }

    /// Adds a source schedule.
    pub fn source(mut self, cell: impl Into<String>, times: Vec<SimTime>) -> Self {
        self.config.netlist = self.config.netlist.source(cell, times);
        self
    }

    /// Marks a sink.
    pub fn sink(mut self, cell: impl Into<String>) -> Self {
        self.config.netlist = self.config.netlist.sink(cell);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
