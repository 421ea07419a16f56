//! Node configuration and TOML loading.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ecm_common::config::{ConfigError, ConfigLoader, NodeConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = NodeConfig::load(Path::new("node.toml"))?;
//!     config.validate()?;
//!     println!("{} drives", config.control_loop.drives);
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "ecm-node-01"
//!
//! [control_loop]
//! drives = 2
//! ios = 1
//! cycle_time_us = 1000
//! read_sdo_update_sec = 0.5
//!
//! [rt]
//! cpu_core = 1
//! priority = 80
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{
    CYCLE_TIME_US, CYCLE_TIME_US_MAX, CYCLE_TIME_US_MIN, MAX_DRIVES, MAX_IOS,
    READ_SDO_UPDATE_SEC_DEFAULT,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Fields shared by every ECM process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Device counts and timing of the control loop.
///
/// Fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    /// Number of drives in the pool.
    pub drives: usize,

    /// Number of digital I/O modules in the pool (may be 0).
    #[serde(default)]
    pub ios: usize,

    /// Cycle period in microseconds (default: 1000).
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,

    /// Interval between bulk SDO reads [s] (default: 1.0).
    #[serde(default = "default_read_sdo_update_sec")]
    pub read_sdo_update_sec: f64,
}

fn default_cycle_time_us() -> u64 {
    CYCLE_TIME_US
}
fn default_read_sdo_update_sec() -> f64 {
    READ_SDO_UPDATE_SEC_DEFAULT
}

impl ControlLoopConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time_us < CYCLE_TIME_US_MIN || self.cycle_time_us > CYCLE_TIME_US_MAX {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {} out of range [{}, {}]",
                self.cycle_time_us, CYCLE_TIME_US_MIN, CYCLE_TIME_US_MAX
            )));
        }
        if self.drives > MAX_DRIVES {
            return Err(ConfigError::ValidationError(format!(
                "drives {} out of range [0, {}]",
                self.drives, MAX_DRIVES
            )));
        }
        if self.ios > MAX_IOS {
            return Err(ConfigError::ValidationError(format!(
                "ios {} out of range [0, {}]",
                self.ios, MAX_IOS
            )));
        }
        if !self.read_sdo_update_sec.is_finite() || self.read_sdo_update_sec < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "read_sdo_update_sec {} must be finite and >= 0",
                self.read_sdo_update_sec
            )));
        }
        Ok(())
    }
}

/// Real-time scheduling of the cycle thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtConfig {
    /// CPU core the cycle thread is pinned to (default: 1).
    #[serde(default = "default_cpu_core")]
    pub cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_cpu_core() -> usize {
    1
}
fn default_priority() -> i32 {
    80
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            cpu_core: default_cpu_core(),
            priority: default_priority(),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub shared: SharedConfig,
    pub control_loop: ControlLoopConfig,
    #[serde(default)]
    pub rt: RtConfig,
}

impl NodeConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.control_loop.validate()?;
        if !(1..=99).contains(&self.rt.priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt.priority {} out of range [1, 99]",
                self.rt.priority
            )));
        }
        Ok(())
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Trait for loading configuration from TOML files.
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
