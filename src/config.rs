//! Machine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "quantum": 3, "max_ticks": 500 }
//! ```

use crate::cpu::{MEMORY_SIZE, MEM_SEGMENT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default round-robin quantum, in CPU cycles.
pub const DEFAULT_QUANTUM: u32 = 6;

/// Default tick budget for a run.
pub const DEFAULT_MAX_TICKS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Bytes of main memory.
    pub memory_size: usize,
    /// Bytes per process segment.
    pub segment_size: usize,
    /// Cycles a process may run before it is switched out.
    pub quantum: u32,
    /// Upper bound on ticks for a run.
    pub max_ticks: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: MEMORY_SIZE,
            segment_size: MEM_SEGMENT_SIZE,
            quantum: DEFAULT_QUANTUM,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

impl MachineConfig {
    /// Read a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size == 0 {
            return Err(ConfigError::Invalid("segment size must be non-zero".into()));
        }
        if self.memory_size % self.segment_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "memory size {} is not a multiple of segment size {}",
                self.memory_size, self.segment_size
            )));
        }
        if self.quantum == 0 {
            return Err(ConfigError::Invalid("quantum must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of process segments.
    pub fn segments(&self) -> usize {
        self.memory_size / self.segment_size
    }
}

/// Errors that can occur while loading a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("invalid config file: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
