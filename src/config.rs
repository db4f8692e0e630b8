//! Load configuration
//!
//! Stored as pretty-printed JSON. Every field has a default, so a config
//! file only needs the keys it overrides:
//!
//! ```json
//! { "reduce_tasks": 8, "policy": "merge-by-key", "merge_key": "name" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// Parameters of one bulk load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoadConfig {
    /// Input partitions, one vertex-write task each. 0 = one per thread.
    pub map_tasks: usize,

    /// Reduce partitions for the reconcile phase.
    pub reduce_tasks: usize,

    /// Worker threads. 0 = available parallelism.
    pub threads: usize,

    /// Registered write policy name.
    pub policy: String,

    /// Property key used by the `merge-by-key` policy.
    pub merge_key: String,

    /// Attempts per task before the job fails. At least 1.
    pub max_task_attempts: u32,

    /// Must stay off: duplicate attempts would write duplicate elements.
    pub speculative_execution: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            map_tasks: 0,
            reduce_tasks: 4,
            threads: 0,
            policy: "default".to_string(),
            merge_key: "name".to_string(),
            max_task_attempts: 1,
            speculative_execution: false,
        }
    }
}

impl LoadConfig {
    /// Read config from a JSON file. Missing keys take their defaults.
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write config to a JSON file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.reduce_tasks == 0 {
            return Err(LoadError::InvalidConfig("reduce_tasks must be > 0".into()));
        }
        if self.max_task_attempts == 0 {
            return Err(LoadError::InvalidConfig("max_task_attempts must be >= 1".into()));
        }
        if self.speculative_execution {
            return Err(LoadError::InvalidConfig(
                "speculative_execution must be disabled for store writes".into(),
            ));
        }
        if self.policy.is_empty() {
            return Err(LoadError::InvalidConfig("policy must be named".into()));
        }
        if self.policy == "merge-by-key" && self.merge_key.is_empty() {
            return Err(LoadError::InvalidConfig("merge-by-key requires merge_key".into()));
        }
        Ok(())
    }

    /// Worker thread count with 0 resolved to available parallelism
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Input partition count with 0 resolved to the thread count
    pub fn effective_map_tasks(&self) -> usize {
        if self.map_tasks > 0 {
            self.map_tasks
        } else {
            self.effective_threads()
        }
    }
}
