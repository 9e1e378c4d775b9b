//! Engine configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::pipeline::DEFAULT_QUEUE_CAPACITY;
use super::pool::DEFAULT_RETAIN_PER_SHAPE;
use crate::error::{AudioError, Result};

/// Tuning knobs for an [`AudioEngine`](super::AudioEngine)
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Collections buffered between decoder and consumer
    pub queue_capacity: usize,
    /// Lock shards in the sample pool
    pub pool_shards: usize,
    /// Idle buffers kept per shape in each shard
    pub retain_per_shape: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pool_shards: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            retain_per_shape: DEFAULT_RETAIN_PER_SHAPE,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AudioError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(AudioError::InvalidSetting {
                key: "queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pool_shards == 0 {
            return Err(AudioError::InvalidSetting {
                key: "pool_shards".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
