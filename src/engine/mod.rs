//! Audio Engine Module
//!
//! Core sample-processing machinery:
//! - Pooled sample collections
//! - Cancellation tokens
//! - The decoder-to-consumer pipeline
//!
//! [`AudioEngine`] bundles the extension registry, the sample pool and the
//! configuration. It is cheap to clone and is passed explicitly to every
//! file operation.

mod cancel;
mod config;
mod pipeline;
mod pool;

use std::sync::Arc;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use pipeline::{Pipeline, PipelineSummary, SampleConsumer, DEFAULT_QUEUE_CAPACITY};
pub use pool::{
    PoolStats, SampleCollection, SamplePool, DEFAULT_RETAIN_PER_SHAPE, DEFAULT_SHAPES_PER_SHARD,
};

use crate::extensions::ExtensionRegistry;

/// Shared context for file operations
#[derive(Clone, Debug)]
pub struct AudioEngine {
    registry: Arc<ExtensionRegistry>,
    pool: Arc<SamplePool>,
    config: EngineConfig,
}

impl AudioEngine {
    /// Create an engine around an already populated registry
    pub fn new(registry: ExtensionRegistry, config: EngineConfig) -> Self {
        let pool = SamplePool::with_shards(config.pool_shards, config.retain_per_shape);
        Self {
            registry: Arc::new(registry),
            pool: Arc::new(pool),
            config,
        }
    }

    /// Engine with the built-in extensions and default configuration
    pub fn with_defaults() -> Self {
        Self::new(ExtensionRegistry::with_defaults(), EngineConfig::default())
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &SamplePool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pipeline using this engine's pool and queue capacity
    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::with_capacity(&self.pool, self.config.queue_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_uses_config() {
        let config = EngineConfig {
            queue_capacity: 2,
            pool_shards: 1,
            retain_per_shape: 1,
        };
        let engine = AudioEngine::new(ExtensionRegistry::new(), config.clone());
        assert_eq!(engine.config(), &config);
        assert!(engine.registry().find_all::<dyn crate::extensions::SampleDecoder>().is_empty());
    }

    #[test]
    fn test_clones_share_pool() {
        let engine = AudioEngine::with_defaults();
        let clone = engine.clone();
        engine.pool().release(engine.pool().acquire(1, 8));
        assert_eq!(clone.pool().stats().released, 1);
    }
}
