//! Sample Buffer Pool
//!
//! Transcoding allocates thousands of short-lived, identically shaped
//! buffers per second. [`SamplePool`] recycles their storage instead.
//!
//! The pool is split into shards, each behind its own lock, and a thread
//! prefers the shard derived from its id. Concurrent pipelines therefore
//! rarely contend on the same lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

/// Default number of idle buffers kept per shape in each shard
pub const DEFAULT_RETAIN_PER_SHAPE: usize = 16;

/// Default number of distinct shapes kept idle in each shard
pub const DEFAULT_SHAPES_PER_SHARD: usize = 8;

// ============================================================================
// Sample Collection
// ============================================================================

/// A block of de-interleaved `f32` samples, normalized to [-1.0, 1.0]
///
/// All channels hold the same number of frames. A collection with zero
/// frames marks the end of a stream (see [`SampleCollection::is_last`]).
#[derive(Debug, PartialEq)]
pub struct SampleCollection {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl SampleCollection {
    fn with_storage(channels: Vec<Vec<f32>>, frames: usize) -> Self {
        Self { channels, frames }
    }

    /// Number of channels (always > 0)
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// True for the end-of-stream sentinel
    pub fn is_last(&self) -> bool {
        self.frames == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// De-interleave `[L,R,L,R,...]` into the channels
    ///
    /// Copies `min(frame_count, source.len() / channels)` frames and returns
    /// that count.
    pub fn copy_from_interleaved(&mut self, source: &[f32]) -> usize {
        let channel_count = self.channel_count();
        let frames = (source.len() / channel_count).min(self.frames);

        for (i, frame) in source.chunks_exact(channel_count).take(frames).enumerate() {
            for (channel, sample) in self.channels.iter_mut().zip(frame) {
                channel[i] = *sample;
            }
        }

        frames
    }

    /// Interleave the channels into `[L,R,L,R,...]`, appending to `out`
    pub fn write_interleaved(&self, out: &mut Vec<f32>) {
        out.reserve(self.frames * self.channel_count());
        for frame in 0..self.frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Counters describing pool behaviour since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created because nothing of the right shape was idle
    pub allocated: u64,
    /// Buffers handed out from idle storage
    pub reused: u64,
    /// Buffers returned to the pool
    pub released: u64,
}

type Shape = (usize, usize);
type Storage = Vec<Vec<f32>>;
type Shard = Mutex<ShardState>;

/// Idle storage of one shard
///
/// Short final blocks produce one-off shapes, so only the most recently
/// released shapes are kept.
#[derive(Default)]
struct ShardState {
    idle: HashMap<Shape, Vec<Storage>>,
    /// Shapes present in `idle`, least recently released first
    recent: VecDeque<Shape>,
}

impl ShardState {
    fn take(&mut self, shape: Shape) -> Option<Storage> {
        let idle = self.idle.get_mut(&shape)?;
        let storage = idle.pop();
        if idle.is_empty() {
            self.forget(shape);
        }
        storage
    }

    fn put(&mut self, shape: Shape, storage: Storage, retain_per_shape: usize, max_shapes: usize) {
        let idle = self.idle.entry(shape).or_default();
        if idle.len() < retain_per_shape {
            idle.push(storage);
        }

        self.recent.retain(|s| *s != shape);
        self.recent.push_back(shape);
        while self.recent.len() > max_shapes {
            if let Some(oldest) = self.recent.pop_front() {
                self.idle.remove(&oldest);
                trace!(channels = oldest.0, frames = oldest.1, "evicted idle shape");
            }
        }
    }

    fn forget(&mut self, shape: Shape) {
        self.idle.remove(&shape);
        self.recent.retain(|s| *s != shape);
    }
}

/// Thread-safe pool of [`SampleCollection`] storage
pub struct SamplePool {
    shards: Box<[Shard]>,
    retain_per_shape: usize,
    shapes_per_shard: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
}

impl SamplePool {
    /// Create a pool with one shard per available CPU
    pub fn new() -> Self {
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_shards(shards, DEFAULT_RETAIN_PER_SHAPE)
    }

    /// Create a pool with an explicit shard count and retention limit
    pub fn with_shards(shards: usize, retain_per_shape: usize) -> Self {
        Self::with_limits(shards, retain_per_shape, DEFAULT_SHAPES_PER_SHARD)
    }

    /// Create a pool that also bounds the distinct shapes kept per shard
    ///
    /// When a release would exceed `shapes_per_shard`, the idle storage of
    /// the least recently released shape in that shard is dropped.
    pub fn with_limits(shards: usize, retain_per_shape: usize, shapes_per_shard: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(ShardState::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            retain_per_shape,
            shapes_per_shard,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Get a zero-filled collection of the requested shape
    ///
    /// A request for zero frames yields the end-of-stream sentinel without
    /// touching the shards. Never fails: allocates when nothing is idle.
    ///
    /// # Panics
    /// Panics if `channels` is zero.
    pub fn acquire(&self, channels: usize, frames: usize) -> SampleCollection {
        assert!(channels > 0, "a sample collection needs at least one channel");

        if frames == 0 {
            return SampleCollection::with_storage(vec![Vec::new(); channels], 0);
        }

        let shape = (channels, frames);
        if let Some(mut storage) = self.take_idle(shape) {
            for channel in &mut storage {
                channel.fill(0.0);
            }
            self.reused.fetch_add(1, Ordering::Relaxed);
            return SampleCollection::with_storage(storage, frames);
        }

        trace!(channels, frames, "sample pool miss");
        self.allocated.fetch_add(1, Ordering::Relaxed);
        SampleCollection::with_storage(vec![vec![0.0; frames]; channels], frames)
    }

    /// Return a collection's storage to the pool
    pub fn release(&self, collection: SampleCollection) {
        if collection.is_last() {
            return;
        }

        self.released.fetch_add(1, Ordering::Relaxed);
        if self.retain_per_shape == 0 || self.shapes_per_shard == 0 {
            return;
        }

        let shape = (collection.channel_count(), collection.frames);
        self.home_shard().lock().put(
            shape,
            collection.channels,
            self.retain_per_shape,
            self.shapes_per_shard,
        );
    }

    /// Change the frame count of a collection in place
    ///
    /// The leading `min(old, new)` frames of every channel are preserved and
    /// the rest is zero. The previous storage goes back to the pool, so the
    /// collection must still be released (once) when its consumer is done.
    pub fn resize(&self, collection: &mut SampleCollection, frames: usize) {
        if collection.frames == frames {
            return;
        }

        let mut replacement = self.acquire(collection.channel_count(), frames);
        let keep = frames.min(collection.frames);
        for (target, source) in replacement.channels.iter_mut().zip(&collection.channels) {
            target[..keep].copy_from_slice(&source[..keep]);
        }

        let previous = std::mem::replace(collection, replacement);
        self.release(previous);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    fn home_index(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn home_shard(&self) -> &Shard {
        &self.shards[self.home_index()]
    }

    fn take_idle(&self, shape: Shape) -> Option<Storage> {
        let home = self.home_index();
        if let Some(storage) = self.shards[home].lock().take(shape) {
            return Some(storage);
        }

        // Buffers released by the consumer thread land in its own shard.
        self.shards
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != home)
            .find_map(|(_, shard)| shard.try_lock()?.take(shape))
    }
}

impl Default for SamplePool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplePool")
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_shape() {
        let pool = SamplePool::with_shards(2, 4);
        let samples = pool.acquire(2, 128);

        assert_eq!(samples.channel_count(), 2);
        assert_eq!(samples.frame_count(), 128);
        assert!(!samples.is_last());
        assert!(samples.channels().all(|c| c.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_zero_frames_is_last() {
        let pool = SamplePool::with_shards(1, 4);
        let samples = pool.acquire(1, 0);
        assert!(samples.is_last());

        pool.release(samples);
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_released_storage_is_reused_and_zeroed() {
        let pool = SamplePool::with_shards(1, 4);

        let mut samples = pool.acquire(1, 64);
        samples.channel_mut(0)[0] = 0.75;
        pool.release(samples);

        let again = pool.acquire(1, 64);
        assert_eq!(again.channel(0)[0], 0.0);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.released, 1);
    }

    #[test]
    fn test_shapes_are_not_mixed() {
        let pool = SamplePool::with_shards(1, 4);
        pool.release(pool.acquire(2, 64));

        let other = pool.acquire(2, 32);
        assert_eq!(other.frame_count(), 32);
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn test_retention_limit() {
        let pool = SamplePool::with_shards(1, 1);
        let a = pool.acquire(1, 8);
        let b = pool.acquire(1, 8);
        pool.release(a);
        pool.release(b);

        pool.acquire(1, 8);
        pool.acquire(1, 8);
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(pool.stats().allocated, 3);
    }

    #[test]
    fn test_resize_preserves_leading_samples() {
        let pool = SamplePool::with_shards(1, 4);
        let mut samples = pool.acquire(2, 4);
        samples.copy_from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3, 0.4, -0.4]);

        pool.resize(&mut samples, 2);
        assert_eq!(samples.frame_count(), 2);
        assert_eq!(samples.channel(0), &[0.1, 0.2]);
        assert_eq!(samples.channel(1), &[-0.1, -0.2]);

        pool.resize(&mut samples, 3);
        assert_eq!(samples.channel(0), &[0.1, 0.2, 0.0]);

        // The original four-frame storage went back to the pool
        assert_eq!(pool.stats().released, 2);
    }

    #[test]
    fn test_short_blocks_do_not_accumulate_shapes() {
        let pool = SamplePool::with_shards(1, 16);
        for frames in 1..4096 {
            let mut samples = pool.acquire(2, 4096);
            pool.resize(&mut samples, frames);
            pool.release(samples);
        }

        let shard = pool.shards[0].lock();
        assert!(shard.idle.len() <= DEFAULT_SHAPES_PER_SHARD);
        assert_eq!(shard.recent.len(), shard.idle.len());

        let idle_bytes: usize = shard
            .idle
            .values()
            .flatten()
            .flatten()
            .map(|channel| channel.len() * std::mem::size_of::<f32>())
            .sum();
        assert!(idle_bytes <= DEFAULT_SHAPES_PER_SHARD * 2 * 4096 * 4);

        // The full block shape stays warm through the churn
        assert!(shard.idle.contains_key(&(2, 4096)));
        drop(shard);
        assert_eq!(pool.stats().reused, 4094);
    }

    #[test]
    fn test_least_recent_shape_is_evicted() {
        let pool = SamplePool::with_limits(1, 4, 2);
        pool.release(pool.acquire(1, 10));
        pool.release(pool.acquire(1, 20));
        pool.release(pool.acquire(1, 30));

        pool.acquire(1, 10);
        assert_eq!(pool.stats().reused, 0);

        pool.acquire(1, 30);
        pool.acquire(1, 20);
        assert_eq!(pool.stats().reused, 2);
        assert!(pool.shards[0].lock().idle.is_empty());
    }

    #[test]
    fn test_interleave_round_trip() {
        let pool = SamplePool::with_shards(1, 4);
        let mut samples = pool.acquire(2, 3);
        let copied = samples.copy_from_interleaved(&[1.0, 5.0, 2.0, 6.0, 3.0, 7.0]);
        assert_eq!(copied, 3);
        assert_eq!(samples.channel(0), &[1.0, 2.0, 3.0]);

        let mut out = Vec::new();
        samples.write_interleaved(&mut out);
        assert_eq!(out, vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0]);
    }

    #[test]
    fn test_peak() {
        let pool = SamplePool::with_shards(1, 4);
        let mut samples = pool.acquire(2, 2);
        samples.copy_from_interleaved(&[0.1, -0.8, 0.5, 0.2]);
        assert_eq!(samples.peak(), 0.8);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(SamplePool::with_shards(4, 8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let samples = pool.acquire(2, 256);
                        pool.release(samples);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.allocated + stats.reused, 4000);
        assert_eq!(stats.released, 4000);
        assert!(stats.reused > 0);
    }
}
