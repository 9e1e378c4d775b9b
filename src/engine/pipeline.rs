//! Transcode Pipeline
//!
//! Decoding runs on a dedicated scoped thread and pushes collections into a
//! bounded queue; the calling thread pops them and submits them to the
//! consumer. The queue bound gives backpressure: the decoder is never more
//! than `capacity` collections ahead of the consumer.
//!
//! ```text
//! decoder ──► [ bounded queue ] ──► consumer.submit ──► pool.release
//!  (producer thread)                 (calling thread)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use tracing::{debug, trace};

use super::cancel::CancellationToken;
use super::pool::{SampleCollection, SamplePool};
use crate::error::{AudioError, Result};
use crate::extensions::SampleDecoder;

/// Default queue capacity between decoder and consumer
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// How often a producer blocked on a full queue re-checks cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Consumer contract
// ============================================================================

/// Receives sample collections from the pipeline
///
/// By default a consumer borrows each collection and the pipeline returns
/// it to the pool once `submit` returns. A consumer that keeps collections
/// (for example to buffer them) overrides [`manually_frees_samples`] and
/// [`submit_owned`]; it then owns each collection and is responsible for
/// releasing it.
///
/// [`manually_frees_samples`]: SampleConsumer::manually_frees_samples
/// [`submit_owned`]: SampleConsumer::submit_owned
pub trait SampleConsumer: Send {
    /// Whether submitting transfers ownership of the collection
    fn manually_frees_samples(&self) -> bool {
        false
    }

    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()>;

    /// Called instead of `submit` when [`Self::manually_frees_samples`] is true
    fn submit_owned(&mut self, samples: SampleCollection) -> Result<()> {
        let mut samples = samples;
        self.submit(&mut samples)
    }
}

impl<C: SampleConsumer + ?Sized> SampleConsumer for Box<C> {
    fn manually_frees_samples(&self) -> bool {
        (**self).manually_frees_samples()
    }

    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        (**self).submit(samples)
    }

    fn submit_owned(&mut self, samples: SampleCollection) -> Result<()> {
        (**self).submit_owned(samples)
    }
}

/// What a completed pipeline run pushed through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Collections submitted, including the end-of-stream collection
    pub collections: u64,
    /// Frames submitted (per channel)
    pub frames: u64,
    /// True once the end-of-stream collection was submitted
    pub completed: bool,
}

impl PipelineSummary {
    fn record(&mut self, samples: &SampleCollection) {
        self.collections += 1;
        self.frames += samples.frame_count() as u64;
        self.completed = samples.is_last();
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs one decoder into one consumer
pub struct Pipeline<'a> {
    pool: &'a SamplePool,
    capacity: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(pool: &'a SamplePool) -> Self {
        Self::with_capacity(pool, DEFAULT_QUEUE_CAPACITY)
    }

    /// Pipeline with an explicit queue capacity (minimum 1)
    pub fn with_capacity(pool: &'a SamplePool, capacity: usize) -> Self {
        Self {
            pool,
            capacity: capacity.max(1),
        }
    }

    /// Pump every collection from `decoder` into `consumer`
    ///
    /// Collections are submitted in decode order and the end-of-stream
    /// collection is submitted exactly once, last. Decode errors are
    /// returned after the producer has been joined.
    ///
    /// # Errors
    /// * `Cancelled` - If `cancel` fired before the end of the stream
    /// * any error returned by the decoder or the consumer
    /// * `PipelineFault` - If the producer thread panicked
    pub fn run<C>(
        &self,
        decoder: &mut dyn SampleDecoder,
        consumer: &mut C,
        cancel: &CancellationToken,
    ) -> Result<PipelineSummary>
    where
        C: SampleConsumer + ?Sized,
    {
        let pool = self.pool;
        let (sender, receiver) = bounded::<SampleCollection>(self.capacity);
        let stopped = AtomicBool::new(false);

        thread::scope(|scope| {
            let stopped = &stopped;
            let producer = thread::Builder::new()
                .name("sample-decoder".to_string())
                .spawn_scoped(scope, move || produce(decoder, pool, sender, stopped, cancel))?;

            let consumed = consume(consumer, pool, &receiver, cancel);

            // Recycle everything queued after the consumer stopped. The
            // iterator ends once the producer has seen the flag and dropped
            // its sender.
            stopped.store(true, Ordering::Release);
            for samples in receiver.iter() {
                pool.release(samples);
            }

            let produced = producer.join().map_err(|_| AudioError::PipelineFault {
                reason: "decoder thread panicked".to_string(),
            })?;

            let summary = consumed?;
            produced?;

            if summary.completed {
                debug!(
                    collections = summary.collections,
                    frames = summary.frames,
                    "pipeline drained"
                );
                Ok(summary)
            } else if cancel.is_cancelled() {
                Err(AudioError::Cancelled)
            } else {
                Err(AudioError::PipelineFault {
                    reason: "decoder stopped before the end of the stream".to_string(),
                })
            }
        })
    }
}

/// Producer loop, run on the decoder thread
fn produce(
    decoder: &mut dyn SampleDecoder,
    pool: &SamplePool,
    sender: Sender<SampleCollection>,
    stopped: &AtomicBool,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(AudioError::Cancelled);
        }
        if stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        let samples = decoder.decode_samples(pool)?;
        let last = samples.is_last();

        let mut pending = samples;
        loop {
            match sender.send_timeout(pending, CANCEL_POLL_INTERVAL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if cancel.is_cancelled() {
                        pool.release(returned);
                        return Err(AudioError::Cancelled);
                    }
                    pending = returned;
                }
                Err(SendTimeoutError::Disconnected(returned)) => {
                    // Consumer stopped; its own outcome is reported.
                    pool.release(returned);
                    return Ok(());
                }
            }
        }

        if last {
            return Ok(());
        }
    }
}

/// Consumer loop, run on the calling thread
fn consume<C>(
    consumer: &mut C,
    pool: &SamplePool,
    receiver: &Receiver<SampleCollection>,
    cancel: &CancellationToken,
) -> Result<PipelineSummary>
where
    C: SampleConsumer + ?Sized,
{
    let manually_frees = consumer.manually_frees_samples();
    let mut summary = PipelineSummary::default();

    loop {
        let samples = select! {
            recv(receiver) -> message => match message {
                Ok(samples) => samples,
                // Producer finished or failed; the join reports which.
                Err(_) => return Ok(summary),
            },
            recv(cancel.signal()) -> _ => return Err(AudioError::Cancelled),
        };

        if cancel.is_cancelled() {
            pool.release(samples);
            return Err(AudioError::Cancelled);
        }

        summary.record(&samples);
        let last = samples.is_last();
        trace!(frames = samples.frame_count(), last, "submitting samples");

        if manually_frees {
            consumer.submit_owned(samples)?;
        } else {
            let mut samples = samples;
            let submitted = consumer.submit(&mut samples);
            pool.release(samples);
            submitted?;
        }

        if last {
            return Ok(summary);
        }
    }
}
