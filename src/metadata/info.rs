//! Immutable audio format descriptor

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// Sample rates an [`AudioInfo`] may carry
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[
    8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000, 176400,
    192000,
];

/// Highest bit depth a lossless format may declare
pub const MAX_BITS_PER_SAMPLE: u16 = 32;

/// Format descriptor for an audio file
///
/// Built once by an [`crate::extensions::AudioInfoDecoder`] and never
/// mutated afterward. Only mono and stereo material is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    format: String,
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    frame_count: u64,
    bit_rate: u32,
}

impl AudioInfo {
    /// Describe a lossless stream
    ///
    /// # Arguments
    /// * `format` - Human-readable format label (e.g. "LPCM")
    /// * `channels` - 1 or 2
    /// * `bits_per_sample` - 1 to 32
    /// * `sample_rate` - One of [`SUPPORTED_SAMPLE_RATES`]
    /// * `frame_count` - Frames per channel, 0 if unknown
    pub fn lossless(
        format: impl Into<String>,
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        frame_count: u64,
    ) -> Result<Self> {
        if bits_per_sample == 0 || bits_per_sample > MAX_BITS_PER_SAMPLE {
            return Err(AudioError::InvalidAudioInfo {
                reason: format!("{bits_per_sample} bits per sample is out of range (1-32)"),
            });
        }
        Self::build(format.into(), channels, bits_per_sample, sample_rate, frame_count, 0)
    }

    /// Describe a lossy stream (no meaningful bit depth)
    pub fn lossy(
        format: impl Into<String>,
        channels: u16,
        sample_rate: u32,
        frame_count: u64,
        bit_rate: u32,
    ) -> Result<Self> {
        Self::build(format.into(), channels, 0, sample_rate, frame_count, bit_rate)
    }

    fn build(
        format: String,
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        frame_count: u64,
        bit_rate: u32,
    ) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(AudioError::InvalidAudioInfo {
                reason: format!("{channels}-channel audio (only mono/stereo supported)"),
            });
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(AudioError::InvalidAudioInfo {
                reason: format!("{sample_rate} Hz is not a supported sample rate"),
            });
        }

        Ok(Self {
            format,
            channels,
            bits_per_sample,
            sample_rate,
            frame_count,
            bit_rate,
        })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bits per sample, 0 for lossy formats
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel, 0 if unknown
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average bit rate in bits per second, 0 if unknown
    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    pub fn is_lossless(&self) -> bool {
        self.bits_per_sample > 0
    }

    /// Playing time derived from frame count and sample rate
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count as f64 / self.sample_rate as f64)
    }
}
