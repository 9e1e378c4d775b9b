//! ReplayGain Filter
//!
//! Scales samples by the track or album gain already stored in the file's
//! metadata. Computing the gain values is the job of an analyzer; this
//! filter only applies them.

use tracing::debug;

use crate::engine::{SampleCollection, SampleConsumer};
use crate::error::{AudioError, Result};
use crate::extensions::SampleFilter;
use crate::metadata::{
    MetadataDictionary, MetadataKey, SettingInfo, SettingInfoDictionary, SettingsDictionary,
};

// ============================================================================
// Constants
// ============================================================================

/// Setting selecting which gain to apply: "Track" or "Album"
pub const APPLY_GAIN: &str = "ApplyGain";

/// Setting disabling the peak limit: "true" or "false"
pub const PREVENT_CLIPPING: &str = "PreventClipping";

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude value
#[inline]
pub(crate) fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Parse a stored gain ("-6.50 dB")
fn parse_gain(value: &str) -> Option<f32> {
    value.trim().trim_end_matches("dB").trim().parse().ok()
}

// ============================================================================
// ReplayGain Filter
// ============================================================================

/// Which stored gain to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMode {
    #[default]
    Track,
    Album,
}

impl GainMode {
    fn keys(self) -> (MetadataKey, MetadataKey) {
        match self {
            GainMode::Track => (MetadataKey::TrackGain, MetadataKey::TrackPeak),
            GainMode::Album => (MetadataKey::AlbumGain, MetadataKey::AlbumPeak),
        }
    }
}

/// Applies stored ReplayGain values
///
/// # Settings
/// - `ApplyGain`: "Track" (default) or "Album"
/// - `PreventClipping`: limit the scale so the stored peak stays at or
///   below full scale (default true)
#[derive(Debug, Clone)]
pub struct ReplayGainFilter {
    mode: GainMode,
    scale: f32,
}

impl ReplayGainFilter {
    pub fn new() -> Self {
        Self {
            mode: GainMode::Track,
            scale: 1.0,
        }
    }

    pub fn mode(&self) -> GainMode {
        self.mode
    }

    /// Linear factor applied to every sample
    pub fn scale(&self) -> f32 {
        self.scale
    }
}

impl Default for ReplayGainFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleConsumer for ReplayGainFilter {
    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        if (self.scale - 1.0).abs() < f32::EPSILON {
            return Ok(());
        }

        for channel in samples.channels_mut() {
            for sample in channel {
                *sample *= self.scale;
            }
        }
        Ok(())
    }
}

impl SampleFilter for ReplayGainFilter {
    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new()
            .with(APPLY_GAIN, SettingInfo::choice(["Track", "Album"]))
            .with(PREVENT_CLIPPING, SettingInfo::Boolean)
    }

    fn initialize(
        &mut self,
        metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
    ) -> Result<()> {
        self.mode = match settings.get(APPLY_GAIN) {
            Some(value) if value.eq_ignore_ascii_case("album") => GainMode::Album,
            _ => GainMode::Track,
        };
        let prevent_clipping = settings
            .get(PREVENT_CLIPPING)
            .map(|value| !value.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let (gain_key, peak_key) = self.mode.keys();
        let gain = match metadata.get_key(gain_key) {
            Some(value) => parse_gain(value).ok_or_else(|| AudioError::InvalidMetadataValue {
                key: gain_key.to_string(),
                value: value.to_string(),
                reason: "expected a gain in dB".to_string(),
            })?,
            None => {
                debug!(key = %gain_key, "no stored gain, leaving samples unchanged");
                self.scale = 1.0;
                return Ok(());
            }
        };

        let mut scale = db_to_linear(gain);
        if prevent_clipping {
            let peak = metadata
                .get_key(peak_key)
                .and_then(|value| value.parse::<f32>().ok())
                .filter(|peak| *peak > 0.0);
            if let Some(peak) = peak {
                scale = scale.min(1.0 / peak);
            }
        }

        debug!(mode = ?self.mode, gain, scale, "replay gain ready");
        self.scale = scale;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SamplePool;
    use approx::assert_relative_eq;

    fn metadata(pairs: &[(&str, &str)]) -> MetadataDictionary {
        let mut metadata = MetadataDictionary::new();
        for (key, value) in pairs {
            metadata.set(key, value).unwrap();
        }
        metadata
    }

    #[test]
    fn test_db_to_linear() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        // -6 dB ~= 0.501187
        assert_relative_eq!(db_to_linear(-6.0), 0.501187, epsilon = 1e-4);
    }

    #[test]
    fn test_track_gain_applied() {
        let mut filter = ReplayGainFilter::new();
        filter
            .initialize(&metadata(&[("TrackGain", "-6.02")]), &SettingsDictionary::new())
            .unwrap();
        assert_eq!(filter.mode(), GainMode::Track);

        let pool = SamplePool::with_shards(1, 1);
        let mut samples = pool.acquire(1, 2);
        samples.copy_from_interleaved(&[0.8, -0.4]);
        filter.submit(&mut samples).unwrap();

        assert_relative_eq!(samples.channel(0)[0], 0.4, epsilon = 1e-3);
        assert_relative_eq!(samples.channel(0)[1], -0.2, epsilon = 1e-3);
    }

    #[test]
    fn test_album_mode_and_peak_limit() {
        let mut filter = ReplayGainFilter::new();
        let settings: SettingsDictionary = [(APPLY_GAIN, "Album")].into_iter().collect();
        filter
            .initialize(
                &metadata(&[("TrackGain", "-10"), ("AlbumGain", "+12"), ("AlbumPeak", "0.5")]),
                &settings,
            )
            .unwrap();

        assert_eq!(filter.mode(), GainMode::Album);
        // +12 dB would push the 0.5 peak past full scale
        assert_relative_eq!(filter.scale(), 2.0);
    }

    #[test]
    fn test_clipping_allowed() {
        let mut filter = ReplayGainFilter::new();
        let settings: SettingsDictionary = [(PREVENT_CLIPPING, "false")].into_iter().collect();
        filter
            .initialize(&metadata(&[("TrackGain", "6"), ("TrackPeak", "0.9")]), &settings)
            .unwrap();
        assert_relative_eq!(filter.scale(), db_to_linear(6.0));
    }

    #[test]
    fn test_missing_gain_is_unity() {
        let mut filter = ReplayGainFilter::new();
        filter
            .initialize(&MetadataDictionary::new(), &SettingsDictionary::new())
            .unwrap();
        assert_eq!(filter.scale(), 1.0);
    }
}
