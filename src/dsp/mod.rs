//! Built-in sample processing extensions
//!
//! Analyzers and filters that work on any decoded format:
//! - `Peak` analyzer (track and album peak)
//! - `ReplayGain` filter (applies stored gain values)
//!
//! [`FilterChain`] puts any number of filters in front of a consumer.

mod chain;
mod gain;
mod peak;

pub use chain::FilterChain;
pub use gain::{GainMode, ReplayGainFilter, APPLY_GAIN, PREVENT_CLIPPING};
pub use peak::PeakAnalyzer;

use crate::extensions::{
    ExtensionInfo, ExtensionRegistry, SampleAnalyzer, SampleFilter, DESCRIPTION,
};

/// Registered name of the peak analyzer
pub const PEAK: &str = "Peak";
/// Registered name of the ReplayGain filter
pub const REPLAY_GAIN: &str = "ReplayGain";

/// Register the built-in analyzers and filters
pub fn register(registry: &mut ExtensionRegistry) {
    registry
        .register::<dyn SampleAnalyzer>(
            ExtensionInfo::named(PEAK).with(DESCRIPTION, "Track and album sample peak"),
            || Box::new(PeakAnalyzer::new()),
        )
        .register::<dyn SampleFilter>(
            ExtensionInfo::named(REPLAY_GAIN).with(DESCRIPTION, "Apply stored ReplayGain values"),
            || Box::new(ReplayGainFilter::new()),
        );
}
