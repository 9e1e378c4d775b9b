//! Peak analyzer
//!
//! Reports the largest absolute sample value of a file (`TrackPeak`) and,
//! when analyzed as part of a group, of the whole group (`AlbumPeak`).

use std::sync::Arc;

use crate::engine::{SampleCollection, SampleConsumer};
use crate::error::Result;
use crate::extensions::SampleAnalyzer;
use crate::group::GroupToken;
use crate::metadata::{AudioInfo, MetadataDictionary, MetadataKey};

/// Group aggregate slot holding the running album peak
const ALBUM_PEAK_SLOT: &str = "peak.album";

/// Sample peak analyzer
#[derive(Debug, Default)]
pub struct PeakAnalyzer {
    group: Option<Arc<GroupToken>>,
    track_peak: f32,
}

impl PeakAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak seen so far in this file
    pub fn track_peak(&self) -> f32 {
        self.track_peak
    }
}

impl SampleConsumer for PeakAnalyzer {
    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        if !samples.is_last() {
            self.track_peak = self.track_peak.max(samples.peak());
            return Ok(());
        }

        let track_peak = self.track_peak;
        if let Some(group) = &self.group {
            group.contribute::<f32, _>(ALBUM_PEAK_SLOT, |album| *album = album.max(track_peak));
        }
        Ok(())
    }
}

impl SampleAnalyzer for PeakAnalyzer {
    fn initialize(&mut self, _info: &AudioInfo, group: &Arc<GroupToken>) -> Result<()> {
        self.group = Some(Arc::clone(group));
        self.track_peak = 0.0;
        Ok(())
    }

    fn get_result(&mut self) -> Result<MetadataDictionary> {
        let mut result = MetadataDictionary::new();
        result.set_key(MetadataKey::TrackPeak, &self.track_peak.to_string())?;

        if let Some(group) = self.group.as_ref().filter(|g| g.count() > 1) {
            group.wait();
            let album_peak = group
                .aggregate::<f32>(ALBUM_PEAK_SLOT)
                .unwrap_or(self.track_peak);
            result.set_key(MetadataKey::AlbumPeak, &album_peak.to_string())?;
        }

        Ok(result)
    }
}
