//! Analysis orchestration

use std::sync::Arc;

use tracing::info;

use super::{resolve, AudioFile};
use crate::engine::CancellationToken;
use crate::error::Result;
use crate::extensions::SampleAnalyzer;
use crate::group::GroupToken;

impl AudioFile {
    /// Run the named analyzer over this file and merge its result into the
    /// in-memory metadata
    ///
    /// Files analyzed together pass the same `group`; each call then returns
    /// only once every file of the group has been fully decoded, so group
    /// aggregates (album peak, album gain) are complete. With `None` the
    /// file forms a group of its own.
    ///
    /// On error the metadata is left as it was.
    pub fn analyze(
        &mut self,
        analyzer_name: &str,
        group: Option<&Arc<GroupToken>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let group = group.cloned().unwrap_or_else(GroupToken::single);
        // Joined first: whatever fails below, dropping the member releases
        // the rest of the group.
        let mut member = group.join();

        self.metadata()?;
        let mut analyzer = self
            .engine
            .registry()
            .find_named::<dyn SampleAnalyzer>(analyzer_name)?
            .create();
        analyzer.initialize(&self.info, &group)?;

        let summary = resolve::decode_into(&self.engine, &self.path, analyzer.as_mut(), cancel)?;
        member.arrive();

        let result = analyzer.get_result()?;
        info!(
            path = %self.path.display(),
            analyzer = analyzer_name,
            frames = summary.frames,
            values = result.len(),
            "analysis complete"
        );
        self.metadata_mut()?.merge(result);
        Ok(())
    }
}
