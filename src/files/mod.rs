//! File orchestration
//!
//! [`AudioFile`] is the entry point for callers: open a file, then export,
//! analyze or retag it. Each operation resolves the extensions it needs from
//! the engine's registry and drives samples through the pipeline.

mod analyze;
mod export;
mod resolve;
mod tagging;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::engine::AudioEngine;
use crate::error::{AudioError, Result};
use crate::metadata::{AudioInfo, MetadataDictionary};

pub use export::{ExportOptions, FilterRequest};

/// An audio file on disk plus its decoded format descriptor
///
/// The format descriptor is read once, on open. Tags are read lazily the
/// first time they are needed and then edited in memory until saved.
#[derive(Debug)]
pub struct AudioFile {
    engine: AudioEngine,
    path: PathBuf,
    info: AudioInfo,
    metadata: Option<MetadataDictionary>,
}

impl AudioFile {
    /// Open a file, reading its format with the first info decoder that accepts it
    ///
    /// # Errors
    /// * `FileNotFound` - If `path` does not exist
    /// * `Unsupported` - If no registered info decoder recognises the file
    pub fn open(engine: &AudioEngine, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AudioError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let info = resolve::read_audio_info(engine.registry(), path)?;
        debug!(
            path = %path.display(),
            format = info.format(),
            channels = info.channels(),
            sample_rate = info.sample_rate(),
            "opened audio file"
        );

        Ok(Self {
            engine: engine.clone(),
            path: path.to_path_buf(),
            info,
            metadata: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    /// Tags, read from disk on first access
    pub fn metadata(&mut self) -> Result<&MetadataDictionary> {
        Ok(self.loaded_metadata()?)
    }

    /// Mutable tags, read from disk on first access. Call
    /// [`AudioFile::save_metadata`] to persist edits.
    pub fn metadata_mut(&mut self) -> Result<&mut MetadataDictionary> {
        self.loaded_metadata()
    }

    /// Re-read tags from disk, discarding unsaved edits
    pub fn load_metadata(&mut self) -> Result<&MetadataDictionary> {
        self.metadata = None;
        self.metadata()
    }

    fn loaded_metadata(&mut self) -> Result<&mut MetadataDictionary> {
        let metadata = match self.metadata.take() {
            Some(metadata) => metadata,
            None => resolve::read_metadata(self.engine.registry(), &self.path)?,
        };
        Ok(self.metadata.insert(metadata))
    }
}
