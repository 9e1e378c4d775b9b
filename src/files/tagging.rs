//! Tag persistence

use std::fs::OpenOptions;
use std::io::ErrorKind;

use tracing::info;

use super::{resolve, AudioFile};
use crate::error::{AudioError, Result};
use crate::extensions::MetadataEncoder;
use crate::metadata::SettingsDictionary;

impl AudioFile {
    /// Write the in-memory tags back into the file
    ///
    /// Settings are validated before the file is opened for writing.
    ///
    /// # Errors
    /// * `Unsupported` - If no metadata encoder handles this file extension
    /// * `InvalidSetting` - If a setting is not declared or has a bad value
    pub fn save_metadata(&mut self, settings: &SettingsDictionary) -> Result<()> {
        let engine = self.engine.clone();
        let path = self.path.clone();

        let extension = resolve::file_extension(&path);
        let mut encoder = engine
            .registry()
            .find_for_extension::<dyn MetadataEncoder>(&extension)
            .first()
            .ok_or_else(|| AudioError::Unsupported { path: path.clone() })?
            .create();
        settings.validate(&encoder.available_settings())?;
        let metadata = self.metadata()?;

        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AudioError::FileNotFound { path });
            }
            Err(err) => return Err(err.into()),
        };
        encoder.write_metadata(&mut file, metadata, settings)?;
        file.sync_all()?;

        info!(path = %path.display(), values = metadata.len(), "metadata saved");
        Ok(())
    }

    /// Remove every tag from the file
    ///
    /// If saving fails the previous in-memory tags are restored.
    pub fn clear_metadata(&mut self, settings: &SettingsDictionary) -> Result<()> {
        let previous = std::mem::take(self.metadata_mut()?);
        let result = self.save_metadata(settings);
        if result.is_err() {
            self.metadata = Some(previous);
        }
        result
    }
}
