//! Export (transcode) orchestration
//!
//! Output is staged: the file is created fresh, written, and only becomes
//! visible under its final name once the whole stream has been encoded.
//! Any failure removes what was written.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use super::{resolve, AudioFile};
use crate::dsp::FilterChain;
use crate::engine::{CancellationToken, PipelineSummary};
use crate::error::{AudioError, Result};
use crate::extensions::{SampleEncoder, SampleFilter};
use crate::metadata::{MetadataDictionary, SettingsDictionary};

/// A filter to apply during export, by registered name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    pub name: String,
    pub settings: SettingsDictionary,
}

impl FilterRequest {
    pub fn new(name: impl Into<String>, settings: SettingsDictionary) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

/// Where and how an export is written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOptions {
    /// Output directory, the input file's directory if `None`
    pub output_dir: Option<PathBuf>,
    /// Output file stem, the input file's stem if `None`
    pub output_name: Option<String>,
    /// Overwrite an existing output file instead of failing
    pub replace_existing: bool,
    /// Filters applied in order before encoding
    pub filters: Vec<FilterRequest>,
}

impl AudioFile {
    /// Transcode this file with the named encoder
    ///
    /// # Arguments
    /// * `encoder_name` - Registered `Name` of the encoder (e.g. "Wave")
    /// * `settings` - Encoder settings, validated against its declared settings
    /// * `options` - Output location, overwrite policy and filters
    /// * `cancel` - Cancellation token for this export
    ///
    /// # Returns
    /// The newly written file
    ///
    /// # Errors
    /// * `UnknownExtension` - If the encoder or a filter is not registered
    /// * `InvalidSetting` - If a setting is not declared or has a bad value
    /// * `FileExists` - If the output exists and `replace_existing` is false
    /// * `Unsupported` - If no decoder accepts this file
    /// * `Cancelled` - If `cancel` fired; nothing is left on disk
    pub fn export(
        &mut self,
        encoder_name: &str,
        settings: &SettingsDictionary,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<AudioFile> {
        let engine = self.engine.clone();
        let registry = engine.registry();

        let mut encoder = registry
            .find_named::<dyn SampleEncoder>(encoder_name)?
            .create();
        settings.validate(&encoder.available_settings())?;

        let mut filters = Vec::with_capacity(options.filters.len());
        for request in &options.filters {
            let filter = registry
                .find_named::<dyn SampleFilter>(&request.name)?
                .create();
            request.settings.validate(&filter.available_settings())?;
            filters.push(filter);
        }

        let mut effective = encoder.default_settings();
        for (key, value) in settings.iter() {
            effective.insert(key, value);
        }

        let target = self.output_path(options, encoder.file_extension());
        let metadata = self.metadata()?.clone();

        let (staged, stream) = StagedOutput::create(&target, options.replace_existing)?;

        let summary = self.transcode(
            encoder.as_mut(),
            &mut filters,
            stream,
            &metadata,
            &effective,
            options,
            cancel,
        );
        // The encoder owns the output stream; close it before renaming.
        drop(encoder);
        drop(filters);
        let summary = summary?;

        staged.commit()?;
        info!(
            source = %self.path.display(),
            target = %target.display(),
            encoder = encoder_name,
            frames = summary.frames,
            "export complete"
        );

        AudioFile::open(&engine, &target)
    }

    #[allow(clippy::too_many_arguments)]
    fn transcode(
        &self,
        encoder: &mut dyn SampleEncoder,
        filters: &mut [Box<dyn SampleFilter>],
        stream: File,
        metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> Result<PipelineSummary> {
        encoder.initialize(Box::new(BufWriter::new(stream)), &self.info, metadata, settings)?;
        for (filter, request) in filters.iter_mut().zip(&options.filters) {
            filter.initialize(metadata, &request.settings)?;
        }

        let mut chain = FilterChain::new(self.engine.pool(), filters, encoder);
        resolve::decode_into(&self.engine, &self.path, &mut chain, cancel)
    }

    /// `output_dir / output_name + extension`, defaulting to the input's
    /// directory and stem
    fn output_path(&self, options: &ExportOptions, extension: &str) -> PathBuf {
        let dir = options
            .output_dir
            .clone()
            .or_else(|| self.path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let stem = options.output_name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        dir.join(format!("{stem}{extension}"))
    }
}

// ============================================================================
// Staged output
// ============================================================================

/// An output file that is deleted on drop unless committed
///
/// When the target already exists (and replacing is allowed) the data is
/// written to a hidden sibling and renamed over the target on commit, so the
/// previous file survives any failure untouched.
#[derive(Debug)]
pub(crate) struct StagedOutput {
    target: PathBuf,
    written: PathBuf,
    committed: bool,
}

impl StagedOutput {
    /// Create the file that will receive the output
    pub(crate) fn create(target: &Path, replace_existing: bool) -> Result<(Self, File)> {
        let written = if target.exists() {
            if !replace_existing {
                return Err(AudioError::FileExists {
                    path: target.to_path_buf(),
                });
            }
            temp_sibling(target)
        } else {
            target.to_path_buf()
        };

        let file = match OpenOptions::new().write(true).create_new(true).open(&written) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(AudioError::FileExists { path: written });
            }
            Err(err) => return Err(err.into()),
        };

        Ok((
            Self {
                target: target.to_path_buf(),
                written,
                committed: false,
            },
            file,
        ))
    }

    /// Path the data is being written to
    pub(crate) fn written_path(&self) -> &Path {
        &self.written
    }

    /// Move the written file to the target, replacing any previous file
    pub(crate) fn commit(mut self) -> Result<()> {
        if self.written != self.target {
            fs::rename(self.written_path(), &self.target)?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let written = self.written_path();
        if let Err(err) = fs::remove_file(written) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %written.display(), error = %err, "failed to remove partial output");
            }
        }
    }
}

/// `.<name>.<uuid>.tmp` next to `target`
fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()))
}
