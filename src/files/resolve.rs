//! Candidate fallback
//!
//! Several extensions may claim the same file extension. Each is offered
//! the stream in registration order until one answers
//! [`Probe::Supported`].

use std::fs::File;
use std::io::{BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::engine::{AudioEngine, CancellationToken, PipelineSummary, SampleConsumer};
use crate::error::{AudioError, Result};
use crate::extensions::{
    AudioInfoDecoder, ExtensionRegistry, MediaStream, MetadataDecoder, Probe, SampleDecoder,
};
use crate::metadata::{AudioInfo, MetadataDictionary};

/// File extension of `path` with its dot (".wav"), empty if none
pub(crate) fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Open `path` for reading, positioned at 0
pub(crate) fn open_stream(path: &Path) -> Result<Box<dyn MediaStream>> {
    match File::open(path) {
        Ok(file) => Ok(Box::new(BufReader::new(file))),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(AudioError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Read the format descriptor with the first info decoder that recognises the file
pub(crate) fn read_audio_info(registry: &ExtensionRegistry, path: &Path) -> Result<AudioInfo> {
    let extension = file_extension(path);
    let mut stream = open_stream(path)?;

    for candidate in registry.find_for_extension::<dyn AudioInfoDecoder>(&extension) {
        stream.seek(SeekFrom::Start(0))?;
        match candidate.create().read_audio_info(stream.as_mut())? {
            Probe::Supported(info) => return Ok(info),
            Probe::Unsupported => {
                debug!(path = %path.display(), decoder = ?candidate.info().name(), "info decoder declined");
            }
        }
    }

    Err(AudioError::Unsupported {
        path: path.to_path_buf(),
    })
}

/// Read tags with the first metadata decoder that recognises the file
///
/// A file no metadata decoder understands simply has no tags.
pub(crate) fn read_metadata(
    registry: &ExtensionRegistry,
    path: &Path,
) -> Result<MetadataDictionary> {
    let extension = file_extension(path);
    let candidates = registry.find_for_extension::<dyn MetadataDecoder>(&extension);
    if candidates.is_empty() {
        return Ok(MetadataDictionary::new());
    }

    let mut stream = open_stream(path)?;
    for candidate in candidates {
        stream.seek(SeekFrom::Start(0))?;
        match candidate.create().read_metadata(stream.as_mut())? {
            Probe::Supported(metadata) => return Ok(metadata),
            Probe::Unsupported => {
                debug!(path = %path.display(), decoder = ?candidate.info().name(), "metadata decoder declined");
            }
        }
    }

    Ok(MetadataDictionary::new())
}

/// Decode `path` into `consumer` with the first decoder that accepts it
///
/// Each candidate gets a freshly opened stream. Once a decoder accepts, its
/// pipeline outcome is final.
pub(crate) fn decode_into<C>(
    engine: &AudioEngine,
    path: &Path,
    consumer: &mut C,
    cancel: &CancellationToken,
) -> Result<PipelineSummary>
where
    C: SampleConsumer + ?Sized,
{
    let extension = file_extension(path);

    for candidate in engine
        .registry()
        .find_for_extension::<dyn SampleDecoder>(&extension)
    {
        if cancel.is_cancelled() {
            return Err(AudioError::Cancelled);
        }

        let mut decoder = candidate.create();
        match decoder.initialize(open_stream(path)?)? {
            Probe::Supported(()) => {
                debug!(path = %path.display(), decoder = ?candidate.info().name(), "decoding");
                return engine.pipeline().run(decoder.as_mut(), consumer, cancel);
            }
            Probe::Unsupported => {
                debug!(path = %path.display(), decoder = ?candidate.info().name(), "decoder declined");
            }
        }
    }

    Err(AudioError::Unsupported {
        path: path.to_path_buf(),
    })
}
