//! Extension capability contracts
//!
//! Format support lives outside the core. Each capability is a trait; an
//! implementation is registered in an [`ExtensionRegistry`] together with the
//! metadata used to select it (its `Name`, or the file `Extension` it
//! handles). The core only ever talks to these traits.

mod registry;

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::engine::{SampleCollection, SamplePool};
use crate::error::Result;
use crate::group::GroupToken;
use crate::metadata::{AudioInfo, MetadataDictionary, SettingInfoDictionary, SettingsDictionary};

pub use crate::engine::SampleConsumer;
pub use registry::{Capability, Extension, ExtensionInfo, ExtensionRegistry};

/// Field naming an extension (e.g. "Wave", "Peak")
pub const NAME: &str = "Name";
/// Field naming the file extension a decoder handles, with its dot (".wav")
pub const EXTENSION: &str = "Extension";
/// Free-text description shown by the CLI
pub const DESCRIPTION: &str = "Description";

// ============================================================================
// Streams
// ============================================================================

/// Readable, seekable input handed to decoders
pub trait MediaStream: Read + Seek + Send {}
impl<T: Read + Seek + Send> MediaStream for T {}

/// Writable, seekable output handed to encoders
pub trait OutputStream: Write + Seek + Send {}
impl<T: Write + Seek + Send> OutputStream for T {}

/// Read-write stream handed to metadata encoders for in-place tag rewrites
pub trait EditableStream: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> EditableStream for T {}

// ============================================================================
// Probing
// ============================================================================

/// Outcome of offering a stream to a candidate extension
///
/// `Unsupported` is an ordinary answer ("not my format"), not a failure:
/// the caller moves on to the next candidate. Real failures are errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Supported(T),
    Unsupported,
}

impl<T> Probe<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Probe::Supported(_))
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Reads the format descriptor of a file
pub trait AudioInfoDecoder: Send {
    fn read_audio_info(&mut self, stream: &mut dyn MediaStream) -> Result<Probe<AudioInfo>>;
}

/// Produces sample collections from a stream
///
/// Runs on the pipeline's producer thread.
pub trait SampleDecoder: Send {
    /// Take ownership of the stream, answering whether the content is this
    /// decoder's format. The stream is positioned at 0.
    fn initialize(&mut self, stream: Box<dyn MediaStream>) -> Result<Probe<()>>;

    /// Decode the next block, acquiring its storage from `pool`
    ///
    /// Returns an empty collection ([`SampleCollection::is_last`]) at the
    /// end of the stream.
    fn decode_samples(&mut self, pool: &SamplePool) -> Result<SampleCollection>;
}

/// Writes sample collections to an output stream
///
/// Receives the end-of-stream collection last and must flush everything
/// before returning from that `submit`.
pub trait SampleEncoder: SampleConsumer {
    /// File extension of the produced format, with its dot
    fn file_extension(&self) -> &str;

    fn default_settings(&self) -> SettingsDictionary {
        SettingsDictionary::new()
    }

    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new()
    }

    fn initialize(
        &mut self,
        stream: Box<dyn OutputStream>,
        info: &AudioInfo,
        metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
    ) -> Result<()>;
}

/// Reads tags from a stream
pub trait MetadataDecoder: Send {
    fn read_metadata(&mut self, stream: &mut dyn MediaStream) -> Result<Probe<MetadataDictionary>>;
}

/// Rewrites tags in an existing file
///
/// Implementations must build the complete new tag before writing and must
/// never truncate or corrupt the audio data around it.
pub trait MetadataEncoder: Send {
    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new()
    }

    fn write_metadata(
        &mut self,
        stream: &mut dyn EditableStream,
        metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
    ) -> Result<()>;
}

/// Computes metadata from sample data
pub trait SampleAnalyzer: SampleConsumer {
    /// Prepare for one file; `group` is shared with the other files analyzed
    /// together (a single-member group when analyzing alone)
    fn initialize(&mut self, info: &AudioInfo, group: &Arc<GroupToken>) -> Result<()>;

    /// Produce the result. May block until every group member has submitted
    /// its final collection.
    fn get_result(&mut self) -> Result<MetadataDictionary>;
}

/// Adjusts samples in place ahead of another consumer
pub trait SampleFilter: SampleConsumer {
    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new()
    }

    fn initialize(
        &mut self,
        metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
    ) -> Result<()>;

    /// Filter one collection with access to the engine's pool
    ///
    /// Filters that change the frame count (window-size adapters) override
    /// this and call [`SamplePool::resize`]; the replaced storage goes back
    /// to the pool and the pipeline releases the new one. An end-of-stream
    /// collection must stay empty.
    fn process(&mut self, samples: &mut SampleCollection, _pool: &SamplePool) -> Result<()> {
        self.submit(samples)
    }
}
