//! Tonewright - Audio Transcoding and Tagging Toolkit
//!
//! Tonewright opens audio files, transcodes them between formats, runs
//! analyses over their samples and edits their tags. Format support comes
//! from pluggable extensions registered in an
//! [`ExtensionRegistry`](extensions::ExtensionRegistry).
//!
//! # Architecture
//!
//! - Files: [`AudioFile`] orchestrates export, analysis and tag saves
//! - Pipeline: a decoder thread feeds a bounded queue drained by a consumer
//! - Pool: sample buffers are recycled through a sharded [`SamplePool`]
//!
//! ```no_run
//! use tonewright::{AudioEngine, AudioFile, CancellationToken, ExportOptions, SettingsDictionary};
//!
//! # fn main() -> tonewright::Result<()> {
//! let engine = AudioEngine::with_defaults();
//! let mut file = AudioFile::open(&engine, "input.wav")?;
//! file.analyze("Peak", None, &CancellationToken::new())?;
//! let copy = file.export(
//!     "Wave",
//!     &SettingsDictionary::new(),
//!     &ExportOptions::default(),
//!     &CancellationToken::new(),
//! );
//! # let _ = copy;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod extensions;
pub mod files;
pub mod formats;
pub mod group;
pub mod metadata;

pub use engine::{AudioEngine, CancellationToken, EngineConfig, SampleCollection, SamplePool};
pub use error::{AudioError, Result};
pub use extensions::{ExtensionRegistry, Probe};
pub use files::{AudioFile, ExportOptions, FilterRequest};
pub use group::GroupToken;
pub use metadata::{AudioInfo, MetadataDictionary, MetadataKey, SettingsDictionary};
