//! Error handling for Tonewright
//!
//! Every fallible operation in the crate returns [`AudioError`]. Probing a
//! candidate extension is not an error: see [`crate::extensions::Probe`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Tonewright operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Main error type for Tonewright operations
#[derive(Error, Debug)]
pub enum AudioError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("File already exists: {path}")]
    FileExists { path: PathBuf },

    #[error("No extension could handle {path}")]
    Unsupported { path: PathBuf },

    // Extension Errors
    #[error("Unknown {capability}: {name}")]
    UnknownExtension {
        capability: &'static str,
        name: String,
    },

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Codec error: {reason}")]
    Codec {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Metadata Errors
    #[error("Unsupported metadata key: {key}")]
    UnsupportedKey { key: String },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidMetadataValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid audio info: {reason}")]
    InvalidAudioInfo { reason: String },

    // Pipeline Errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pipeline fault: {reason}")]
    PipelineFault { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AudioError {
    /// Wrap a codec library error
    pub fn codec<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AudioError::Codec {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AudioError::FileNotFound { .. } => "FILE_NOT_FOUND",
            AudioError::FileExists { .. } => "FILE_EXISTS",
            AudioError::Unsupported { .. } => "UNSUPPORTED",
            AudioError::UnknownExtension { .. } => "UNKNOWN_EXTENSION",
            AudioError::InvalidSetting { .. } => "INVALID_SETTING",
            AudioError::Codec { .. } => "CODEC_ERROR",
            AudioError::UnsupportedKey { .. } => "UNSUPPORTED_KEY",
            AudioError::InvalidMetadataValue { .. } => "INVALID_METADATA_VALUE",
            AudioError::InvalidAudioInfo { .. } => "INVALID_AUDIO_INFO",
            AudioError::Cancelled => "CANCELLED",
            AudioError::PipelineFault { .. } => "PIPELINE_FAULT",
            AudioError::Io(_) => "IO_ERROR",
            AudioError::Json(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns true if this error came from the cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AudioError::Cancelled)
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            AudioError::FileNotFound { .. } => Some("Check the file path and try again."),
            AudioError::FileExists { .. } => {
                Some("Pass --replace to overwrite, or choose another output name.")
            }
            AudioError::Unsupported { .. } => {
                Some("No registered decoder recognised the file; convert it to WAV first.")
            }
            AudioError::UnknownExtension { .. } => {
                Some("Run 'tonewright-cli list' to see the registered extensions.")
            }
            AudioError::InvalidSetting { .. } => {
                Some("Run 'tonewright-cli list' to see each extension's accepted settings.")
            }
            AudioError::UnsupportedKey { .. } => Some(
                "Accepted keys: Title, Artist, Album, AlbumArtist, Composer, Genre, Comment, \
                 Day, Month, Year, TrackNumber, TrackCount, TrackPeak, AlbumPeak, TrackGain, AlbumGain.",
            ),
            _ => None,
        }
    }
}
