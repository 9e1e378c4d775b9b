//! Metadata, settings and format value types
//!
//! [`MetadataDictionary`] only admits a fixed set of keys and normalizes each
//! value on write, so every extension sees the same canonical spelling
//! (`"03"` rather than `"3"`, `"-6.50 dB"` rather than `"-6.5"`).

mod info;
mod settings;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{AudioError, Result};

pub use info::{AudioInfo, MAX_BITS_PER_SAMPLE, SUPPORTED_SAMPLE_RATES};
pub use settings::{SettingInfo, SettingInfoDictionary, SettingsDictionary};

static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[12][0-9]{3}$").expect("valid regex"));

// ============================================================================
// Keys
// ============================================================================

/// Keys accepted by a [`MetadataDictionary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetadataKey {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Composer,
    Genre,
    Comment,
    Day,
    Month,
    Year,
    TrackNumber,
    TrackCount,
    TrackPeak,
    AlbumPeak,
    TrackGain,
    AlbumGain,
}

impl MetadataKey {
    /// All accepted keys, in display order
    pub const ALL: [MetadataKey; 16] = [
        MetadataKey::Title,
        MetadataKey::Artist,
        MetadataKey::Album,
        MetadataKey::AlbumArtist,
        MetadataKey::Composer,
        MetadataKey::Genre,
        MetadataKey::Comment,
        MetadataKey::Day,
        MetadataKey::Month,
        MetadataKey::Year,
        MetadataKey::TrackNumber,
        MetadataKey::TrackCount,
        MetadataKey::TrackPeak,
        MetadataKey::AlbumPeak,
        MetadataKey::TrackGain,
        MetadataKey::AlbumGain,
    ];

    /// Canonical spelling of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::Title => "Title",
            MetadataKey::Artist => "Artist",
            MetadataKey::Album => "Album",
            MetadataKey::AlbumArtist => "AlbumArtist",
            MetadataKey::Composer => "Composer",
            MetadataKey::Genre => "Genre",
            MetadataKey::Comment => "Comment",
            MetadataKey::Day => "Day",
            MetadataKey::Month => "Month",
            MetadataKey::Year => "Year",
            MetadataKey::TrackNumber => "TrackNumber",
            MetadataKey::TrackCount => "TrackCount",
            MetadataKey::TrackPeak => "TrackPeak",
            MetadataKey::AlbumPeak => "AlbumPeak",
            MetadataKey::TrackGain => "TrackGain",
            MetadataKey::AlbumGain => "AlbumGain",
        }
    }

    /// Validate and normalize a value for this key
    fn normalize(&self, value: &str) -> std::result::Result<String, String> {
        match self {
            MetadataKey::Year => {
                if YEAR_PATTERN.is_match(value) {
                    Ok(value.to_string())
                } else {
                    Err("expected a year between 1000 and 2999".to_string())
                }
            }
            MetadataKey::Month => zero_padded(value, 1, 12),
            MetadataKey::Day => zero_padded(value, 1, 31),
            MetadataKey::TrackNumber | MetadataKey::TrackCount => zero_padded(value, 1, 99),
            MetadataKey::TrackGain | MetadataKey::AlbumGain => {
                let trimmed = value.trim();
                let number = trimmed
                    .strip_suffix("dB")
                    .or_else(|| trimmed.strip_suffix("db"))
                    .unwrap_or(trimmed)
                    .trim();
                let gain: f64 = number
                    .parse()
                    .map_err(|_| "expected a gain in dB".to_string())?;
                if !gain.is_finite() {
                    return Err("gain must be finite".to_string());
                }
                Ok(format!("{gain:.2} dB"))
            }
            MetadataKey::TrackPeak | MetadataKey::AlbumPeak => {
                let peak: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| "expected a peak amplitude".to_string())?;
                if !peak.is_finite() || peak < 0.0 {
                    return Err("peak must be a finite, non-negative number".to_string());
                }
                Ok(format!("{peak:.6}"))
            }
            _ => Ok(value.to_string()),
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataKey {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        MetadataKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AudioError::UnsupportedKey { key: s.to_string() })
    }
}

fn zero_padded(value: &str, min: u32, max: u32) -> std::result::Result<String, String> {
    let parsed: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("expected an integer between {min} and {max}"))?;
    if parsed < min || parsed > max {
        return Err(format!("expected an integer between {min} and {max}"));
    }
    Ok(format!("{parsed:02}"))
}

// ============================================================================
// Cover Art
// ============================================================================

/// Embedded cover image
///
/// Only the container type is checked; resizing or re-encoding images is
/// left to metadata encoder extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    data: Vec<u8>,
    mime_type: &'static str,
}

impl CoverArt {
    /// Wrap raw image bytes, sniffing the MIME type from the magic number
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let mime_type = if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            "image/png"
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else {
            return Err(AudioError::InvalidMetadataValue {
                key: "CoverArt".to_string(),
                value: format!("{} bytes", data.len()),
                reason: "only PNG and JPEG images are supported".to_string(),
            });
        };

        Ok(Self { data, mime_type })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}

// ============================================================================
// Metadata Dictionary
// ============================================================================

/// Key-restricted tag map plus optional cover art
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataDictionary {
    #[serde(flatten)]
    values: BTreeMap<MetadataKey, String>,
    #[serde(skip)]
    cover_art: Option<CoverArt>,
}

impl MetadataDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value by key name
    ///
    /// The key is matched case-insensitively. An empty value removes the key.
    ///
    /// # Errors
    /// * `UnsupportedKey` - If the key is not one of [`MetadataKey::ALL`]
    /// * `InvalidMetadataValue` - If the value fails the key's validation
    ///
    /// On error the dictionary is left unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key: MetadataKey = key.parse()?;
        self.set_key(key, value)
    }

    /// Set a value by typed key
    pub fn set_key(&mut self, key: MetadataKey, value: &str) -> Result<()> {
        if value.is_empty() {
            self.values.remove(&key);
            return Ok(());
        }

        let normalized = key
            .normalize(value)
            .map_err(|reason| AudioError::InvalidMetadataValue {
                key: key.to_string(),
                value: value.to_string(),
                reason,
            })?;
        self.values.insert(key, normalized);
        Ok(())
    }

    /// Get a value by key name (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        let key: MetadataKey = key.parse().ok()?;
        self.get_key(key)
    }

    pub fn get_key(&self, key: MetadataKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn remove(&mut self, key: MetadataKey) -> Option<String> {
        self.values.remove(&key)
    }

    pub fn cover_art(&self) -> Option<&CoverArt> {
        self.cover_art.as_ref()
    }

    pub fn set_cover_art(&mut self, cover_art: Option<CoverArt>) {
        self.cover_art = cover_art;
    }

    /// Copy every value of `other` into this dictionary, overwriting like-named keys
    pub fn merge(&mut self, other: MetadataDictionary) {
        self.values.extend(other.values);
        if other.cover_art.is_some() {
            self.cover_art = other.cover_art;
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.cover_art.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
