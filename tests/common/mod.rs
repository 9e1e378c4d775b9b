//! Shared fixtures for integration tests
//!
//! Provides WAVE file writers and a small "mock" container format with its
//! own info decoder, sample decoder and tag codec, so tests can exercise
//! every orchestration path without real codecs.
//!
//! Mock file layout: a 64-byte header line
//! `MOCK <channels> <rate> <frames> <value> <flags>`, then a 1024-byte tag
//! region holding a JSON object padded with spaces.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tonewright::engine::{SampleCollection, SampleConsumer, SamplePool};
use tonewright::extensions::{
    AudioInfoDecoder, EditableStream, ExtensionInfo, ExtensionRegistry, MediaStream,
    MetadataDecoder, MetadataEncoder, OutputStream, Probe, SampleAnalyzer, SampleDecoder,
    SampleEncoder, EXTENSION,
};
use tonewright::metadata::{
    AudioInfo, MetadataDictionary, MetadataKey, SettingInfo, SettingInfoDictionary,
    SettingsDictionary,
};
use tonewright::{AudioEngine, AudioError, EngineConfig, GroupToken, Result};

pub const MOCK_EXTENSION: &str = ".mock";
const HEADER_LEN: usize = 64;
const TAG_LEN: usize = 1024;
const MOCK_BLOCK: usize = 256;

// ============================================================================
// Engines
// ============================================================================

/// Built-in extensions plus the mock format, failing encoder and counting analyzer
pub fn test_engine() -> AudioEngine {
    engine_with(|_| {})
}

/// Like [`test_engine`], with extra registrations applied first
pub fn engine_with(extra: impl FnOnce(&mut ExtensionRegistry)) -> AudioEngine {
    let mut registry = ExtensionRegistry::new();
    extra(&mut registry);
    register_builtins(&mut registry);
    build_engine(registry)
}

/// Like [`test_engine`], with extra registrations applied last
pub fn engine_after(extra: impl FnOnce(&mut ExtensionRegistry)) -> AudioEngine {
    let mut registry = ExtensionRegistry::new();
    register_builtins(&mut registry);
    extra(&mut registry);
    build_engine(registry)
}

fn register_builtins(registry: &mut ExtensionRegistry) {
    tonewright::formats::wave::register(registry);
    tonewright::dsp::register(registry);
    register_mock(registry);
}

fn build_engine(registry: ExtensionRegistry) -> AudioEngine {
    let config = EngineConfig {
        queue_capacity: 4,
        pool_shards: 2,
        retain_per_shape: 8,
    };
    AudioEngine::new(registry, config)
}

pub fn register_mock(registry: &mut ExtensionRegistry) {
    let info = || ExtensionInfo::named("Mock").with(EXTENSION, MOCK_EXTENSION);
    registry
        .register::<dyn AudioInfoDecoder>(info(), || Box::new(MockInfoDecoder))
        .register::<dyn SampleDecoder>(info(), || Box::new(MockDecoder::default()))
        .register::<dyn MetadataDecoder>(info(), || Box::new(MockTagCodec))
        .register::<dyn MetadataEncoder>(info(), || Box::new(MockTagCodec))
        .register::<dyn SampleEncoder>(
            ExtensionInfo::named("Failing").with(EXTENSION, ".wav"),
            || Box::new(FailingEncoder::default()),
        )
        .register::<dyn SampleAnalyzer>(ExtensionInfo::named("FinalCount"), || {
            Box::new(FinalCountAnalyzer::default())
        });
}

// ============================================================================
// File writers
// ============================================================================

/// Write a 16-bit WAVE file holding a constant `amplitude`
pub fn write_wav(path: &Path, channels: u16, frames: usize, amplitude: f32) {
    let spec = WavSpec {
        channels,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let value = (amplitude * 32767.0) as i16;
    for _ in 0..frames * channels as usize {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write a mono 8 kHz WAVE file with format tag 7 (µ-law), which the
/// built-in WAVE extension does not decode
///
/// Every data byte is `byte`.
pub fn write_mulaw_wav(path: &Path, frames: u32, byte: u8) {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend((36 + frames).to_le_bytes());
    bytes.extend(b"WAVEfmt ");
    bytes.extend(16u32.to_le_bytes());
    bytes.extend(7u16.to_le_bytes());
    bytes.extend(1u16.to_le_bytes());
    bytes.extend(8000u32.to_le_bytes());
    bytes.extend(8000u32.to_le_bytes());
    bytes.extend(1u16.to_le_bytes());
    bytes.extend(8u16.to_le_bytes());
    bytes.extend(b"data");
    bytes.extend(frames.to_le_bytes());
    bytes.resize(44 + frames as usize, byte);
    fs::write(path, bytes).unwrap();
}

/// Mock file description
#[derive(Debug, Clone)]
pub struct MockSpec {
    pub channels: u16,
    pub frames: usize,
    pub value: f32,
    /// Sleep between blocks
    pub slow: bool,
    /// Fail after the first block
    pub fail: bool,
}

impl Default for MockSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            frames: 1000,
            value: 0.5,
            slow: false,
            fail: false,
        }
    }
}

pub fn write_mock(path: &Path, spec: &MockSpec) {
    let flags = match (spec.slow, spec.fail) {
        (true, true) => "slow,fail",
        (true, false) => "slow",
        (false, true) => "fail",
        (false, false) => "-",
    };
    let header = format!(
        "MOCK {} 44100 {} {} {}",
        spec.channels, spec.frames, spec.value, flags
    );
    let mut content = format!("{header:<width$}\n", width = HEADER_LEN - 1).into_bytes();
    content.extend(std::iter::repeat(b' ').take(TAG_LEN));
    fs::write(path, content).unwrap();
}

/// Files in `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    entries
}

/// Interleaved samples of a WAVE file
pub fn read_wav(path: &Path) -> Vec<f32> {
    let mut reader = hound::WavReader::open(path).unwrap();
    match reader.spec().sample_format {
        SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap()).collect(),
        SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.unwrap() as f32 / 32768.0)
            .collect(),
    }
}

// ============================================================================
// Mock format
// ============================================================================

struct Header {
    channels: u16,
    rate: u32,
    frames: usize,
    value: f32,
    slow: bool,
    fail: bool,
}

fn read_header(stream: &mut dyn MediaStream) -> Result<Option<Header>> {
    let mut bytes = [0u8; HEADER_LEN];
    if stream.read_exact(&mut bytes).is_err() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&bytes);
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 6 || fields[0] != "MOCK" {
        return Ok(None);
    }

    let parse_error = |field: &str| AudioError::Codec {
        reason: format!("bad mock header field {field}"),
        source: None,
    };
    Ok(Some(Header {
        channels: fields[1].parse().map_err(|_| parse_error("channels"))?,
        rate: fields[2].parse().map_err(|_| parse_error("rate"))?,
        frames: fields[3].parse().map_err(|_| parse_error("frames"))?,
        value: fields[4].parse().map_err(|_| parse_error("value"))?,
        slow: fields[5].contains("slow"),
        fail: fields[5].contains("fail"),
    }))
}

pub struct MockInfoDecoder;

impl AudioInfoDecoder for MockInfoDecoder {
    fn read_audio_info(&mut self, stream: &mut dyn MediaStream) -> Result<Probe<AudioInfo>> {
        match read_header(stream)? {
            Some(header) => Ok(Probe::Supported(AudioInfo::lossless(
                "MOCK",
                header.channels,
                16,
                header.rate,
                header.frames as u64,
            )?)),
            None => Ok(Probe::Unsupported),
        }
    }
}

#[derive(Default)]
pub struct MockDecoder {
    header: Option<Header>,
    produced: usize,
}

impl SampleDecoder for MockDecoder {
    fn initialize(&mut self, mut stream: Box<dyn MediaStream>) -> Result<Probe<()>> {
        match read_header(stream.as_mut())? {
            Some(header) => {
                self.header = Some(header);
                Ok(Probe::Supported(()))
            }
            None => Ok(Probe::Unsupported),
        }
    }

    fn decode_samples(&mut self, pool: &SamplePool) -> Result<SampleCollection> {
        let header = self.header.as_ref().expect("initialized");
        let channels = header.channels as usize;
        if header.fail && self.produced > 0 {
            return Err(AudioError::Codec {
                reason: "mock stream is corrupt".to_string(),
                source: None,
            });
        }
        if header.slow {
            thread::sleep(Duration::from_millis(15));
        }

        let frames = (header.frames - self.produced).min(MOCK_BLOCK);
        self.produced += frames;
        let mut samples = pool.acquire(channels, frames);
        for channel in samples.channels_mut() {
            channel.fill(header.value);
        }
        Ok(samples)
    }
}

/// Tag codec storing a JSON object in the fixed tag region
pub struct MockTagCodec;

pub const COMPACT: &str = "Compact";

impl MetadataDecoder for MockTagCodec {
    fn read_metadata(&mut self, stream: &mut dyn MediaStream) -> Result<Probe<MetadataDictionary>> {
        if read_header(stream)?.is_none() {
            return Ok(Probe::Unsupported);
        }

        let mut region = vec![0u8; TAG_LEN];
        stream.read_exact(&mut region)?;
        let text = String::from_utf8_lossy(&region);
        let text = text.trim();

        let mut metadata = MetadataDictionary::new();
        if !text.is_empty() {
            let values: BTreeMap<String, String> = serde_json::from_str(text)?;
            for (key, value) in values {
                metadata.set(&key, &value)?;
            }
        }
        Ok(Probe::Supported(metadata))
    }
}

impl MetadataEncoder for MockTagCodec {
    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new().with(COMPACT, SettingInfo::Boolean)
    }

    fn write_metadata(
        &mut self,
        stream: &mut dyn EditableStream,
        metadata: &MetadataDictionary,
        _settings: &SettingsDictionary,
    ) -> Result<()> {
        let values: BTreeMap<&str, &str> =
            metadata.iter().map(|(key, value)| (key.as_str(), value)).collect();
        let json = serde_json::to_string(&values)?;
        if json.len() > TAG_LEN {
            return Err(AudioError::Codec {
                reason: "tags do not fit".to_string(),
                source: None,
            });
        }

        stream.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        stream.write_all(format!("{json:<width$}", width = TAG_LEN).as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}

// ============================================================================
// Failing encoder
// ============================================================================

/// Writes a few bytes, then fails on its second collection
#[derive(Default)]
pub struct FailingEncoder {
    stream: Option<Box<dyn OutputStream>>,
    submitted: usize,
}

impl SampleConsumer for FailingEncoder {
    fn submit(&mut self, _samples: &mut SampleCollection) -> Result<()> {
        self.submitted += 1;
        if self.submitted >= 2 {
            return Err(AudioError::Codec {
                reason: "encoder gave up".to_string(),
                source: None,
            });
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.write_all(b"partial")?;
        }
        Ok(())
    }
}

impl SampleEncoder for FailingEncoder {
    fn file_extension(&self) -> &str {
        ".wav"
    }

    fn initialize(
        &mut self,
        mut stream: Box<dyn OutputStream>,
        _info: &AudioInfo,
        _metadata: &MetadataDictionary,
        _settings: &SettingsDictionary,
    ) -> Result<()> {
        stream.write_all(b"RIFF")?;
        self.stream = Some(stream);
        Ok(())
    }
}

// ============================================================================
// Counting analyzer
// ============================================================================

const FINALS_SLOT: &str = "finals";

/// Reports (as `Comment`) how many group members had submitted their final
/// collection when its result was produced
#[derive(Default)]
pub struct FinalCountAnalyzer {
    group: Option<Arc<GroupToken>>,
}

impl SampleConsumer for FinalCountAnalyzer {
    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        if samples.is_last() {
            if let Some(group) = &self.group {
                group.contribute::<usize, _>(FINALS_SLOT, |finals| *finals += 1);
            }
        }
        Ok(())
    }
}

impl SampleAnalyzer for FinalCountAnalyzer {
    fn initialize(&mut self, _info: &AudioInfo, group: &Arc<GroupToken>) -> Result<()> {
        self.group = Some(Arc::clone(group));
        Ok(())
    }

    fn get_result(&mut self) -> Result<MetadataDictionary> {
        let group = self.group.as_ref().expect("initialized");
        group.wait();
        let finals = group.aggregate::<usize>(FINALS_SLOT).unwrap_or(0);

        let mut result = MetadataDictionary::new();
        result.set_key(MetadataKey::Comment, &finals.to_string())?;
        Ok(result)
    }
}
