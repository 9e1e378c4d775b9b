//! RIFF/WAVE PCM support
//!
//! The RIFF container is handled by the `hound` crate; this module adapts it
//! to the extension contracts and converts between integer PCM and the
//! normalized `f32` samples the pipeline carries.

use std::io::{ErrorKind, Read, SeekFrom};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::engine::{SampleCollection, SampleConsumer, SamplePool};
use crate::error::{AudioError, Result};
use crate::extensions::{
    AudioInfoDecoder, ExtensionInfo, ExtensionRegistry, MediaStream, OutputStream, Probe,
    SampleDecoder, SampleEncoder, DESCRIPTION, EXTENSION,
};
use crate::metadata::{
    AudioInfo, MetadataDictionary, SettingInfo, SettingInfoDictionary, SettingsDictionary,
};

/// Registered name of the WAVE extensions
pub const NAME: &str = "Wave";
/// File extension handled and produced
pub const FILE_EXTENSION: &str = ".wav";
/// Encoder setting selecting the output bit depth
pub const BITS_PER_SAMPLE: &str = "BitsPerSample";

/// Frames decoded per collection
const BLOCK_FRAMES: usize = 4096;

/// Register the WAVE info decoder, sample decoder and encoder
pub fn register(registry: &mut ExtensionRegistry) {
    let info = || {
        ExtensionInfo::named(NAME)
            .with(EXTENSION, FILE_EXTENSION)
            .with(DESCRIPTION, "RIFF/WAVE linear PCM")
    };

    registry
        .register::<dyn AudioInfoDecoder>(info(), || Box::new(WaveInfoDecoder))
        .register::<dyn SampleDecoder>(info(), || Box::new(WaveDecoder::default()))
        .register::<dyn SampleEncoder>(info(), || Box::new(WaveEncoder::default()));
}

/// Check the 12-byte RIFF header, leaving the stream at 0
fn is_riff_wave(stream: &mut dyn MediaStream) -> Result<bool> {
    let mut header = [0u8; 12];
    let matched = match stream.read_exact(&mut header) {
        Ok(()) => &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE",
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => false,
        Err(err) => return Err(err.into()),
    };
    stream.seek(SeekFrom::Start(0))?;
    Ok(matched)
}

fn codec_error(context: &str) -> impl FnOnce(hound::Error) -> AudioError + '_ {
    move |err| AudioError::codec(format!("{context}: {err}"), err)
}

/// Parse the format chunk
///
/// RIFF/WAVE files with an encoding hound cannot decode (ADPCM, A-law and
/// the like) are left for later `.wav` candidates.
fn open_reader<R: Read>(stream: R) -> Result<Probe<WavReader<R>>> {
    match WavReader::new(stream) {
        Ok(reader) => Ok(Probe::Supported(reader)),
        Err(hound::Error::Unsupported) => {
            debug!("wave encoding not handled, declining");
            Ok(Probe::Unsupported)
        }
        Err(err) => Err(codec_error("Failed to read WAVE header")(err)),
    }
}

// ============================================================================
// Info decoder
// ============================================================================

/// Reads channel count, bit depth, sample rate and length from the header
#[derive(Debug, Default)]
pub struct WaveInfoDecoder;

impl AudioInfoDecoder for WaveInfoDecoder {
    fn read_audio_info(&mut self, stream: &mut dyn MediaStream) -> Result<Probe<AudioInfo>> {
        if !is_riff_wave(stream)? {
            return Ok(Probe::Unsupported);
        }

        let reader = match open_reader(stream)? {
            Probe::Supported(reader) => reader,
            Probe::Unsupported => return Ok(Probe::Unsupported),
        };
        let spec = reader.spec();
        let info = AudioInfo::lossless(
            "LPCM",
            spec.channels,
            spec.bits_per_sample,
            spec.sample_rate,
            u64::from(reader.duration()),
        )?;
        Ok(Probe::Supported(info))
    }
}

// ============================================================================
// Sample decoder
// ============================================================================

/// Decodes PCM blocks of up to 4096 frames
#[derive(Default)]
pub struct WaveDecoder {
    reader: Option<WavReader<Box<dyn MediaStream>>>,
    interleaved: Vec<f32>,
}

impl SampleDecoder for WaveDecoder {
    fn initialize(&mut self, mut stream: Box<dyn MediaStream>) -> Result<Probe<()>> {
        if !is_riff_wave(stream.as_mut())? {
            return Ok(Probe::Unsupported);
        }

        let reader = match open_reader(stream)? {
            Probe::Supported(reader) => reader,
            Probe::Unsupported => return Ok(Probe::Unsupported),
        };
        let spec = reader.spec();
        debug!(
            channels = spec.channels,
            bits = spec.bits_per_sample,
            sample_rate = spec.sample_rate,
            "wave decoder ready"
        );
        self.reader = Some(reader);
        Ok(Probe::Supported(()))
    }

    fn decode_samples(&mut self, pool: &SamplePool) -> Result<SampleCollection> {
        let reader = self.reader.as_mut().ok_or_else(|| AudioError::Codec {
            reason: "wave decoder used before initialize".to_string(),
            source: None,
        })?;

        let spec = reader.spec();
        let channels = usize::from(spec.channels);
        self.interleaved.clear();
        read_block(reader, spec, BLOCK_FRAMES * channels, &mut self.interleaved)?;

        let mut samples = pool.acquire(channels, BLOCK_FRAMES);
        let frames = samples.copy_from_interleaved(&self.interleaved);
        if frames < BLOCK_FRAMES {
            pool.resize(&mut samples, frames);
        }
        Ok(samples)
    }
}

/// Append up to `count` normalized samples to `out`
fn read_block<R: Read>(
    reader: &mut WavReader<R>,
    spec: WavSpec,
    count: usize,
    out: &mut Vec<f32>,
) -> Result<()> {
    fn collect<R, S>(
        reader: &mut WavReader<R>,
        count: usize,
        out: &mut Vec<f32>,
        scale: impl Fn(S) -> f32,
    ) -> Result<()>
    where
        R: Read,
        S: hound::Sample,
    {
        for sample in reader.samples::<S>().take(count) {
            out.push(scale(sample.map_err(codec_error("Failed to read samples"))?));
        }
        Ok(())
    }

    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => collect(reader, count, out, |s: f32| s),
        (SampleFormat::Int, 1..=8) => collect(reader, count, out, |s: i8| s as f32 / 128.0),
        (SampleFormat::Int, 9..=16) => collect(reader, count, out, |s: i16| s as f32 / 32768.0),
        // 24-bit stored as i32 in hound
        (SampleFormat::Int, 17..=24) => {
            collect(reader, count, out, |s: i32| s as f32 / 8_388_608.0)
        }
        (SampleFormat::Int, 25..=32) => {
            collect(reader, count, out, |s: i32| s as f32 / 2_147_483_648.0)
        }
        (SampleFormat::Int, bits) => Err(AudioError::Codec {
            reason: format!("{bits}-bit integer audio is not supported"),
            source: None,
        }),
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Writes 16- or 24-bit integer, or 32-bit float PCM
#[derive(Default)]
pub struct WaveEncoder {
    writer: Option<WavWriter<Box<dyn OutputStream>>>,
    bits_per_sample: u16,
    interleaved: Vec<f32>,
}

impl WaveEncoder {
    fn write_block(&mut self, samples: &SampleCollection) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| AudioError::Codec {
            reason: "wave encoder used before initialize or after finalize".to_string(),
            source: None,
        })?;

        self.interleaved.clear();
        samples.write_interleaved(&mut self.interleaved);

        let write_error = codec_error("Failed to write samples");
        let written = match self.bits_per_sample {
            16 => self.interleaved.iter().try_for_each(|&sample| {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)
            }),
            24 => self.interleaved.iter().try_for_each(|&sample| {
                let scaled = (sample * 8_388_607.0).clamp(-8_388_608.0, 8_388_607.0) as i32;
                writer.write_sample(scaled)
            }),
            _ => self
                .interleaved
                .iter()
                .try_for_each(|&sample| writer.write_sample(sample)),
        };
        written.map_err(write_error)
    }
}

impl SampleConsumer for WaveEncoder {
    fn submit(&mut self, samples: &mut SampleCollection) -> Result<()> {
        if !samples.is_last() {
            return self.write_block(samples);
        }

        let writer = self.writer.take().ok_or_else(|| AudioError::Codec {
            reason: "wave encoder finalized twice".to_string(),
            source: None,
        })?;
        writer
            .finalize()
            .map_err(codec_error("Failed to finalize WAVE file"))
    }
}

impl SampleEncoder for WaveEncoder {
    fn file_extension(&self) -> &str {
        FILE_EXTENSION
    }

    fn available_settings(&self) -> SettingInfoDictionary {
        SettingInfoDictionary::new()
            .with(BITS_PER_SAMPLE, SettingInfo::choice(["16", "24", "32"]))
    }

    fn initialize(
        &mut self,
        stream: Box<dyn OutputStream>,
        info: &AudioInfo,
        _metadata: &MetadataDictionary,
        settings: &SettingsDictionary,
    ) -> Result<()> {
        let bits_per_sample = match settings.get(BITS_PER_SAMPLE) {
            Some(value) => value.parse().map_err(|_| AudioError::InvalidSetting {
                key: BITS_PER_SAMPLE.to_string(),
                reason: format!("'{value}' is not a bit depth"),
            })?,
            // Keep the source depth where the format allows it
            None => match info.bits_per_sample() {
                24 => 24,
                32 => 32,
                _ => 16,
            },
        };

        let spec = WavSpec {
            channels: info.channels(),
            sample_rate: info.sample_rate(),
            bits_per_sample,
            sample_format: if bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        };

        let writer =
            WavWriter::new(stream, spec).map_err(codec_error("Failed to write WAVE header"))?;
        self.writer = Some(writer);
        self.bits_per_sample = bits_per_sample;
        Ok(())
    }
}
