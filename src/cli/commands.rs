//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command. Commands that take
//! several files keep going after a failure and report every file.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::engine::{AudioEngine, CancellationToken, EngineConfig};
use crate::error::AudioError;
use crate::extensions::{
    AudioInfoDecoder, Capability, ExtensionRegistry, MetadataDecoder, MetadataEncoder,
    SampleAnalyzer, SampleDecoder, SampleEncoder, SampleFilter, EXTENSION,
};
use crate::files::{AudioFile, ExportOptions, FilterRequest};
use crate::group::GroupToken;
use crate::metadata::{SettingInfoDictionary, SettingsDictionary};

pub type Result<T> = anyhow::Result<T>;

/// Build the engine from an optional config file and overrides
pub fn build_engine(config: Option<&Path>, queue_capacity: Option<usize>) -> Result<AudioEngine> {
    let mut config = match config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(capacity) = queue_capacity {
        config.queue_capacity = capacity;
    }
    config.validate()?;

    Ok(AudioEngine::new(ExtensionRegistry::with_defaults(), config))
}

/// Expand directories into the audio files beneath them
///
/// Files given explicitly are kept as-is; files found by walking a directory
/// are kept only if some info decoder claims their extension.
pub fn collect_inputs(engine: &AudioEngine, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if !path.is_dir() {
            inputs.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to read {}", path.display()))?;
            if entry.file_type().is_file() && is_known_audio(engine, entry.path()) {
                inputs.push(entry.into_path());
            }
        }
    }

    if inputs.is_empty() {
        bail!("no audio files found");
    }
    Ok(inputs)
}

fn is_known_audio(engine: &AudioEngine, path: &Path) -> bool {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .map(|ext| {
            !engine
                .registry()
                .find_for_extension::<dyn AudioInfoDecoder>(&ext)
                .is_empty()
        })
        .unwrap_or(false)
}

/// Parse `NAME` or `NAME:KEY=VALUE,KEY=VALUE`
pub fn parse_filter(spec: &str) -> Result<FilterRequest> {
    let (name, settings) = match spec.split_once(':') {
        Some((name, pairs)) => (
            name,
            SettingsDictionary::from_pairs(pairs.split(',').filter(|p| !p.is_empty()))?,
        ),
        None => (spec, SettingsDictionary::new()),
    };
    if name.trim().is_empty() {
        bail!("filter '{spec}' has no name");
    }
    Ok(FilterRequest::new(name.trim(), settings))
}

/// Print one failure, with a hint when the library has one
fn report(path: &Path, err: &anyhow::Error) {
    eprintln!("{}: {:#}", path.display(), err);
    if let Some(suggestion) = err
        .downcast_ref::<AudioError>()
        .and_then(AudioError::recovery_suggestion)
    {
        eprintln!("  hint: {suggestion}");
    }
}

fn finish(failures: usize, total: usize) -> Result<()> {
    if failures > 0 {
        bail!("{failures} of {total} file(s) failed");
    }
    Ok(())
}

// ============================================================================
// list
// ============================================================================

/// List the registered extensions.
pub fn list(engine: &AudioEngine) -> Result<()> {
    let registry = engine.registry();

    print_capability::<dyn AudioInfoDecoder>(registry, |_| None);
    print_capability::<dyn SampleDecoder>(registry, |_| None);
    print_capability::<dyn MetadataDecoder>(registry, |_| None);
    print_capability::<dyn SampleEncoder>(registry, |e| Some(e.available_settings()));
    print_capability::<dyn MetadataEncoder>(registry, |e| Some(e.available_settings()));
    print_capability::<dyn SampleAnalyzer>(registry, |_| None);
    print_capability::<dyn SampleFilter>(registry, |e| Some(e.available_settings()));

    Ok(())
}

fn print_capability<C>(
    registry: &ExtensionRegistry,
    settings: impl Fn(&C) -> Option<SettingInfoDictionary>,
) where
    C: Capability + ?Sized,
{
    let extensions = registry.find_all::<C>();
    if extensions.is_empty() {
        return;
    }

    println!("{}s:", C::KIND);
    for extension in extensions {
        let info = extension.info();
        let label = info
            .name()
            .or_else(|| info.get(EXTENSION))
            .unwrap_or("(unnamed)");
        match info.description() {
            Some(description) => println!("  {label:<16} {description}"),
            None => println!("  {label}"),
        }

        let instance = extension.create();
        let available = settings(&*instance).unwrap_or_default();
        for (key, setting) in available.iter() {
            let described = serde_json::to_string(setting).unwrap_or_default();
            println!("      {key} {described}");
        }
    }
    println!();
}

// ============================================================================
// info
// ============================================================================

/// Show format information and tags.
pub fn info(engine: &AudioEngine, paths: &[PathBuf], json: bool) -> Result<()> {
    let inputs = collect_inputs(engine, paths)?;
    let mut failures = 0;

    for path in &inputs {
        if let Err(err) = info_one(engine, path, json) {
            report(path, &err);
            failures += 1;
        }
    }

    finish(failures, inputs.len())
}

fn info_one(engine: &AudioEngine, path: &Path, json: bool) -> Result<()> {
    let mut file = AudioFile::open(engine, path)?;
    let audio_info = file.info().clone();
    let metadata = file.metadata()?;

    if json {
        let value = serde_json::json!({
            "path": path,
            "info": audio_info,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", path.display());
    println!("  Format:      {}", audio_info.format());
    println!("  Channels:    {}", audio_info.channels());
    if audio_info.is_lossless() {
        println!("  Bit depth:   {}", audio_info.bits_per_sample());
    } else if audio_info.bit_rate() > 0 {
        println!("  Bit rate:    {} kbps", audio_info.bit_rate() / 1000);
    }
    println!("  Sample rate: {} Hz", audio_info.sample_rate());
    println!("  Duration:    {:.2} s", audio_info.duration().as_secs_f64());
    for (key, value) in metadata.iter() {
        println!("  {:<12} {}", format!("{key}:"), value);
    }

    Ok(())
}

// ============================================================================
// export
// ============================================================================

/// Transcode every input with the named encoder.
pub fn export(
    engine: &AudioEngine,
    encoder: &str,
    paths: &[PathBuf],
    settings: &SettingsDictionary,
    options: &ExportOptions,
) -> Result<()> {
    let inputs = collect_inputs(engine, paths)?;
    if inputs.len() > 1 && options.output_name.is_some() {
        bail!("--name can only be used with a single input file");
    }

    let mut failures = 0;
    for path in &inputs {
        let exported = AudioFile::open(engine, path)
            .map_err(anyhow::Error::from)
            .and_then(|mut file| {
                file.export(encoder, settings, options, &CancellationToken::new())
                    .with_context(|| format!("export with {encoder} failed"))
            });

        match exported {
            Ok(output) => println!("{} -> {}", path.display(), output.path().display()),
            Err(err) => {
                report(path, &err);
                failures += 1;
            }
        }
    }

    finish(failures, inputs.len())
}

// ============================================================================
// analyze
// ============================================================================

/// Run an analyzer over every input, saving the results where possible.
///
/// With `group`, all files are analyzed concurrently as one group so album
/// values cover the whole set.
/// Pair a group member's outcome with its file, reporting a panic as a failure
fn joined_outcome(path: PathBuf, joined: thread::Result<Result<()>>) -> (PathBuf, Result<()>) {
    match joined {
        Ok(outcome) => (path, outcome),
        Err(_) => (path, Err(anyhow::anyhow!("analysis thread panicked"))),
    }
}

pub fn analyze(
    engine: &AudioEngine,
    analyzer: &str,
    paths: &[PathBuf],
    group: bool,
    dry_run: bool,
) -> Result<()> {
    let inputs = collect_inputs(engine, paths)?;
    let mut failures = 0;

    let mut files = Vec::with_capacity(inputs.len());
    for path in &inputs {
        match AudioFile::open(engine, path) {
            Ok(file) => files.push(file),
            Err(err) => {
                report(path, &anyhow::Error::from(err));
                failures += 1;
            }
        }
    }

    let outcomes: Vec<(PathBuf, Result<()>)> = if group {
        let token = GroupToken::new(files.len());
        info!(files = files.len(), analyzer, "analyzing as a group");
        thread::scope(|scope| {
            let handles: Vec<_> = files
                .into_iter()
                .map(|mut file| {
                    let token = &token;
                    let path = file.path().to_path_buf();
                    let handle = scope.spawn(move || {
                        analyze_one(&mut file, analyzer, Some(token), dry_run)
                    });
                    (path, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(path, handle)| joined_outcome(path, handle.join()))
                .collect()
        })
    } else {
        files
            .into_iter()
            .map(|mut file| {
                let outcome = analyze_one(&mut file, analyzer, None, dry_run);
                (file.path().to_path_buf(), outcome)
            })
            .collect()
    };

    for (path, outcome) in outcomes {
        if let Err(err) = outcome {
            report(&path, &err);
            failures += 1;
        }
    }

    finish(failures, inputs.len())
}

fn analyze_one(
    file: &mut AudioFile,
    analyzer: &str,
    group: Option<&std::sync::Arc<GroupToken>>,
    dry_run: bool,
) -> Result<()> {
    file.analyze(analyzer, group, &CancellationToken::new())
        .with_context(|| format!("{analyzer} analysis failed"))?;

    let path = file.path().to_path_buf();
    let lines: Vec<String> = file
        .metadata()?
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    println!("{}: {}", path.display(), lines.join(" "));

    if dry_run {
        return Ok(());
    }
    match file.save_metadata(&SettingsDictionary::new()) {
        Ok(()) => Ok(()),
        Err(AudioError::Unsupported { .. }) => {
            warn!(path = %path.display(), "no metadata encoder for this format, results not saved");
            Ok(())
        }
        Err(err) => Err(err).context("saving results failed"),
    }
}

// ============================================================================
// set-metadata / clear-metadata
// ============================================================================

/// Apply `KEY=VALUE` tags to every input and save them.
pub fn set_metadata(
    engine: &AudioEngine,
    paths: &[PathBuf],
    tags: &[String],
    settings: &SettingsDictionary,
) -> Result<()> {
    let mut parsed = Vec::with_capacity(tags.len());
    for tag in tags {
        let (key, value) = tag
            .split_once('=')
            .with_context(|| format!("tag '{tag}' is not KEY=VALUE"))?;
        parsed.push((key.trim(), value.trim()));
    }

    let inputs = collect_inputs(engine, paths)?;
    let mut failures = 0;
    for path in &inputs {
        let outcome = (|| -> Result<()> {
            let mut file = AudioFile::open(engine, path)?;
            let metadata = file.metadata_mut()?;
            for (key, value) in &parsed {
                metadata.set(key, value)?;
            }
            file.save_metadata(settings)?;
            Ok(())
        })();

        match outcome {
            Ok(()) => println!("{}: saved", path.display()),
            Err(err) => {
                report(path, &err);
                failures += 1;
            }
        }
    }

    finish(failures, inputs.len())
}

/// Remove all tags from every input.
pub fn clear_metadata(
    engine: &AudioEngine,
    paths: &[PathBuf],
    settings: &SettingsDictionary,
) -> Result<()> {
    let inputs = collect_inputs(engine, paths)?;
    let mut failures = 0;
    for path in &inputs {
        let outcome = AudioFile::open(engine, path)
            .and_then(|mut file| file.clear_metadata(settings))
            .map_err(anyhow::Error::from);

        match outcome {
            Ok(()) => println!("{}: cleared", path.display()),
            Err(err) => {
                report(path, &err);
                failures += 1;
            }
        }
    }

    finish(failures, inputs.len())
}
