//! Extension registry
//!
//! Holds every registered extension, grouped by capability, and answers
//! queries by metadata field. Built explicitly (by the host or
//! [`ExtensionRegistry::with_defaults`]) and then shared read-only behind an
//! `Arc`, so lookups need no locking.

use std::fmt;
use std::sync::Arc;

use super::{
    AudioInfoDecoder, MetadataDecoder, MetadataEncoder, SampleAnalyzer, SampleDecoder,
    SampleEncoder, SampleFilter, DESCRIPTION, EXTENSION, NAME,
};
use crate::error::{AudioError, Result};

// ============================================================================
// Descriptors
// ============================================================================

/// Metadata fields describing one registered extension
///
/// Field names and values are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionInfo {
    fields: Vec<(String, String)>,
}

impl ExtensionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an extension selected by `Name`
    pub fn named(name: &str) -> Self {
        Self::new().with(NAME, name)
    }

    /// Shorthand for an extension selected by file `Extension`
    pub fn for_extension(extension: &str) -> Self {
        Self::new().with(EXTENSION, extension)
    }

    /// Add (or replace) a field
    pub fn with(mut self, key: &str, value: &str) -> Self {
        match self
            .fields
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(field) => field.1 = value.to_string(),
            None => self.fields.push((key.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True when field `key` equals `value`, ignoring case
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case(value))
            .unwrap_or(false)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME)
    }

    pub fn description(&self) -> Option<&str> {
        self.get(DESCRIPTION)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A registered extension: descriptive fields plus a factory
///
/// Each call to [`Extension::create`] yields a fresh, short-lived instance.
pub struct Extension<T: ?Sized> {
    info: ExtensionInfo,
    factory: Arc<dyn Fn() -> Box<T> + Send + Sync>,
}

impl<T: ?Sized> Extension<T> {
    pub fn new(info: ExtensionInfo, factory: impl Fn() -> Box<T> + Send + Sync + 'static) -> Self {
        Self {
            info,
            factory: Arc::new(factory),
        }
    }

    pub fn info(&self) -> &ExtensionInfo {
        &self.info
    }

    pub fn create(&self) -> Box<T> {
        (self.factory)()
    }
}

impl<T: ?Sized> Clone for Extension<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Extension<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension").field("info", &self.info).finish()
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// A capability trait object type that the registry can store
///
/// Implemented for `dyn SampleDecoder`, `dyn SampleEncoder`, and the other
/// capability traits.
pub trait Capability: 'static {
    /// Human-readable capability name used in errors ("encoder")
    const KIND: &'static str;

    fn slot(registry: &ExtensionRegistry) -> &Vec<Extension<Self>>;

    fn slot_mut(registry: &mut ExtensionRegistry) -> &mut Vec<Extension<Self>>;
}

macro_rules! impl_capability {
    ($capability:ident, $field:ident, $kind:expr) => {
        impl Capability for dyn $capability {
            const KIND: &'static str = $kind;

            fn slot(registry: &ExtensionRegistry) -> &Vec<Extension<Self>> {
                &registry.$field
            }

            fn slot_mut(registry: &mut ExtensionRegistry) -> &mut Vec<Extension<Self>> {
                &mut registry.$field
            }
        }
    };
}

impl_capability!(AudioInfoDecoder, info_decoders, "audio info decoder");
impl_capability!(SampleDecoder, sample_decoders, "decoder");
impl_capability!(SampleEncoder, sample_encoders, "encoder");
impl_capability!(MetadataDecoder, metadata_decoders, "metadata decoder");
impl_capability!(MetadataEncoder, metadata_encoders, "metadata encoder");
impl_capability!(SampleAnalyzer, sample_analyzers, "analyzer");
impl_capability!(SampleFilter, sample_filters, "filter");

// ============================================================================
// Registry
// ============================================================================

/// Registry of available extensions, grouped by capability
#[derive(Default)]
pub struct ExtensionRegistry {
    info_decoders: Vec<Extension<dyn AudioInfoDecoder>>,
    sample_decoders: Vec<Extension<dyn SampleDecoder>>,
    sample_encoders: Vec<Extension<dyn SampleEncoder>>,
    metadata_decoders: Vec<Extension<dyn MetadataDecoder>>,
    metadata_encoders: Vec<Extension<dyn MetadataEncoder>>,
    sample_analyzers: Vec<Extension<dyn SampleAnalyzer>>,
    sample_filters: Vec<Extension<dyn SampleFilter>>,
}

impl ExtensionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with the built-in extensions
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::formats::wave::register(&mut registry);
        crate::dsp::register(&mut registry);
        registry
    }

    /// Register an extension under a capability
    ///
    /// Candidates for the same query are tried in registration order.
    pub fn register<C>(
        &mut self,
        info: ExtensionInfo,
        factory: impl Fn() -> Box<C> + Send + Sync + 'static,
    ) -> &mut Self
    where
        C: Capability + ?Sized,
    {
        C::slot_mut(self).push(Extension::new(info, factory));
        self
    }

    /// Every extension registered under a capability
    pub fn find_all<C>(&self) -> &[Extension<C>]
    where
        C: Capability + ?Sized,
    {
        C::slot(self)
    }

    /// Extensions whose field `key` equals `value` (case-insensitive)
    ///
    /// An empty result is not an error; the caller decides.
    pub fn find<C>(&self, key: &str, value: &str) -> Vec<&Extension<C>>
    where
        C: Capability + ?Sized,
    {
        C::slot(self)
            .iter()
            .filter(|ext| ext.info().matches(key, value))
            .collect()
    }

    /// The first extension registered under `name`
    pub fn find_named<C>(&self, name: &str) -> Result<&Extension<C>>
    where
        C: Capability + ?Sized,
    {
        C::slot(self)
            .iter()
            .find(|ext| ext.info().matches(NAME, name))
            .ok_or_else(|| AudioError::UnknownExtension {
                capability: C::KIND,
                name: name.to_string(),
            })
    }

    /// Extensions handling a file extension (".wav"), dot included
    pub fn find_for_extension<C>(&self, extension: &str) -> Vec<&Extension<C>>
    where
        C: Capability + ?Sized,
    {
        self.find(EXTENSION, extension)
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("info_decoders", &self.info_decoders.len())
            .field("sample_decoders", &self.sample_decoders.len())
            .field("sample_encoders", &self.sample_encoders.len())
            .field("metadata_decoders", &self.metadata_decoders.len())
            .field("metadata_encoders", &self.metadata_encoders.len())
            .field("sample_analyzers", &self.sample_analyzers.len())
            .field("sample_filters", &self.sample_filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SampleCollection, SamplePool};
    use crate::extensions::{MediaStream, Probe};

    struct NullDecoder;

    impl SampleDecoder for NullDecoder {
        fn initialize(&mut self, _stream: Box<dyn MediaStream>) -> Result<Probe<()>> {
            Ok(Probe::Unsupported)
        }

        fn decode_samples(&mut self, pool: &SamplePool) -> Result<SampleCollection> {
            Ok(pool.acquire(1, 0))
        }
    }

    fn registry() -> ExtensionRegistry {
        let mut registry = ExtensionRegistry::new();
        registry
            .register::<dyn SampleDecoder>(
                ExtensionInfo::for_extension(".mp3").with(NAME, "First"),
                || Box::new(NullDecoder),
            )
            .register::<dyn SampleDecoder>(ExtensionInfo::for_extension(".flac"), || {
                Box::new(NullDecoder)
            })
            .register::<dyn SampleDecoder>(
                ExtensionInfo::for_extension(".MP3").with(NAME, "Second"),
                || Box::new(NullDecoder),
            );
        registry
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ExtensionRegistry::with_defaults();

        assert!(registry.find_named::<dyn SampleEncoder>("Wave").is_ok());
        assert!(registry.find_named::<dyn SampleAnalyzer>("Peak").is_ok());
        assert!(registry.find_named::<dyn SampleFilter>("ReplayGain").is_ok());
        assert_eq!(registry.find_for_extension::<dyn SampleDecoder>(".wav").len(), 1);
        assert_eq!(
            registry.find_for_extension::<dyn AudioInfoDecoder>(".WAV").len(),
            1
        );
    }

    #[test]
    fn test_find_is_case_insensitive_and_ordered() {
        let registry = registry();
        let matches = registry.find::<dyn SampleDecoder>("extension", ".mp3");

        let names: Vec<_> = matches.iter().map(|e| e.info().name()).collect();
        assert_eq!(names, vec![Some("First"), Some("Second")]);
    }

    #[test]
    fn test_find_without_match_is_empty() {
        let registry = registry();
        assert!(registry.find::<dyn SampleDecoder>(EXTENSION, ".ogg").is_empty());
        assert!(registry.find_all::<dyn SampleEncoder>().is_empty());
    }

    #[test]
    fn test_find_named_unknown() {
        let registry = registry();
        match registry.find_named::<dyn SampleEncoder>("Lame MP3") {
            Err(AudioError::UnknownExtension { capability, name }) => {
                assert_eq!(capability, "encoder");
                assert_eq!(name, "Lame MP3");
            }
            other => panic!("expected UnknownExtension, got {other:?}"),
        }
    }

    #[test]
    fn test_factory_creates_fresh_instances() {
        let registry = registry();
        let extension = &registry.find_all::<dyn SampleDecoder>()[0];
        let pool = SamplePool::with_shards(1, 1);

        let mut a = extension.create();
        let b = extension.create();
        assert!(a.decode_samples(&pool).unwrap().is_last());
        drop(b);
    }

    #[test]
    fn test_extension_info_fields() {
        let info = ExtensionInfo::named("Wave")
            .with(EXTENSION, ".wav")
            .with("name", "Renamed");
        assert_eq!(info.name(), Some("Renamed"));
        assert!(info.matches("EXTENSION", ".WAV"));
        assert!(!info.matches(DESCRIPTION, "anything"));
        assert_eq!(info.iter().count(), 2);
    }
}
