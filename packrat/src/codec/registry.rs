//! Runtime registration of codecs.
//!
//! The built-in codecs are always available to [`CodecChain::from_metadata`](super::CodecChain::from_metadata).
//! Any other [`ByteEncoder`] must be registered with [`register_codec`] before a checkpoint that uses it can be opened.
//! Registered codecs take precedence over the built-in codecs.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::{ByteEncoder, CodecError, CodecMetadata};

/// A codec plugin, creating a [`ByteEncoder`] from the [`CodecMetadata`] recorded in a manifest.
#[allow(clippy::type_complexity)]
pub struct CodecPlugin {
    identifier: String,
    create_fn: Box<dyn Fn(&CodecMetadata) -> Result<Arc<dyn ByteEncoder>, CodecError> + Send + Sync>,
}

impl core::fmt::Debug for CodecPlugin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecPlugin")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl CodecPlugin {
    /// Create a new codec plugin for codecs named `identifier`.
    pub fn new<C>(identifier: impl Into<String>, create_fn: C) -> Self
    where
        C: Fn(&CodecMetadata) -> Result<Arc<dyn ByteEncoder>, CodecError> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            create_fn: Box::new(create_fn),
        }
    }

    /// Return the identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns true if the plugin creates codecs named `name`.
    #[must_use]
    pub fn match_name(&self, name: &str) -> bool {
        self.identifier == name
    }

    /// Create a codec from `metadata`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the configuration is invalid.
    pub fn create(&self, metadata: &CodecMetadata) -> Result<Arc<dyn ByteEncoder>, CodecError> {
        (self.create_fn)(metadata)
    }
}

/// A handle to a registered codec plugin. See [`register_codec`].
pub type CodecRegistryHandle = Arc<CodecPlugin>;

static CODEC_REGISTRY: LazyLock<RwLock<Vec<CodecRegistryHandle>>> =
    LazyLock::new(RwLock::default);

/// Register a codec plugin and return a handle for [`unregister_codec`].
///
/// ```rust
/// # use std::sync::Arc;
/// use packrat::codec::{bytes::BytesCodec, register_codec, unregister_codec, CodecPlugin};
///
/// let handle = register_codec(CodecPlugin::new("my.bytes", |metadata| {
///     Ok(Arc::new(BytesCodec::new_with_configuration(&metadata.to_configuration()?)))
/// }));
/// assert!(unregister_codec(&handle));
/// ```
pub fn register_codec(plugin: CodecPlugin) -> CodecRegistryHandle {
    let plugin = Arc::new(plugin);
    log::debug!("registered codec {}", plugin.identifier());
    CODEC_REGISTRY.write().push(plugin.clone());
    plugin
}

/// Unregister a codec plugin.
///
/// Returns true if the plugin was registered.
pub fn unregister_codec(handle: &CodecRegistryHandle) -> bool {
    let mut plugins = CODEC_REGISTRY.write();
    if let Some(position) = plugins.iter().position(|p| Arc::ptr_eq(p, handle)) {
        plugins.remove(position);
        true
    } else {
        false
    }
}

/// Create a codec from a registered plugin matching the name of `metadata`.
///
/// Returns [`None`] if no registered plugin matches. The most recently registered match wins.
pub(super) fn create_registered(
    metadata: &CodecMetadata,
) -> Option<Result<Arc<dyn ByteEncoder>, CodecError>> {
    CODEC_REGISTRY
        .read()
        .iter()
        .rev()
        .find(|plugin| plugin.match_name(&metadata.name))
        .map(|plugin| plugin.create(metadata))
}
