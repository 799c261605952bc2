//! Chunk codecs.
//!
//! A codec encodes the native endian C-order bytes of one chunk into the bytes stored in a data file, and decodes them back.
//! Codecs implement the [`ByteEncoder`] capability and are composed into a [`CodecChain`], which is applied in order on encode and in reverse on decode.
//!
//! | Codec | Feature | Description |
//! |-------|---------|-------------|
//! | [`bytes`](bytes::BytesCodec) | | Stores elements with a fixed endianness. |
//! | [`crc32c`](crc32c::Crc32cCodec) | `crc32c` | Appends a CRC32C checksum. |
//! | [`gzip`](gzip::GzipCodec) | `gzip` | Gzip compression. |
//!
//! The default chain is a single little endian `bytes` codec, so encoded chunk sizes equal their decoded sizes.
//! The chain of each array is recorded in the checkpoint manifest as a list of [`CodecMetadata`] and rebuilt on read with [`CodecChain::from_metadata`].
//! Other codecs can be used in a save, but a checkpoint that uses them can only be opened once they are registered with [`register_codec`].

pub mod bytes;
#[cfg(feature = "crc32c")]
pub mod crc32c;
#[cfg(feature = "gzip")]
pub mod gzip;

mod options;
mod recommended_concurrency;
mod registry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use options::CodecOptions;
pub use recommended_concurrency::RecommendedConcurrency;
pub use registry::{register_codec, unregister_codec, CodecPlugin, CodecRegistryHandle};

use crate::array::{ArrayShape, DataType};
use ::bytes::Bytes;

/// The size of a byte representation of a chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BytesRepresentation {
    /// The output size is fixed.
    FixedSize(u64),
    /// The output size is bounded.
    BoundedSize(u64),
    /// The output size is unbounded.
    UnboundedSize,
}

impl BytesRepresentation {
    /// Return the fixed or bounded size of the bytes representation, or [`None`] if the size is unbounded.
    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        match self {
            Self::FixedSize(size) | Self::BoundedSize(size) => Some(*size),
            Self::UnboundedSize => None,
        }
    }
}

/// The decoded representation of a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRepresentation {
    shape: ArrayShape,
    data_type: DataType,
}

impl ChunkRepresentation {
    /// Create a new chunk representation.
    #[must_use]
    pub fn new(shape: ArrayShape, data_type: DataType) -> Self {
        Self { shape, data_type }
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the decoded size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.num_elements() * self.data_type.size() as u64
    }
}

/// A codec error.
#[derive(Clone, Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// The decoded size of a chunk did not match what was expected.
    #[error("the size of a decoded chunk is {len}, expected {expected_len}")]
    UnexpectedChunkDecodedSize {
        /// The decoded length.
        len: u64,
        /// The expected length.
        expected_len: u64,
    },
    /// An embedded checksum does not match the decoded value.
    #[error("the checksum is invalid")]
    InvalidChecksum,
    /// The codec is not supported.
    #[error("codec {0} is not supported")]
    UnsupportedCodec(String),
    /// The codec configuration is invalid.
    #[error("codec {name} has an invalid configuration {configuration}")]
    InvalidConfiguration {
        /// The codec name.
        name: String,
        /// The invalid configuration.
        configuration: String,
    },
    /// Other
    #[error("{_0}")]
    Other(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

impl From<&str> for CodecError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for CodecError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// The name and configuration of a codec, as stored in a checkpoint manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecMetadata {
    /// The codec name.
    pub name: String,
    /// The codec configuration.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl CodecMetadata {
    /// Create codec metadata from a name and a serializable configuration.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `configuration` does not serialize to a JSON object.
    pub fn new(name: &str, configuration: &impl Serialize) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidConfiguration {
            name: name.to_string(),
            configuration: String::new(),
        };
        match serde_json::to_value(configuration).map_err(|_| invalid())? {
            serde_json::Value::Object(configuration) => Ok(Self {
                name: name.to_string(),
                configuration,
            }),
            _ => Err(invalid()),
        }
    }

    /// Deserialize the configuration.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidConfiguration`] if the configuration is not valid for `T`.
    pub fn to_configuration<T: serde::de::DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(serde_json::Value::Object(self.configuration.clone())).map_err(
            |_| CodecError::InvalidConfiguration {
                name: self.name.clone(),
                configuration: serde_json::Value::Object(self.configuration.clone()).to_string(),
            },
        )
    }
}

/// The chunk encode/decode capability.
///
/// Encoding must be deterministic: the same input always produces the same output.
pub trait ByteEncoder: core::fmt::Debug + Send + Sync {
    /// The codec metadata stored in the manifest.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the configuration cannot be serialized.
    fn metadata(&self) -> Result<CodecMetadata, CodecError>;

    /// Return the recommended concurrency for the given decoded representation.
    fn recommended_concurrency(&self, decoded_representation: &BytesRepresentation)
        -> RecommendedConcurrency;

    /// Return the encoded representation given a decoded representation.
    ///
    /// Used for scheduling and logging only.
    fn encoded_representation(
        &self,
        decoded_representation: &BytesRepresentation,
    ) -> BytesRepresentation;

    /// Encode chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the bytes cannot be encoded.
    fn encode(
        &self,
        decoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        options: &CodecOptions,
    ) -> Result<Bytes, CodecError>;

    /// Decode chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the bytes cannot be decoded.
    fn decode(
        &self,
        encoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        options: &CodecOptions,
    ) -> Result<Bytes, CodecError>;
}

/// A chain of codecs.
#[derive(Debug, Clone)]
pub struct CodecChain(Vec<Arc<dyn ByteEncoder>>);

impl Default for CodecChain {
    fn default() -> Self {
        Self(vec![Arc::new(bytes::BytesCodec::little())])
    }
}

impl CodecChain {
    /// Create a new codec chain.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `codecs` is empty.
    pub fn new(codecs: Vec<Arc<dyn ByteEncoder>>) -> Result<Self, CodecError> {
        if codecs.is_empty() {
            Err(CodecError::Other("a codec chain must have at least one codec".to_string()))
        } else {
            Ok(Self(codecs))
        }
    }

    /// Create a codec chain from manifest metadata.
    ///
    /// Codecs registered with [`register_codec`] are resolved before the built-in codecs.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if a codec is unsupported or has an invalid configuration.
    pub fn from_metadata(metadata: &[CodecMetadata]) -> Result<Self, CodecError> {
        let codecs = metadata
            .iter()
            .map(|metadata| -> Result<Arc<dyn ByteEncoder>, CodecError> {
                if let Some(codec) = registry::create_registered(metadata) {
                    return codec;
                }
                match metadata.name.as_str() {
                    bytes::IDENTIFIER => Ok(Arc::new(bytes::BytesCodec::new_with_configuration(
                        &metadata.to_configuration()?,
                    ))),
                    #[cfg(feature = "crc32c")]
                    crc32c::IDENTIFIER => Ok(Arc::new(crc32c::Crc32cCodec::new())),
                    #[cfg(feature = "gzip")]
                    gzip::IDENTIFIER => Ok(Arc::new(gzip::GzipCodec::new_with_configuration(
                        &metadata.to_configuration()?,
                    )?)),
                    name => Err(CodecError::UnsupportedCodec(name.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(codecs)
    }

    /// Return the codecs.
    #[must_use]
    pub fn codecs(&self) -> &[Arc<dyn ByteEncoder>] {
        &self.0
    }

    /// Return the metadata of every codec in the chain.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if a codec configuration cannot be serialized.
    pub fn metadata(&self) -> Result<Vec<CodecMetadata>, CodecError> {
        self.0.iter().map(|codec| codec.metadata()).collect()
    }

    /// Return the recommended concurrency of the chain for a chunk.
    #[must_use]
    pub fn recommended_concurrency(
        &self,
        chunk_representation: &ChunkRepresentation,
    ) -> RecommendedConcurrency {
        let mut concurrency_min = usize::MAX;
        let mut concurrency_max = 0;
        let mut representation = BytesRepresentation::FixedSize(chunk_representation.size());
        for codec in &self.0 {
            let recommended_concurrency = codec.recommended_concurrency(&representation);
            concurrency_min = std::cmp::min(concurrency_min, recommended_concurrency.min());
            concurrency_max = std::cmp::max(concurrency_max, recommended_concurrency.max());
            representation = codec.encoded_representation(&representation);
        }
        RecommendedConcurrency::new(concurrency_min..concurrency_max)
    }

    /// Return the encoded representation of a chunk.
    #[must_use]
    pub fn encoded_representation(
        &self,
        chunk_representation: &ChunkRepresentation,
    ) -> BytesRepresentation {
        self.0.iter().fold(
            BytesRepresentation::FixedSize(chunk_representation.size()),
            |representation, codec| codec.encoded_representation(&representation),
        )
    }

    /// Encode the bytes of a chunk.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the length of `decoded_value` does not match `chunk_representation` or a codec fails.
    pub fn encode(
        &self,
        decoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let expected_len = chunk_representation.size();
        if decoded_value.len() as u64 != expected_len {
            return Err(CodecError::UnexpectedChunkDecodedSize {
                len: decoded_value.len() as u64,
                expected_len,
            });
        }
        self.0.iter().try_fold(decoded_value, |value, codec| {
            codec.encode(value, chunk_representation, options)
        })
    }

    /// Decode the bytes of a chunk.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if a codec fails or the decoded length does not match `chunk_representation`.
    pub fn decode(
        &self,
        encoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let decoded_value = self.0.iter().rev().try_fold(encoded_value, |value, codec| {
            codec.decode(value, chunk_representation, options)
        })?;
        let expected_len = chunk_representation.size();
        if decoded_value.len() as u64 == expected_len {
            Ok(decoded_value)
        } else {
            Err(CodecError::UnexpectedChunkDecodedSize {
                len: decoded_value.len() as u64,
                expected_len,
            })
        }
    }
}
