//! The `gzip` codec.
//!
//! ### Codec `configuration` Example - [`GzipCodecConfiguration`]:
//! ```rust
//! # let JSON = r#"
//! {
//!     "level": 1
//! }
//! # "#;
//! # use packrat::codec::gzip::GzipCodecConfiguration;
//! # serde_json::from_str::<GzipCodecConfiguration>(JSON).unwrap();
//! ```

use std::io::{Cursor, Read};

use ::bytes::Bytes;
use flate2::bufread::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    ByteEncoder, BytesRepresentation, ChunkRepresentation, CodecError, CodecMetadata,
    CodecOptions, RecommendedConcurrency,
};

/// The codec name.
pub const IDENTIFIER: &str = "gzip";

/// An invalid gzip compression level.
#[derive(Clone, Debug, Error)]
#[error("invalid gzip compression level {0}, expected 0-9")]
pub struct GzipCompressionLevelError(u32);

/// A `gzip` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
pub struct GzipCodecConfiguration {
    /// The compression level, 0-9.
    pub level: u32,
}

/// A `gzip` codec implementation.
#[derive(Clone, Debug)]
pub struct GzipCodec {
    compression_level: u32,
}

impl GzipCodec {
    /// Create a new `gzip` codec.
    ///
    /// # Errors
    /// Returns [`GzipCompressionLevelError`] if `compression_level` is not valid.
    pub fn new(compression_level: u32) -> Result<Self, GzipCompressionLevelError> {
        if compression_level <= 9 {
            Ok(Self { compression_level })
        } else {
            Err(GzipCompressionLevelError(compression_level))
        }
    }

    /// Create a new `gzip` codec from configuration.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the configuration is not valid.
    pub fn new_with_configuration(
        configuration: &GzipCodecConfiguration,
    ) -> Result<Self, CodecError> {
        Self::new(configuration.level).map_err(|err| CodecError::InvalidConfiguration {
            name: IDENTIFIER.to_string(),
            configuration: err.to_string(),
        })
    }
}

impl ByteEncoder for GzipCodec {
    fn metadata(&self) -> Result<CodecMetadata, CodecError> {
        CodecMetadata::new(
            IDENTIFIER,
            &GzipCodecConfiguration {
                level: self.compression_level,
            },
        )
    }

    fn recommended_concurrency(
        &self,
        _decoded_representation: &BytesRepresentation,
    ) -> RecommendedConcurrency {
        RecommendedConcurrency::new_maximum(1)
    }

    fn encoded_representation(
        &self,
        decoded_representation: &BytesRepresentation,
    ) -> BytesRepresentation {
        decoded_representation
            .size()
            .map_or(BytesRepresentation::UnboundedSize, |size| {
                // https://www.gnu.org/software/gzip/manual/gzip.pdf
                const HEADER_TRAILER_OVERHEAD: u64 = 10 + 8;
                const BLOCK_SIZE: u64 = 32768;
                const BLOCK_OVERHEAD: u64 = 5;
                let blocks_overhead = BLOCK_OVERHEAD * size.div_ceil(BLOCK_SIZE);
                BytesRepresentation::BoundedSize(size + HEADER_TRAILER_OVERHEAD + blocks_overhead)
            })
    }

    fn encode(
        &self,
        decoded_value: Bytes,
        _chunk_representation: &ChunkRepresentation,
        _options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out.into())
    }

    fn decode(
        &self,
        encoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        _options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::with_capacity(
            usize::try_from(chunk_representation.size()).unwrap_or_default(),
        );
        decoder.read_to_end(&mut out)?;
        Ok(out.into())
    }
}
