//! The `crc32c` codec.
//!
//! Appends a little endian CRC32C checksum of the input bytes.
//! The checksum is validated on decode unless [`CodecOptions::validate_checksums`] is disabled.

use ::bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{
    ByteEncoder, BytesRepresentation, ChunkRepresentation, CodecError, CodecMetadata,
    CodecOptions, RecommendedConcurrency,
};

/// The codec name.
pub const IDENTIFIER: &str = "crc32c";

const CHECKSUM_SIZE: usize = size_of::<u32>();

/// A `crc32c` codec configuration. It has no options.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Crc32cCodecConfiguration {}

/// A `crc32c` codec implementation.
#[derive(Clone, Debug, Default)]
pub struct Crc32cCodec;

impl Crc32cCodec {
    /// Create a new `crc32c` codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ByteEncoder for Crc32cCodec {
    fn metadata(&self) -> Result<CodecMetadata, CodecError> {
        CodecMetadata::new(IDENTIFIER, &Crc32cCodecConfiguration {})
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
        match decoded_representation {
            BytesRepresentation::FixedSize(size) => {
                BytesRepresentation::FixedSize(size + CHECKSUM_SIZE as u64)
            }
            BytesRepresentation::BoundedSize(size) => {
                BytesRepresentation::BoundedSize(size + CHECKSUM_SIZE as u64)
            }
            BytesRepresentation::UnboundedSize => BytesRepresentation::UnboundedSize,
        }
    }

    fn encode(
        &self,
        decoded_value: Bytes,
        _chunk_representation: &ChunkRepresentation,
        _options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let checksum = crc32c::crc32c(&decoded_value).to_le_bytes();
        let mut encoded_value: Vec<u8> = Vec::with_capacity(decoded_value.len() + checksum.len());
        encoded_value.extend_from_slice(&decoded_value);
        encoded_value.extend_from_slice(&checksum);
        Ok(encoded_value.into())
    }

    fn decode(
        &self,
        encoded_value: Bytes,
        _chunk_representation: &ChunkRepresentation,
        options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        let Some(data_len) = encoded_value.len().checked_sub(CHECKSUM_SIZE) else {
            return Err(CodecError::Other(
                "crc32c decoder expects a 32 bit input".to_string(),
            ));
        };
        let data = encoded_value.slice(..data_len);
        if options.validate_checksums() {
            let checksum = crc32c::crc32c(&data).to_le_bytes();
            if checksum != encoded_value[data_len..] {
                return Err(CodecError::InvalidChecksum);
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataType;

    const ELEMENTS: [u8; 6] = [1, 2, 3, 4, 5, 6];

    fn representation() -> ChunkRepresentation {
        ChunkRepresentation::new(vec![6], DataType::UInt8)
    }

    #[test]
    fn codec_crc32c_round_trip() {
        let codec = Crc32cCodec::new();
        let options = CodecOptions::default();
        let encoded = codec
            .encode(Bytes::from_static(&ELEMENTS), &representation(), &options)
            .unwrap();
        assert_eq!(encoded.len(), ELEMENTS.len() + CHECKSUM_SIZE);
        assert_eq!(&encoded[6..], &crc32c::crc32c(&ELEMENTS).to_le_bytes());
        let decoded = codec.decode(encoded, &representation(), &options).unwrap();
        assert_eq!(decoded.as_ref(), &ELEMENTS);
        assert_eq!(
            codec.encoded_representation(&BytesRepresentation::FixedSize(6)),
            BytesRepresentation::FixedSize(10)
        );
    }

    #[test]
    fn codec_crc32c_invalid_checksum() {
        let codec = Crc32cCodec::new();
        let options = CodecOptions::default().with_validate_checksums(true);
        let encoded = codec
            .encode(Bytes::from_static(&ELEMENTS), &representation(), &options)
            .unwrap();
        let mut corrupted = encoded.to_vec();
        corrupted[0] ^= 0xff;
        assert!(matches!(
            codec.decode(corrupted.clone().into(), &representation(), &options),
            Err(CodecError::InvalidChecksum)
        ));
        let options = options.with_validate_checksums(false);
        assert!(codec
            .decode(corrupted.into(), &representation(), &options)
            .is_ok());
        assert!(codec
            .decode(Bytes::from_static(&[0; 3]), &representation(), &options)
            .is_err());
    }
}
