//! The `bytes` codec.
//!
//! Stores elements little endian or big endian in C order.
//! Elements of single byte data types are stored as is.
//!
//! ### Codec `configuration` Example - [`BytesCodecConfiguration`]:
//! ```rust
//! # let JSON = r#"
//! {
//!     "endian": "little"
//! }
//! # "#;
//! # use packrat::codec::bytes::BytesCodecConfiguration;
//! # serde_json::from_str::<BytesCodecConfiguration>(JSON).unwrap();
//! ```

use ::bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{
    ByteEncoder, BytesRepresentation, ChunkRepresentation, CodecError, CodecMetadata,
    CodecOptions, RecommendedConcurrency,
};
use crate::array::DataType;

/// The codec name.
pub const IDENTIFIER: &str = "bytes";

/// The endianness of each element in an array.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little endian.
    Little,
    /// Big endian.
    Big,
}

impl Endianness {
    /// Return true if the endianness matches the endianness of the CPU.
    #[must_use]
    pub fn is_native(self) -> bool {
        self == NATIVE_ENDIAN
    }
}

#[cfg(target_endian = "big")]
const NATIVE_ENDIAN: Endianness = Endianness::Big;
#[cfg(target_endian = "little")]
const NATIVE_ENDIAN: Endianness = Endianness::Little;

/// A `bytes` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct BytesCodecConfiguration {
    /// The target endianness. Required if the data type is larger than one byte.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endian: Option<Endianness>,
}

/// A `bytes` codec implementation.
#[derive(Debug, Clone)]
pub struct BytesCodec {
    endian: Option<Endianness>,
}

impl Default for BytesCodec {
    fn default() -> Self {
        Self::new(Some(NATIVE_ENDIAN))
    }
}

impl BytesCodec {
    /// Create a new `bytes` codec.
    ///
    /// `endian` is optional because an 8-bit type has no endianness.
    #[must_use]
    pub const fn new(endian: Option<Endianness>) -> Self {
        Self { endian }
    }

    /// Create a new `bytes` codec for little endian data.
    #[must_use]
    pub const fn little() -> Self {
        Self::new(Some(Endianness::Little))
    }

    /// Create a new `bytes` codec for big endian data.
    #[must_use]
    pub const fn big() -> Self {
        Self::new(Some(Endianness::Big))
    }

    /// Create a new `bytes` codec from configuration.
    #[must_use]
    pub const fn new_with_configuration(configuration: &BytesCodecConfiguration) -> Self {
        Self::new(configuration.endian)
    }

    fn swap_if_needed(
        &self,
        value: Bytes,
        data_type: DataType,
    ) -> Result<Bytes, CodecError> {
        let size = data_type.size();
        if size == 1 {
            return Ok(value);
        }
        match self.endian {
            None => Err(CodecError::Other(format!(
                "the bytes codec requires an endianness for data type {data_type}"
            ))),
            Some(endian) if endian.is_native() => Ok(value),
            Some(_) => {
                let mut value = value.to_vec();
                reverse_endianness(&mut value, size);
                Ok(Bytes::from(value))
            }
        }
    }
}

impl ByteEncoder for BytesCodec {
    fn metadata(&self) -> Result<CodecMetadata, CodecError> {
        CodecMetadata::new(
            IDENTIFIER,
            &BytesCodecConfiguration {
                endian: self.endian,
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
        *decoded_representation
    }

    fn encode(
        &self,
        decoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        _options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        self.swap_if_needed(decoded_value, chunk_representation.data_type())
    }

    fn decode(
        &self,
        encoded_value: Bytes,
        chunk_representation: &ChunkRepresentation,
        _options: &CodecOptions,
    ) -> Result<Bytes, CodecError> {
        self.swap_if_needed(encoded_value, chunk_representation.data_type())
    }
}

/// Reverse the endianness of elements of `size` bytes.
fn reverse_endianness(v: &mut [u8], size: usize) {
    for element in v.chunks_exact_mut(size) {
        element.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_bytes_configuration() {
        let configuration: BytesCodecConfiguration =
            serde_json::from_str(r#"{"endian":"big"}"#).unwrap();
        let codec = BytesCodec::new_with_configuration(&configuration);
        assert_eq!(
            serde_json::to_string(&codec.metadata().unwrap()).unwrap(),
            r#"{"name":"bytes","configuration":{"endian":"big"}}"#
        );
        let codec = BytesCodec::new(None);
        assert_eq!(
            serde_json::to_string(&codec.metadata().unwrap()).unwrap(),
            r#"{"name":"bytes"}"#
        );
        assert!(serde_json::from_str::<BytesCodecConfiguration>(r#"{"order":"C"}"#).is_err());
    }

    fn codec_bytes_round_trip_impl(endian: Option<Endianness>, data_type: DataType) {
        let representation = ChunkRepresentation::new(vec![2, 2], data_type);
        let decoded: Bytes = (0..representation.size())
            .map(|i| u8::try_from(i).unwrap())
            .collect::<Vec<u8>>()
            .into();
        let codec = BytesCodec::new(endian);
        let options = CodecOptions::default();
        let encoded = codec
            .encode(decoded.clone(), &representation, &options)
            .unwrap();
        if endian.is_some_and(|endian| !endian.is_native()) && data_type.size() > 1 {
            assert_ne!(encoded, decoded);
        }
        let round_trip = codec.decode(encoded, &representation, &options).unwrap();
        assert_eq!(round_trip, decoded);
    }

    #[test]
    fn codec_bytes_round_trip() {
        for data_type in [DataType::UInt8, DataType::Float16, DataType::Int32, DataType::Float64] {
            codec_bytes_round_trip_impl(Some(Endianness::Big), data_type);
            codec_bytes_round_trip_impl(Some(Endianness::Little), data_type);
        }
        codec_bytes_round_trip_impl(None, DataType::UInt8);
    }

    #[test]
    fn codec_bytes_big_endian_layout() {
        let representation = ChunkRepresentation::new(vec![2], DataType::UInt16);
        let decoded = Bytes::from([1u16, 2].into_iter().flat_map(u16::to_ne_bytes).collect::<Vec<u8>>());
        let encoded = BytesCodec::big()
            .encode(decoded, &representation, &CodecOptions::default())
            .unwrap();
        assert_eq!(encoded.as_ref(), &[0, 1, 0, 2]);
    }

    #[test]
    fn codec_bytes_missing_endian() {
        let representation = ChunkRepresentation::new(vec![1], DataType::UInt16);
        assert!(BytesCodec::new(None)
            .encode(Bytes::from_static(&[0, 1]), &representation, &CodecOptions::default())
            .is_err());
    }
}
