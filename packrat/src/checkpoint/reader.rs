//! Reading checkpoints.

use std::num::NonZeroU64;

use bytes::Bytes;
use packrat_chunk_grid::RegularChunkGrid;
use packrat_storage::{
    byte_range::ByteRange, ReadableStorageTraits, StorageError, StorePrefix,
};
use rayon::prelude::*;

use super::{
    checkpoint_prefix, ArrayRecord, DataFile, Manifest, ManifestEntry, ReadError,
    COMMIT_MARKER_KEY, DATA_PREFIX, MANIFEST_KEY,
};
use crate::{
    array::{bytes_len, update_subset_bytes, Array, ArrayTree},
    codec::{ChunkRepresentation, CodecChain, CodecError, CodecOptions},
    concurrency::concurrency_chunks_and_codec,
};

/// Read and validate the manifest of the checkpoint at `path`.
///
/// # Errors
/// Returns a [`ReadError`] if the manifest is missing or invalid, or the checkpoint was not committed.
pub fn read_manifest<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
) -> Result<Manifest, ReadError> {
    let prefix = checkpoint_prefix(path).map_err(|_| ReadError::InvalidPath(path.to_string()))?;
    let manifest_key = prefix.key(MANIFEST_KEY).map_err(StorageError::from)?;
    let manifest = storage
        .get(&manifest_key)?
        .ok_or_else(|| ReadError::MissingManifest(prefix.clone()))?;
    let manifest = Manifest::from_bytes(&manifest)?;
    if manifest.commit_marker {
        let marker_key = prefix.key(COMMIT_MARKER_KEY).map_err(StorageError::from)?;
        if storage.size_key(&marker_key)?.is_none() {
            return Err(ReadError::MissingCommitMarker(prefix));
        }
    }
    Ok(manifest)
}

/// Open the checkpoint at `path` and read every array.
///
/// Checksums are validated according to the [global configuration](crate::config::Config#validate-checksums).
///
/// # Errors
/// Returns a [`ReadError`] if the checkpoint is incomplete, invalid, or a chunk cannot be read or decoded.
pub fn open<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
) -> Result<ArrayTree, ReadError> {
    open_with_options(storage, path, &CodecOptions::default())
}

/// Open the checkpoint at `path` and read every array with explicit codec options.
///
/// # Errors
/// Returns a [`ReadError`] if the checkpoint is incomplete, invalid, or a chunk cannot be read or decoded.
pub fn open_with_options<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
    options: &CodecOptions,
) -> Result<ArrayTree, ReadError> {
    let manifest = read_manifest(storage, path)?;
    let data_prefix = data_prefix(path)?;
    let mut tree = ArrayTree::new();
    for record in &manifest.arrays {
        let array = read_array(storage, &data_prefix, &manifest, record, options)?;
        tree.insert(record.name.clone(), array)
            .map_err(|err| ReadError::InvalidManifest(err.to_string()))?;
    }
    Ok(tree)
}

/// Open the checkpoint at `path` and read the array at tree path `name`.
///
/// # Errors
/// Returns [`ReadError::ArrayNotFound`] if the checkpoint has no array `name`, or any other [`ReadError`] like [`open`].
pub fn open_array<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
    name: &str,
) -> Result<Array, ReadError> {
    let manifest = read_manifest(storage, path)?;
    let record = manifest
        .array(name)
        .ok_or_else(|| ReadError::ArrayNotFound(name.to_string()))?;
    read_array(
        storage,
        &data_prefix(path)?,
        &manifest,
        record,
        &CodecOptions::default(),
    )
}

fn data_prefix(path: &str) -> Result<StorePrefix, ReadError> {
    checkpoint_prefix(path)
        .and_then(|prefix| prefix.child(DATA_PREFIX))
        .map_err(|_| ReadError::InvalidPath(path.to_string()))
}

fn read_array<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    data_prefix: &StorePrefix,
    manifest: &Manifest,
    record: &ArrayRecord,
    options: &CodecOptions,
) -> Result<Array, ReadError> {
    let invalid = |message: String| ReadError::InvalidManifest(message);
    let codecs = CodecChain::from_metadata(&record.codecs).map_err(|source| {
        ReadError::InvalidCodecs {
            array: record.name.clone(),
            source,
        }
    })?;
    let chunk_shape = record
        .chunk_shape
        .iter()
        .map(|&extent| NonZeroU64::new(extent))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid(format!("array {} has a zero chunk extent", record.name)))?;
    let chunk_grid = RegularChunkGrid::new(record.shape.clone(), chunk_shape)
        .map_err(|err| invalid(err.to_string()))?;
    if chunk_grid.num_chunks() != record.num_chunks {
        return Err(invalid(format!(
            "array {} has {} chunks, expected {}",
            record.name,
            record.num_chunks,
            chunk_grid.num_chunks()
        )));
    }

    let element_size = record.data_type.size();
    let mut bytes = vec![
        0u8;
        bytes_len(&record.shape, element_size)
            .map_err(|err| invalid(err.to_string()))?
    ];
    let entries: Vec<&ManifestEntry> = manifest.entries_for(&record.name).collect();
    let chunk_representation = ChunkRepresentation::new(
        chunk_grid.chunk_shape_u64(),
        record.data_type,
    );
    let (chunk_concurrent_limit, codec_options) = concurrency_chunks_and_codec(
        options.concurrent_target(),
        entries.len(),
        options,
        &codecs.recommended_concurrency(&chunk_representation),
    );

    let decode_chunk = |entry: &ManifestEntry| {
        let subset = chunk_grid
            .subset(entry.chunk_key.chunk_indices())
            .ok_or_else(|| invalid(format!("chunk {} is out of bounds", entry.chunk_key)))?;
        let encoded = read_chunk(storage, data_prefix, entry)?;
        let chunk_representation =
            ChunkRepresentation::new(subset.shape().to_vec(), record.data_type);
        let decoded = codecs
            .decode(encoded, &chunk_representation, &codec_options)
            .map_err(|source| match source {
                CodecError::UnexpectedChunkDecodedSize { len, expected_len } => {
                    ReadError::SizeMismatch {
                        chunk_key: entry.chunk_key.clone(),
                        len,
                        expected_len,
                    }
                }
                source => ReadError::DecodeError {
                    chunk_key: entry.chunk_key.clone(),
                    source,
                },
            })?;
        Ok::<_, ReadError>((subset, decoded))
    };
    let decoded_chunks = crate::iter_concurrent_limit!(
        chunk_concurrent_limit,
        entries,
        map,
        decode_chunk
    )
    .collect::<Result<Vec<_>, _>>()?;

    for (subset, decoded) in decoded_chunks {
        update_subset_bytes(&mut bytes, &record.shape, element_size, &subset, &decoded)
            .map_err(|err| invalid(err.to_string()))?;
    }
    Array::new(record.data_type, record.shape.clone(), bytes)
        .map_err(|err| invalid(err.to_string()))
}

fn read_chunk<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    data_prefix: &StorePrefix,
    entry: &ManifestEntry,
) -> Result<Bytes, ReadError> {
    if entry.length == 0 {
        return Ok(Bytes::new());
    }
    let missing = || ReadError::MissingChunkBytes {
        chunk_key: entry.chunk_key.clone(),
        file: DataFile::name(entry.file),
    };
    let file_key = data_prefix
        .key(&DataFile::name(entry.file))
        .map_err(StorageError::from)?;
    let bytes = match storage.get_byte_range(
        &file_key,
        ByteRange::FromStart(entry.offset, Some(entry.length)),
    ) {
        Ok(Some(bytes)) => bytes,
        Ok(None) | Err(StorageError::InvalidByteRangeError(_)) => return Err(missing()),
        Err(err) => return Err(err.into()),
    };
    if bytes.len() as u64 == entry.length {
        Ok(bytes)
    } else {
        Err(missing())
    }
}
