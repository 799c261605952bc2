//! Saving and reading checkpoints.
//!
//! A save runs in four stages:
//!  1. [`save`] validates the options and destination, and plans the chunks of every array with [`plan_chunk_shape`].
//!     Configuration errors are returned immediately and nothing is written.
//!  2. A background thread runs the [`WriteCoordinator`], which encodes chunks concurrently and hands them to a [`FilePacker`] in canonical [`ChunkKey`] order.
//!  3. The [`Manifest`] is written once every chunk is in a sealed backing data file.
//!  4. The checkpoint is published according to its [`CommitMode`].
//!
//! The outcome is observed through [`SaveHandle::wait_until_finished`].
//! If any stage fails, everything written by the save is discarded.
//!
//! Checkpoints are read with [`open`] or [`open_array`].

mod checkpointer;
mod chunk_key;
pub mod commit;
pub mod coordinator;
pub mod file_packer;
pub mod manifest;
pub mod plan;
mod reader;
mod save_options;

use std::sync::Arc;

use packrat_storage::{
    ReadableWritableListableStorageTraits, StorageError, StoreKey, StorePrefix, StorePrefixError,
};
use thiserror::Error;

pub use checkpointer::Checkpointer;
pub use chunk_key::ChunkKey;
pub use commit::CommitMode;
pub use coordinator::{CommitSummary, SaveHandle, WriteCoordinator};
pub use file_packer::FilePacker;
pub use manifest::{
    ArrayRecord, DataFile, Manifest, ManifestEntry, COMMIT_MARKER_KEY, DATA_PREFIX,
    FORMAT_VERSION, MANIFEST_KEY,
};
pub use plan::{plan_chunk_shape, ChunkPlan};
pub use reader::{open, open_array, open_with_options, read_manifest};
pub use save_options::{SaveArgs, SaveOptions};

use crate::{array::ArrayTree, codec::CodecError};
use commit::CommitTarget;

/// A save error.
#[derive(Clone, Debug, Error)]
pub enum SaveError {
    /// The save is misconfigured. Nothing was written.
    #[error("invalid save configuration: {0}")]
    ConfigurationError(String),
    /// A chunk could not be encoded.
    #[error("failed to encode chunk {chunk_key}: {source}")]
    EncodeError {
        /// The key of the chunk.
        chunk_key: ChunkKey,
        /// The codec error.
        #[source]
        source: CodecError,
    },
    /// A backing data file could not be written or sealed.
    #[error("failed to write a backing data file: {0}")]
    WriteError(#[source] StorageError),
    /// The manifest could not be written or the checkpoint could not be published.
    #[error("failed to commit the checkpoint: {0}")]
    CommitError(#[source] StorageError),
}

/// A checkpoint read error.
#[derive(Clone, Debug, Error)]
pub enum ReadError {
    /// An underlying storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// The checkpoint path is not valid.
    #[error("invalid checkpoint path {0:?}")]
    InvalidPath(String),
    /// There is no manifest, the checkpoint does not exist or was never published.
    #[error("no checkpoint manifest found at {0}")]
    MissingManifest(StorePrefix),
    /// The manifest could not be parsed or is inconsistent.
    #[error("invalid checkpoint manifest: {0}")]
    InvalidManifest(String),
    /// The checkpoint requires a commit marker which does not exist.
    #[error("checkpoint {0} has no commit marker")]
    MissingCommitMarker(StorePrefix),
    /// The checkpoint has no array with the requested name.
    #[error("checkpoint has no array {0}")]
    ArrayNotFound(String),
    /// The codec chain of an array cannot be created.
    #[error("array {array} has invalid codecs: {source}")]
    InvalidCodecs {
        /// The tree path of the array.
        array: String,
        /// The codec error.
        #[source]
        source: CodecError,
    },
    /// The bytes of a chunk are missing from its backing data file.
    #[error("chunk {chunk_key} is missing from data file {file}")]
    MissingChunkBytes {
        /// The key of the chunk.
        chunk_key: ChunkKey,
        /// The name of the data file.
        file: String,
    },
    /// A chunk could not be decoded.
    #[error("failed to decode chunk {chunk_key}: {source}")]
    DecodeError {
        /// The key of the chunk.
        chunk_key: ChunkKey,
        /// The codec error.
        #[source]
        source: CodecError,
    },
    /// A chunk decoded to an unexpected number of bytes.
    #[error("chunk {chunk_key} decoded to {len} bytes, expected {expected_len}")]
    SizeMismatch {
        /// The key of the chunk.
        chunk_key: ChunkKey,
        /// The decoded length.
        len: u64,
        /// The expected length.
        expected_len: u64,
    },
}

/// Return the store prefix of the checkpoint at `path`.
fn checkpoint_prefix(path: &str) -> Result<StorePrefix, StorePrefixError> {
    if StoreKey::validate(path) {
        StorePrefix::new(format!("{path}/"))
    } else {
        Err(StorePrefixError::from(path))
    }
}

/// Start saving `tree` to the checkpoint at `path` of `storage`.
///
/// The chunks are written and the checkpoint is committed in the background.
/// Use [`SaveHandle::wait_until_finished`] to wait for the outcome.
///
/// # Errors
/// Returns [`SaveError::ConfigurationError`] without writing anything if
///  - the target data file size or concurrent target is zero,
///  - the chunk byte size of an array is zero,
///  - `path` is not a valid store key, or
///  - `path` already holds values.
///
/// Returns [`SaveError::WriteError`] if the destination cannot be checked or the background thread cannot be started.
pub fn save<TStorage: ?Sized + ReadableWritableListableStorageTraits + 'static>(
    storage: Arc<TStorage>,
    path: &str,
    tree: ArrayTree,
    options: &SaveOptions,
) -> Result<SaveHandle, SaveError> {
    if options.target_data_file_size() == Some(0) {
        return Err(SaveError::ConfigurationError(
            "the target data file size must be greater than zero".to_string(),
        ));
    }
    if options.concurrent_target() == 0 {
        return Err(SaveError::ConfigurationError(
            "the concurrent target must be greater than zero".to_string(),
        ));
    }
    let prefix = checkpoint_prefix(path)
        .map_err(|_| SaveError::ConfigurationError(format!("invalid checkpoint path {path:?}")))?;
    if !storage
        .list_prefix(&prefix)
        .map_err(SaveError::WriteError)?
        .is_empty()
    {
        return Err(SaveError::ConfigurationError(format!(
            "checkpoint destination {prefix} already exists"
        )));
    }

    let storage = storage.writable();
    let mut coordinator = WriteCoordinator::new(storage.clone(), options.clone());
    for (name, array) in tree {
        let save_args = options.save_args(&name);
        coordinator.submit(&name, array, save_args)?;
    }
    let target = CommitTarget::new(storage, prefix)
        .map_err(|err| SaveError::ConfigurationError(err.to_string()))?;
    coordinator.start(target)
}
