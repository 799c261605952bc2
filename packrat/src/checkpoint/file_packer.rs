//! The backing data file packer.

use bytes::Bytes;
use packrat_storage::{StorageError, StoreKey, StorePrefix, WritableStorage};

use super::{ChunkKey, DataFile, ManifestEntry};

#[derive(Debug)]
struct OpenFile {
    id: u64,
    key: StoreKey,
    size: u64,
}

/// Packs encoded chunks into size bounded backing data files.
///
/// The packer is the only writer of backing data files in a save.
/// Chunks must be assigned in canonical [`ChunkKey`] order and are never split across files.
/// A file is sealed before a chunk is assigned if the file is non-empty and the chunk would take it past the target size,
/// so a file only exceeds the target size if it holds a single chunk larger than the target.
///
/// Files are named `<seq:08>.data` under the data prefix, with sequence numbers from 0 in creation order.
/// A file has no header, its size is the sum of the lengths of its chunks.
pub struct FilePacker {
    storage: WritableStorage,
    prefix: StorePrefix,
    target_size: Option<u64>,
    next_id: u64,
    open_file: Option<OpenFile>,
    sealed: Vec<DataFile>,
}

impl FilePacker {
    /// Create a new file packer writing to `prefix` of `storage`.
    ///
    /// With no `target_size`, every chunk is packed into a single file.
    #[must_use]
    pub fn new(storage: WritableStorage, prefix: StorePrefix, target_size: Option<u64>) -> Self {
        Self {
            storage,
            prefix,
            target_size,
            next_id: 0,
            open_file: None,
            sealed: Vec::new(),
        }
    }

    /// Return the sealed files.
    #[must_use]
    pub fn sealed_files(&self) -> &[DataFile] {
        &self.sealed
    }

    /// Append `chunk_bytes` to a backing data file and return its location.
    ///
    /// Zero-length chunks are recorded at the end of the current file and never open a file.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if a file cannot be written or sealed.
    pub fn assign(
        &mut self,
        chunk_key: ChunkKey,
        chunk_bytes: Bytes,
    ) -> Result<ManifestEntry, StorageError> {
        let length = chunk_bytes.len() as u64;
        if length == 0 {
            let (file, offset) = match (&self.open_file, self.sealed.last()) {
                (Some(open_file), _) => (open_file.id, open_file.size),
                (None, Some(sealed)) => (sealed.id, sealed.size),
                (None, None) => (self.next_id, 0),
            };
            return Ok(ManifestEntry {
                chunk_key,
                file,
                offset,
                length,
            });
        }

        if let (Some(open_file), Some(target_size)) = (&self.open_file, self.target_size) {
            if open_file.size > 0 && open_file.size.saturating_add(length) > target_size {
                self.seal()?;
            }
        }

        let (file, offset) = if let Some(open_file) = &mut self.open_file {
            self.storage.set_partial_many(
                &open_file.key,
                Box::new(std::iter::once((open_file.size, chunk_bytes))),
            )?;
            let offset = open_file.size;
            open_file.size += length;
            (open_file.id, offset)
        } else {
            let id = self.next_id;
            let key = self.prefix.key(&DataFile::name(id))?;
            self.storage.set(&key, chunk_bytes)?;
            self.next_id += 1;
            self.open_file = Some(OpenFile {
                id,
                key,
                size: length,
            });
            (id, 0)
        };
        Ok(ManifestEntry {
            chunk_key,
            file,
            offset,
            length,
        })
    }

    /// Seal the open file and return every sealed file in creation order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the open file cannot be sealed.
    pub fn finish(mut self) -> Result<Vec<DataFile>, StorageError> {
        self.seal()?;
        Ok(self.sealed)
    }

    fn seal(&mut self) -> Result<(), StorageError> {
        if let Some(open_file) = self.open_file.take() {
            self.storage.sync(&open_file.key)?;
            log::debug!(
                "sealed data file {} with {} bytes",
                open_file.key,
                open_file.size
            );
            self.sealed.push(DataFile {
                id: open_file.id,
                size: open_file.size,
            });
        }
        Ok(())
    }
}
