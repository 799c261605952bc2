//! A filesystem store for the [`packrat`](https://docs.rs/packrat/latest/packrat/index.html) checkpoint engine.
//!
//! Keys map to files beneath a base directory and prefixes map to directories.
//! A checkpoint data file is created with [`set`](WritableStorageTraits::set), grown with offset writes and sealed with [`sync`](WritableStorageTraits::sync).
//! Prefix renames are a single directory `rename(2)`, so a staged checkpoint directory becomes visible under its final name atomically.
//!
//! Listings are sorted by key.
//!
//! ## Licence
//! `packrat_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use packrat_storage::{
    byte_range::{ByteRange, ByteRangeIterator, InvalidByteRangeError},
    Bytes, ListableStorageTraits, MaybeBytesIterator, OffsetBytesIterator, ReadableStorageTraits,
    StorageError, StoreKey, StoreKeyError, StoreKeys, StoreKeysPrefixes, StorePrefix,
    StorePrefixes, WritableStorageTraits,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

/// Options for a [`FilesystemStore`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct FilesystemStoreOptions {
    sync: bool,
}

impl Default for FilesystemStoreOptions {
    fn default() -> Self {
        Self { sync: true }
    }
}

impl FilesystemStoreOptions {
    /// Returns true if [`sync`](WritableStorageTraits::sync) and renames flush to the device.
    #[must_use]
    pub const fn sync(&self) -> bool {
        self.sync
    }

    /// Set whether [`sync`](WritableStorageTraits::sync) and renames flush to the device with `fsync`.
    ///
    /// Enabled by default.
    /// Without it a checkpoint can be lost or torn if the machine crashes shortly after a save.
    pub fn set_sync(&mut self, sync: bool) -> &mut Self {
        self.sync = sync;
        self
    }

    /// Set whether [`sync`](WritableStorageTraits::sync) and renames flush to the device with `fsync`.
    #[must_use]
    pub const fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// A synchronous filesystem store.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    options: FilesystemStoreOptions,
    /// Per-key locks, serialising writers of a file against its readers.
    locks: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new filesystem store rooted at `base_path`.
    ///
    /// The directory is created on the first write if it does not exist.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path` is not valid UTF-8 or is an existing file.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        Self::new_with_options(base_path, FilesystemStoreOptions::default())
    }

    /// Create a new filesystem store rooted at `base_path` with non-default `options`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path` is not valid UTF-8 or is an existing file.
    pub fn new_with_options<P: AsRef<Path>>(
        base_path: P,
        options: FilesystemStoreOptions,
    ) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        let readonly = match std::fs::metadata(&base_path) {
            Ok(metadata) if metadata.is_dir() => metadata.permissions().readonly(),
            Ok(_) => return Err(FilesystemStoreCreateError::InvalidBasePath(base_path)),
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            base_path,
            readonly,
            options,
            locks: Mutex::default(),
        })
    }

    /// Return the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Return the filesystem path of `key`.
    #[must_use]
    pub fn key_path(&self, key: &StoreKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Return the filesystem path of `prefix`.
    #[must_use]
    pub fn prefix_path(&self, prefix: &StorePrefix) -> PathBuf {
        self.base_path.join(prefix.as_str())
    }

    fn path_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let relative = pathdiff::diff_paths(path, &self.base_path)
            .ok_or_else(|| StoreKeyError::from(path.to_string_lossy().to_string()))?;
        let relative = relative.to_string_lossy();
        if cfg!(windows) {
            StoreKey::new(relative.replace('\\', "/"))
        } else {
            StoreKey::new(relative)
        }
    }

    fn lock(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        self.locks.lock().entry(key.clone()).or_default().clone()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.readonly {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Write `values` at their offsets into the file of `key`, creating it and its parents if needed.
    fn write_at(
        &self,
        key: &StoreKey,
        values: impl IntoIterator<Item = (u64, Bytes)>,
        truncate: bool,
    ) -> Result<(), StorageError> {
        let lock = self.lock(key);
        let _guard = lock.write();
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)?;
        for (offset, value) in values {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&value)?;
        }
        Ok(())
    }

    /// Flush the entries of the directory at `path` to the device.
    fn sync_dir(&self, path: &Path) -> Result<(), StorageError> {
        if self.options.sync && cfg!(unix) {
            File::open(path)?.sync_all()?;
        }
        Ok(())
    }

    /// Every file beneath `path` as a key, in sorted order.
    fn walk(&self, path: &Path) -> StoreKeys {
        let mut keys: StoreKeys = WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.path_key(entry.path()).ok())
            .collect();
        keys.sort();
        keys
    }
}

fn read_range(file: &mut File, byte_range: ByteRange, size: u64) -> Result<Bytes, StorageError> {
    if !byte_range.is_valid(size) {
        return Err(InvalidByteRangeError::new(byte_range, size).into());
    }
    let length = usize::try_from(byte_range.length(size))
        .map_err(|_| StorageError::Other(format!("byte range {byte_range} is too large")))?;
    file.seek(SeekFrom::Start(byte_range.start(size)))?;
    let mut buffer = vec![0; length];
    file.read_exact(&mut buffer)?;
    Ok(Bytes::from(buffer))
}

impl ReadableStorageTraits for FilesystemStore {
    fn get_partial_many<'a>(
        &'a self,
        key: &StoreKey,
        byte_ranges: ByteRangeIterator<'a>,
    ) -> Result<MaybeBytesIterator<'a>, StorageError> {
        let lock = self.lock(key);
        let _guard = lock.read();
        let mut file = match File::open(self.key_path(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let size = file.metadata()?.len();
        let values = byte_ranges
            .map(|byte_range| read_range(&mut file, byte_range, size))
            .collect::<Vec<_>>();
        Ok(Some(Box::new(values.into_iter())))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        match std::fs::metadata(self.key_path(key)) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.check_writable()?;
        self.write_at(key, [(0, value)], true)
    }

    fn set_partial_many(
        &self,
        key: &StoreKey,
        offset_values: OffsetBytesIterator,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.write_at(key, offset_values, false)
    }

    fn sync(&self, key: &StoreKey) -> Result<(), StorageError> {
        if !self.options.sync {
            return Ok(());
        }
        let lock = self.lock(key);
        let _guard = lock.write();
        let path = self.key_path(key);
        File::open(&path)?.sync_all()?;
        match path.parent() {
            Some(parent) => self.sync_dir(parent),
            None => Ok(()),
        }
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.check_writable()?;
        let lock = self.lock(key);
        let _guard = lock.write();
        match std::fs::remove_file(self.key_path(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut locks = self.locks.lock();
        match std::fs::remove_dir_all(self.prefix_path(prefix)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => {
                locks.retain(|key, _| !key.has_prefix(prefix));
                Ok(())
            }
        }
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StorageError> {
        self.check_writable()?;
        if from.is_root() || to.is_root() {
            return Err(StorageError::Unsupported(
                "the root prefix cannot be renamed".to_string(),
            ));
        }
        // no file may be opened while its directory moves
        let mut locks = self.locks.lock();
        let from_path = self.prefix_path(from);
        let to_path = self.prefix_path(to);
        if to_path.exists() {
            return Err(StorageError::RenameDestinationExists(to.clone()));
        }
        let to_parent = to_path.parent().map(Path::to_path_buf);
        if let Some(parent) = &to_parent {
            std::fs::create_dir_all(parent)?;
        }
        log::debug!("renaming {} to {}", from_path.display(), to_path.display());
        std::fs::rename(&from_path, &to_path)?;
        locks.retain(|key, _| !key.has_prefix(from));

        if let Some(parent) = &to_parent {
            self.sync_dir(parent)?;
        }
        match from_path.parent() {
            Some(parent) if Some(parent) != to_parent.as_deref() => self.sync_dir(parent),
            _ => Ok(()),
        }
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        Ok(self.walk(&self.base_path))
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self.walk(&self.prefix_path(prefix)))
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreKeysPrefixes, StorageError> {
        let mut keys: StoreKeys = vec![];
        let mut prefixes: StorePrefixes = vec![];
        let entries = match std::fs::read_dir(self.prefix_path(prefix)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(StoreKeysPrefixes::new(keys, prefixes))
            }
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.file_type()?.is_dir() {
                prefixes.push(prefix.child(&name)?);
            } else {
                keys.push(prefix.key(&name)?);
            }
        }
        keys.sort();
        prefixes.sort();
        Ok(StoreKeysPrefixes::new(keys, prefixes))
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        self.list_prefix(prefix)?.iter().try_fold(0, |size, key| {
            Ok(size + self.size_key(key)?.unwrap_or_default())
        })
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The base path is not valid UTF-8 or is not a directory.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}
