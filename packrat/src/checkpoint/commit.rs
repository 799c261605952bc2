//! Staging and publishing checkpoints.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use packrat_storage::{StorageError, StorePrefix, WritableStorage};

use super::{Manifest, COMMIT_MARKER_KEY, DATA_PREFIX, MANIFEST_KEY};

/// How a checkpoint is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// The checkpoint is written to a staging prefix next to its final prefix and renamed into place.
    ///
    /// Used if the store [supports renames](packrat_storage::WritableStorageTraits::supports_rename).
    Rename,
    /// The checkpoint is written directly to its final prefix and `commit_success.txt` is written last.
    ///
    /// Readers refuse a checkpoint without the marker.
    Marker,
}

/// The destination of a save.
pub(crate) struct CommitTarget {
    storage: WritableStorage,
    final_prefix: StorePrefix,
    write_prefix: StorePrefix,
    mode: CommitMode,
}

impl CommitTarget {
    /// Create the target for publishing to `final_prefix`.
    ///
    /// The commit mode is chosen from the capabilities of `storage`.
    pub(crate) fn new(
        storage: WritableStorage,
        final_prefix: StorePrefix,
    ) -> Result<Self, StorageError> {
        let (mode, write_prefix) = if storage.supports_rename() {
            (CommitMode::Rename, staging_prefix(&final_prefix)?)
        } else {
            (CommitMode::Marker, final_prefix.clone())
        };
        Ok(Self {
            storage,
            final_prefix,
            write_prefix,
            mode,
        })
    }

    pub(crate) const fn mode(&self) -> CommitMode {
        self.mode
    }

    pub(crate) fn final_prefix(&self) -> &StorePrefix {
        &self.final_prefix
    }

    /// The prefix the checkpoint is written to before it is published.
    pub(crate) fn write_prefix(&self) -> &StorePrefix {
        &self.write_prefix
    }

    /// The prefix holding backing data files.
    pub(crate) fn data_prefix(&self) -> Result<StorePrefix, StorageError> {
        Ok(self.write_prefix.child(DATA_PREFIX)?)
    }

    /// Write the manifest and publish the checkpoint.
    pub(crate) fn commit(&self, mut manifest: Manifest) -> Result<(), StorageError> {
        manifest.commit_marker = self.mode == CommitMode::Marker;
        let manifest_key = self.write_prefix.key(MANIFEST_KEY)?;
        let manifest_bytes = manifest
            .to_bytes()
            .map_err(|err| StorageError::Other(err.to_string()))?;
        self.storage.set(&manifest_key, Bytes::from(manifest_bytes))?;
        self.storage.sync(&manifest_key)?;

        match self.mode {
            CommitMode::Rename => {
                self.storage
                    .rename_prefix(&self.write_prefix, &self.final_prefix)?;
            }
            CommitMode::Marker => {
                let marker_key = self.final_prefix.key(COMMIT_MARKER_KEY)?;
                let marker = format!("Checkpoint commit was successful to {}", self.final_prefix);
                self.storage.set(&marker_key, Bytes::from(marker))?;
                self.storage.sync(&marker_key)?;
            }
        }
        log::info!("committed checkpoint {}", self.final_prefix);
        Ok(())
    }

    /// Erase everything written to the write prefix.
    ///
    /// Failures are logged, not returned.
    pub(crate) fn discard(&self) {
        if let Err(err) = self.storage.erase_prefix(&self.write_prefix) {
            log::warn!(
                "failed to discard incomplete checkpoint {}: {err}",
                self.write_prefix
            );
        } else {
            log::debug!("discarded incomplete checkpoint {}", self.write_prefix);
        }
    }
}

/// Return a unique staging prefix next to `final_prefix`.
fn staging_prefix(final_prefix: &StorePrefix) -> Result<StorePrefix, StorageError> {
    let final_key = final_prefix
        .as_key()
        .ok_or_else(|| StorageError::Other("cannot stage a checkpoint at the root".to_string()))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default();
    Ok(StorePrefix::new(format!(
        "{final_key}.packrat-tmp-{}-{nanos}/",
        std::process::id()
    ))?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use packrat_storage::{
        store::MemoryStore, ListableStorageTraits, OffsetBytesIterator, ReadableStorageTraits,
        StoreKey, WritableStorageTraits,
    };

    use super::*;

    #[test]
    fn commit_staging_prefix() {
        let prefix = staging_prefix(&StorePrefix::new("ckpt/10/").unwrap()).unwrap();
        assert!(prefix.as_str().starts_with("ckpt/10.packrat-tmp-"));
        assert!(prefix.as_str().ends_with('/'));
        assert!(staging_prefix(&StorePrefix::root()).is_err());
    }

    #[test]
    fn commit_rename() {
        let store = Arc::new(MemoryStore::new());
        let target = CommitTarget::new(store.clone(), StorePrefix::new("ckpt/").unwrap()).unwrap();
        assert_eq!(target.mode(), CommitMode::Rename);
        assert_ne!(target.write_prefix(), target.final_prefix());
        let data_key = target.data_prefix().unwrap().key("00000000.data").unwrap();
        store.set(&data_key, Bytes::from_static(b"abc")).unwrap();

        target.commit(Manifest::new(vec![], vec![], vec![])).unwrap();
        let keys = store.list().unwrap();
        assert_eq!(
            keys.iter().map(|key| key.as_str()).collect::<Vec<_>>(),
            vec!["ckpt/d/00000000.data", "ckpt/manifest.json"]
        );
    }

    #[test]
    fn commit_discard() {
        let store = Arc::new(MemoryStore::new());
        let target = CommitTarget::new(store.clone(), StorePrefix::new("ckpt/").unwrap()).unwrap();
        let data_key = target.data_prefix().unwrap().key("00000000.data").unwrap();
        store.set(&data_key, Bytes::from_static(b"abc")).unwrap();
        target.discard();
        assert!(store.list().unwrap().is_empty());
        assert!(store.get(&data_key).unwrap().is_none());
    }

    struct UnerasableStore;

    impl WritableStorageTraits for UnerasableStore {
        fn set(&self, _key: &StoreKey, _value: Bytes) -> Result<(), StorageError> {
            Ok(())
        }

        fn set_partial_many(
            &self,
            _key: &StoreKey,
            _offset_values: OffsetBytesIterator,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        fn erase(&self, _key: &StoreKey) -> Result<(), StorageError> {
            Err(StorageError::Other("read only media".to_string()))
        }

        fn erase_prefix(&self, _prefix: &StorePrefix) -> Result<(), StorageError> {
            Err(StorageError::Other("read only media".to_string()))
        }
    }

    #[test]
    fn commit_discard_failure_is_logged() {
        testing_logger::setup();
        let target =
            CommitTarget::new(Arc::new(UnerasableStore), StorePrefix::new("ckpt/").unwrap()).unwrap();
        assert_eq!(target.mode(), CommitMode::Marker);
        target.discard();
        testing_logger::validate(|captured_logs| {
            assert_eq!(captured_logs.len(), 1);
            assert_eq!(captured_logs[0].level, log::Level::Warn);
            assert_eq!(
                captured_logs[0].body,
                "failed to discard incomplete checkpoint ckpt/: read only media"
            );
        });
    }
}
