use std::sync::Arc;

use packrat_storage::{ReadableWritableListableStorageTraits, StorePrefix};
use parking_lot::Mutex;

use super::{open, save, CommitSummary, ReadError, SaveError, SaveHandle, SaveOptions};
use crate::array::ArrayTree;

/// A checkpointer that saves in the background, one save at a time.
///
/// A new save waits for the previous save of the same checkpointer to finish before it starts.
/// Dropping the checkpointer detaches a pending save, call [`wait_until_finished`](Checkpointer::wait_until_finished) first to observe its outcome.
///
/// ```rust
/// # use std::sync::Arc;
/// # use packrat::{array::{Array, ArrayTree}, checkpoint::SaveOptions, storage::store::MemoryStore, Checkpointer};
/// let checkpointer = Checkpointer::new(Arc::new(MemoryStore::new()));
/// for step in 0..3u64 {
///     let tree = ArrayTree::new().with_array("step", Array::from_elements(vec![], &[step])?)?;
///     checkpointer.save(&format!("ckpt/{step}"), tree, &SaveOptions::default())?;
/// }
/// checkpointer.wait_until_finished()?;
/// let tree = checkpointer.restore("ckpt/2")?;
/// assert_eq!(tree["step"].to_elements::<u64>()?, vec![2]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Checkpointer<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    pending: Mutex<Option<SaveHandle>>,
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits + 'static> Checkpointer<TStorage> {
    /// Create a new checkpointer over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            pending: Mutex::new(None),
        }
    }

    /// Return the storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<TStorage> {
        &self.storage
    }

    /// Start saving `tree` to `path` in the background.
    ///
    /// Waits for the previous save to finish first.
    ///
    /// # Errors
    /// Returns the [`SaveError`] of the previous save if it failed, in which case `tree` is not saved.
    /// Returns [`SaveError::ConfigurationError`] if `path` already holds a checkpoint or the save is misconfigured.
    pub fn save(&self, path: &str, tree: ArrayTree, options: &SaveOptions) -> Result<(), SaveError> {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.wait_until_finished()?;
        }
        *pending = Some(save(self.storage.clone(), path, tree, options)?);
        Ok(())
    }

    /// Block until the pending save has finished.
    ///
    /// Returns [`None`] if there was no pending save.
    ///
    /// # Errors
    /// Returns a [`SaveError`] if the pending save failed.
    pub fn wait_until_finished(&self) -> Result<Option<CommitSummary>, SaveError> {
        self.pending
            .lock()
            .take()
            .map(SaveHandle::wait_until_finished)
            .transpose()
    }

    /// Returns true if there is no save running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_none_or(SaveHandle::is_finished)
    }

    /// Returns true if a committed checkpoint or a save in progress occupies `path`.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if `path` is invalid or the storage cannot be listed.
    pub fn exists(&self, path: &str) -> Result<bool, ReadError> {
        let prefix: StorePrefix =
            super::checkpoint_prefix(path).map_err(|_| ReadError::InvalidPath(path.to_string()))?;
        Ok(!self.storage.list_prefix(&prefix)?.is_empty())
    }

    /// Read every array of the checkpoint at `path`.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the checkpoint is incomplete, invalid, or cannot be read.
    pub fn restore(&self, path: &str) -> Result<ArrayTree, ReadError> {
        open(&*self.storage, path)
    }
}

#[cfg(test)]
mod tests {
    use packrat_storage::store::MemoryStore;

    use super::*;
    use crate::array::Array;

    fn tree(value: f64) -> ArrayTree {
        ArrayTree::new()
            .with_array("w", Array::from_vec(vec![16, 4], vec![value; 64]).unwrap())
            .unwrap()
    }

    #[test]
    fn checkpointer_save_restore() {
        let checkpointer = Checkpointer::new(Arc::new(MemoryStore::new()));
        assert!(checkpointer.is_finished());
        assert!(checkpointer.wait_until_finished().unwrap().is_none());

        let options = SaveOptions::default().with_target_data_file_size(Some(128));
        checkpointer.save("ckpt/1", tree(1.0), &options).unwrap();
        checkpointer.save("ckpt/2", tree(2.0), &options).unwrap();
        let summary = checkpointer.wait_until_finished().unwrap().unwrap();
        assert_eq!(summary.prefix().as_str(), "ckpt/2/");
        assert!(checkpointer.is_finished());

        assert!(checkpointer.exists("ckpt/1").unwrap());
        assert!(!checkpointer.exists("ckpt/3").unwrap());
        assert_eq!(checkpointer.restore("ckpt/1").unwrap(), tree(1.0));
        assert_eq!(checkpointer.restore("ckpt/2").unwrap(), tree(2.0));
    }

    #[test]
    fn checkpointer_existing_destination() {
        let checkpointer = Checkpointer::new(Arc::new(MemoryStore::new()));
        checkpointer
            .save("ckpt/1", tree(1.0), &SaveOptions::default())
            .unwrap();
        checkpointer.wait_until_finished().unwrap();
        assert!(matches!(
            checkpointer.save("ckpt/1", tree(3.0), &SaveOptions::default()),
            Err(SaveError::ConfigurationError(_))
        ));
        assert_eq!(checkpointer.restore("ckpt/1").unwrap(), tree(1.0));
    }
}
