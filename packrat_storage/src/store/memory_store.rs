//! A synchronous in-memory store.

use std::collections::{BTreeMap, BTreeSet};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::byte_range::{ByteOffset, ByteRangeIterator, InvalidByteRangeError};
use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, MaybeBytesIterator, OffsetBytesIterator,
    ReadableStorageTraits, StorageError, StoreKey, StoreKeys, StoreKeysPrefixes, StorePrefix,
    WritableStorageTraits,
};

/// A synchronous in-memory store.
///
/// Prefix renames are atomic: they happen under the same lock as every other operation.
#[derive(Debug)]
pub struct MemoryStore {
    data_map: Mutex<BTreeMap<StoreKey, BytesMut>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_map: Mutex::default(),
        }
    }

    /// Write `values` at their offsets into the value of `key` under a single lock.
    fn write_at(
        &self,
        key: &StoreKey,
        values: impl IntoIterator<Item = (ByteOffset, Bytes)>,
        truncate: bool,
    ) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        let data = data_map.entry(key.clone()).or_default();
        if truncate {
            data.clear();
        }
        for (offset, value) in values {
            let start = usize::try_from(offset)
                .map_err(|_| StorageError::Other(format!("offset {offset} is too large")))?;
            let end = start + value.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(&value);
        }
        Ok(())
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.get(key).map(|data| data.clone().freeze()))
    }

    fn get_partial_many<'a>(
        &'a self,
        key: &StoreKey,
        byte_ranges: ByteRangeIterator<'a>,
    ) -> Result<MaybeBytesIterator<'a>, StorageError> {
        let data_map = self.data_map.lock();
        let Some(data) = data_map.get(key) else {
            return Ok(None);
        };
        let data = data.clone().freeze();
        let size = data.len() as u64;
        let out = Box::new(byte_ranges.map(move |byte_range| {
            if byte_range.is_valid(size) {
                let start = usize::try_from(byte_range.start(size)).unwrap_or(usize::MAX);
                let end = usize::try_from(byte_range.end(size)).unwrap_or(usize::MAX);
                Ok(data.slice(start..end))
            } else {
                Err(InvalidByteRangeError::new(byte_range, size).into())
            }
        }));
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.get(key).map(|entry| entry.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.write_at(key, [(0, value)], true)
    }

    fn set_partial_many(
        &self,
        key: &StoreKey,
        offset_values: OffsetBytesIterator,
    ) -> Result<(), StorageError> {
        self.write_at(key, offset_values, false)
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        data_map.remove(key);
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        data_map.retain(|key, _| !key.has_prefix(prefix));
        Ok(())
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StorageError> {
        let mut data_map = self.data_map.lock();
        if data_map.keys().any(|key| key.has_prefix(to)) {
            return Err(StorageError::RenameDestinationExists(to.clone()));
        }
        let keys: Vec<StoreKey> = data_map
            .keys()
            .filter(|key| key.has_prefix(from))
            .cloned()
            .collect();
        for key in keys {
            if let (Some(value), Some(new_key)) =
                (data_map.remove(&key), key.replace_prefix(from, to))
            {
                data_map.insert(new_key, value);
            }
        }
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map.keys().cloned().collect())
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map
            .keys()
            .filter(|&key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreKeysPrefixes, StorageError> {
        let mut keys: StoreKeys = vec![];
        let mut prefixes: BTreeSet<StorePrefix> = BTreeSet::default();
        let data_map = self.data_map.lock();
        for key in data_map.keys() {
            let Some(key_strip) = key.as_str().strip_prefix(prefix.as_str()) else {
                continue;
            };
            if let Some((child, _)) = key_strip.split_once('/') {
                prefixes.insert(prefix.child(child)?);
            } else {
                keys.push(key.clone());
            }
        }
        Ok(StoreKeysPrefixes::new(keys, prefixes.into_iter().collect()))
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        let data_map = self.data_map.lock();
        Ok(data_map
            .iter()
            .filter(|(key, _)| key.has_prefix(prefix))
            .map(|(_, value)| value.len() as u64)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::Arc;

    use super::*;
    use crate::ReadableWritableListableStorageTraits;

    #[test]
    fn memory() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        crate::store_test::store_write(&store)?;
        crate::store_test::store_read(&store)?;
        crate::store_test::store_list(&store)?;
        crate::store_test::store_rename(&store)?;
        Ok(())
    }

    #[test]
    fn memory_upcast() -> Result<(), Box<dyn Error>> {
        let store: Arc<dyn ReadableWritableListableStorageTraits> = Arc::new(MemoryStore::new());
        crate::store_test::store_write(&store.clone().writable())?;
        crate::store_test::store_read(&store.clone().readable())?;
        crate::store_test::store_list(&store.clone().listable())?;
        Ok(())
    }

    #[test]
    fn memory_rename_onto_existing() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        store.set(&"a/x".try_into()?, Bytes::from_static(&[1]))?;
        store.set(&"b/y".try_into()?, Bytes::from_static(&[2]))?;
        let result = store.rename_prefix(&"a/".try_into()?, &"b/".try_into()?);
        assert!(matches!(result, Err(StorageError::RenameDestinationExists(_))));
        assert!(store.get(&"a/x".try_into()?)?.is_some());
        Ok(())
    }
}
