//! The write coordinator.
//!
//! Chunks are encoded concurrently on the rayon pool and flow over a channel to a single assignment loop.
//! The loop buffers chunks that finish early and hands them to the [`FilePacker`] in canonical [`ChunkKey`] order,
//! so the layout of the backing data files does not depend on the order in which encodes complete.
//! Chunks are issued in windows of `concurrent target × encode window multiplier` chunks.
//! The channel holds at most `concurrent target` chunks, so encoding stalls while the packer lags and
//! no more than a window and a channel of encoded chunks wait to be written.

use std::{
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, SyncSender},
    },
    thread::JoinHandle,
};

use bytes::Bytes;
use packrat_storage::{StorageError, StorePrefix, WritableStorage};
use rayon::prelude::*;

use super::{
    commit::CommitTarget, ArrayRecord, ChunkKey, ChunkPlan, CommitMode, DataFile, FilePacker,
    Manifest, ManifestEntry, SaveArgs, SaveError, SaveOptions,
};
use crate::{
    array::{Array, ArraySubset},
    codec::{ChunkRepresentation, CodecChain, CodecError, CodecOptions},
    concurrency::concurrency_chunks_and_codec,
    config::global_config,
};

/// An encoded chunk.
struct EncodedChunk {
    chunk_key: ChunkKey,
    bytes: Bytes,
    /// The size estimate of the codec chain.
    estimated_size: Option<u64>,
}

type EncodeResult = (usize, Result<EncodedChunk, SaveError>);

/// The outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    prefix: StorePrefix,
    mode: CommitMode,
    num_arrays: usize,
    num_chunks: u64,
    files: Vec<DataFile>,
}

impl CommitSummary {
    /// Return the prefix of the published checkpoint.
    #[must_use]
    pub fn prefix(&self) -> &StorePrefix {
        &self.prefix
    }

    /// Return how the checkpoint was published.
    #[must_use]
    pub const fn mode(&self) -> CommitMode {
        self.mode
    }

    /// Return the number of arrays.
    #[must_use]
    pub const fn num_arrays(&self) -> usize {
        self.num_arrays
    }

    /// Return the number of chunks.
    #[must_use]
    pub const fn num_chunks(&self) -> u64 {
        self.num_chunks
    }

    /// Return the backing data files.
    #[must_use]
    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    /// Return the total size of the backing data files.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// A handle to a save running in the background.
///
/// Dropping the handle detaches the save, it still commits or discards.
#[derive(Debug)]
pub struct SaveHandle {
    thread: JoinHandle<Result<CommitSummary, SaveError>>,
}

impl SaveHandle {
    /// Block until every chunk is written and the checkpoint is committed, or the save fails.
    ///
    /// # Errors
    /// Returns a [`SaveError`] if the save failed. The incomplete checkpoint has been discarded.
    pub fn wait_until_finished(self) -> Result<CommitSummary, SaveError> {
        self.thread.join().unwrap_or_else(|_| {
            Err(SaveError::WriteError(StorageError::Other(
                "the save thread panicked".to_string(),
            )))
        })
    }

    /// Returns true if the save has finished, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

struct ArrayTask {
    plan: ChunkPlan,
    array: Array,
}

/// Coordinates the encoding and writing of the chunks of a save.
pub struct WriteCoordinator {
    storage: WritableStorage,
    options: SaveOptions,
    arrays: BTreeMap<String, ArrayTask>,
}

impl WriteCoordinator {
    /// Create a new write coordinator.
    #[must_use]
    pub fn new(storage: WritableStorage, options: SaveOptions) -> Self {
        Self {
            storage,
            options,
            arrays: BTreeMap::new(),
        }
    }

    /// Plan the chunks of `array` and queue them for writing.
    ///
    /// # Errors
    /// Returns [`SaveError::ConfigurationError`] if an array has already been submitted at `name` or the chunk byte budget is zero.
    pub fn submit(
        &mut self,
        name: &str,
        array: Array,
        save_args: &SaveArgs,
    ) -> Result<(), SaveError> {
        if self.arrays.contains_key(name) {
            return Err(SaveError::ConfigurationError(format!(
                "array {name} was submitted more than once"
            )));
        }
        let plan = ChunkPlan::new(
            name,
            array.shape(),
            array.data_type(),
            save_args.chunk_byte_size(),
        )?;
        self.arrays
            .insert(name.to_string(), ArrayTask { plan, array });
        Ok(())
    }

    /// Return the number of submitted chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.arrays.values().map(|task| task.plan.num_chunks()).sum()
    }

    fn array_records(&self) -> Result<Vec<ArrayRecord>, SaveError> {
        let codecs = self
            .options
            .codecs()
            .metadata()
            .map_err(|err| SaveError::ConfigurationError(err.to_string()))?;
        Ok(self
            .arrays
            .values()
            .map(|task| ArrayRecord {
                name: task.plan.name().to_string(),
                shape: task.array.shape().to_vec(),
                data_type: task.array.data_type(),
                chunk_shape: task.plan.chunk_grid().chunk_shape_u64(),
                num_chunks: task.plan.num_chunks(),
                codecs: codecs.clone(),
            })
            .collect())
    }

    /// Start writing in the background and publish to `target` once every chunk is written.
    pub(crate) fn start(self, target: CommitTarget) -> Result<SaveHandle, SaveError> {
        let records = self.array_records()?;
        log::debug!(
            "saving {} chunks of {} arrays to {}",
            self.num_chunks(),
            self.arrays.len(),
            target.write_prefix()
        );
        let thread = std::thread::Builder::new()
            .name("packrat-save".to_string())
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    self.write_and_commit(&target, records)
                }))
                .unwrap_or_else(|_| {
                    Err(SaveError::WriteError(StorageError::Other(
                        "panicked while saving".to_string(),
                    )))
                });
                if result.is_err() {
                    target.discard();
                }
                result
            })
            .map_err(|err| SaveError::WriteError(err.into()))?;
        Ok(SaveHandle { thread })
    }

    fn write_and_commit(
        &self,
        target: &CommitTarget,
        records: Vec<ArrayRecord>,
    ) -> Result<CommitSummary, SaveError> {
        let packer = FilePacker::new(
            self.storage.clone(),
            target.data_prefix().map_err(SaveError::WriteError)?,
            self.options.target_data_file_size(),
        );
        let (entries, files) = self.write_chunks(packer)?;
        let num_chunks = entries.len() as u64;
        target
            .commit(Manifest::new(records, files.clone(), entries))
            .map_err(SaveError::CommitError)?;
        Ok(CommitSummary {
            prefix: target.final_prefix().clone(),
            mode: target.mode(),
            num_arrays: self.arrays.len(),
            num_chunks,
            files,
        })
    }

    /// Encode and write every chunk, returning the manifest entries in canonical order and the sealed files.
    fn write_chunks(
        &self,
        mut packer: FilePacker,
    ) -> Result<(Vec<ManifestEntry>, Vec<DataFile>), SaveError> {
        let failed = AtomicBool::new(false);
        let (sender, receiver) =
            mpsc::sync_channel::<EncodeResult>(self.options.concurrent_target().max(1));
        let entries = std::thread::scope(|scope| {
            let failed = &failed;
            scope.spawn(move || self.encode_chunks(&sender, failed));
            self.assign_chunks(&receiver, failed, &mut packer)
        })?;
        let files = packer.finish().map_err(SaveError::WriteError)?;
        Ok((entries, files))
    }

    /// Encode every chunk in canonical order windows, sending each result tagged with its canonical sequence number.
    fn encode_chunks(&self, sender: &SyncSender<EncodeResult>, failed: &AtomicBool) {
        let codecs: &CodecChain = self.options.codecs();
        let window_multiplier = global_config().encode_window_multiplier().max(1);
        let mut sequence_start = 0;
        for task in self.arrays.values() {
            let chunks = task.plan.chunks();
            let chunk_representation = ChunkRepresentation::new(
                task.plan.chunk_grid().chunk_shape_u64(),
                task.array.data_type(),
            );
            let (chunk_concurrent_limit, codec_options) = concurrency_chunks_and_codec(
                self.options.concurrent_target().max(1),
                chunks.len(),
                &CodecOptions::default(),
                &codecs.recommended_concurrency(&chunk_representation),
            );
            let window = chunk_concurrent_limit.saturating_mul(window_multiplier);

            for (window_index, window_chunks) in chunks.chunks(window).enumerate() {
                if failed.load(Ordering::Relaxed) {
                    return;
                }
                let window_start = sequence_start + window_index * window;
                crate::iter_concurrent_limit!(
                    chunk_concurrent_limit,
                    (0..window_chunks.len()),
                    for_each,
                    |index: usize| {
                        if failed.load(Ordering::Relaxed) {
                            return;
                        }
                        let (chunk_key, subset) = &window_chunks[index];
                        let result = encode_chunk(
                            &task.array,
                            chunk_key,
                            subset,
                            codecs,
                            &codec_options,
                        );
                        // the receiver outlives every sender
                        let _ = sender.send((window_start + index, result));
                    }
                );
            }
            sequence_start += chunks.len();
        }
    }

    /// Assign encoded chunks to backing data files in canonical order.
    ///
    /// On the first failure, assignment stops and the remaining results are drained.
    fn assign_chunks(
        &self,
        receiver: &Receiver<EncodeResult>,
        failed: &AtomicBool,
        packer: &mut FilePacker,
    ) -> Result<Vec<ManifestEntry>, SaveError> {
        let num_chunks = usize::try_from(self.num_chunks()).unwrap_or(usize::MAX);
        let mut entries: Vec<ManifestEntry> = Vec::with_capacity(num_chunks.min(1 << 20));
        let mut pending: BTreeMap<usize, EncodedChunk> = BTreeMap::new();
        let mut failure: Option<SaveError> = None;
        for (sequence, result) in receiver {
            if failure.is_some() {
                continue;
            }
            match result {
                Ok(chunk) => {
                    pending.insert(sequence, chunk);
                }
                Err(err) => {
                    failed.store(true, Ordering::Relaxed);
                    failure = Some(err);
                    continue;
                }
            }
            while let Some(chunk) = pending.remove(&entries.len()) {
                log::trace!(
                    "assigning chunk {} of {} bytes (estimated {:?})",
                    chunk.chunk_key,
                    chunk.bytes.len(),
                    chunk.estimated_size
                );
                match packer.assign(chunk.chunk_key, chunk.bytes) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        failed.store(true, Ordering::Relaxed);
                        failure = Some(SaveError::WriteError(err));
                        pending.clear();
                        break;
                    }
                }
            }
        }

        if let Some(failure) = failure {
            Err(failure)
        } else if entries.len() == num_chunks {
            Ok(entries)
        } else {
            Err(SaveError::WriteError(StorageError::Other(format!(
                "wrote {} of {num_chunks} chunks",
                entries.len()
            ))))
        }
    }
}

fn encode_chunk(
    array: &Array,
    chunk_key: &ChunkKey,
    subset: &ArraySubset,
    codecs: &CodecChain,
    options: &CodecOptions,
) -> Result<EncodedChunk, SaveError> {
    let encode_error = |source: CodecError| SaveError::EncodeError {
        chunk_key: chunk_key.clone(),
        source,
    };
    let chunk_representation = ChunkRepresentation::new(subset.shape().to_vec(), array.data_type());
    let decoded = array
        .subset_bytes(subset)
        .map_err(|err| encode_error(CodecError::Other(err.to_string())))?;
    let bytes = codecs
        .encode(decoded, &chunk_representation, options)
        .map_err(encode_error)?;
    Ok(EncodedChunk {
        chunk_key: chunk_key.clone(),
        bytes,
        estimated_size: codecs.encoded_representation(&chunk_representation).size(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicUsize, Arc};

    use packrat_storage::{
        store::MemoryStore, OffsetBytesIterator, ReadableStorageTraits, StoreKey,
        WritableStorageTraits,
    };

    use super::*;
    use crate::codec::ByteEncoder;

    fn coordinator(store: &Arc<MemoryStore>, options: SaveOptions) -> WriteCoordinator {
        WriteCoordinator::new(store.clone(), options)
    }

    fn packer(store: &Arc<MemoryStore>, target_size: Option<u64>) -> FilePacker {
        FilePacker::new(
            store.clone(),
            StorePrefix::new("ckpt/d/").unwrap(),
            target_size,
        )
    }

    #[test]
    fn coordinator_canonical_order() {
        let store = Arc::new(MemoryStore::new());
        let options = SaveOptions::default().with_concurrent_target(8);
        let mut coordinator = coordinator(&store, options);
        let args = SaveArgs::default().with_chunk_byte_size(Some(16));
        let b = Array::from_vec(vec![64], (0u8..64).collect::<Vec<_>>()).unwrap();
        let a = Array::from_vec(vec![8, 8], vec![7u16; 64]).unwrap();
        coordinator.submit("b", b, &args).unwrap();
        coordinator.submit("a", a.clone(), &args).unwrap();
        assert!(coordinator.submit("a", a, &args).is_err());
        assert_eq!(coordinator.num_chunks(), 12);

        let (entries, files) = coordinator
            .write_chunks(packer(&store, Some(40)))
            .unwrap();
        assert_eq!(entries.len(), 12);
        assert!(entries.windows(2).all(|w| w[0].chunk_key < w[1].chunk_key));
        assert_eq!(entries[0].chunk_key, ChunkKey::new("a", vec![0, 0]));
        assert_eq!(entries[8].chunk_key, ChunkKey::new("b", vec![0]));
        assert_eq!(files.len(), 6);
        assert_eq!(files.iter().map(|file| file.size).sum::<u64>(), 128 + 64);

        // b[0] holds bytes 0..16 and follows the 8 chunks of a
        let b0 = &entries[8];
        let file = store
            .get(&StorePrefix::new("ckpt/d/").unwrap().key(&DataFile::name(b0.file)).unwrap())
            .unwrap()
            .unwrap();
        let offset = usize::try_from(b0.offset).unwrap();
        assert_eq!(&file[offset..offset + 16], &(0u8..16).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn coordinator_deterministic_layout() {
        let layout = |concurrent_target: usize| {
            let store = Arc::new(MemoryStore::new());
            let options = SaveOptions::default().with_concurrent_target(concurrent_target);
            let mut coordinator = coordinator(&store, options);
            let array = Array::from_vec(vec![100, 10], (0..1000u32).collect::<Vec<_>>()).unwrap();
            coordinator
                .submit("x", array, &SaveArgs::default().with_chunk_byte_size(Some(120)))
                .unwrap();
            coordinator.write_chunks(packer(&store, Some(500))).unwrap()
        };
        assert_eq!(layout(1), layout(16));
    }

    #[derive(Debug)]
    struct FailingCodec;

    impl ByteEncoder for FailingCodec {
        fn metadata(&self) -> Result<crate::codec::CodecMetadata, CodecError> {
            crate::codec::CodecMetadata::new("failing", &serde_json::Map::new())
        }

        fn recommended_concurrency(
            &self,
            _decoded_representation: &crate::codec::BytesRepresentation,
        ) -> crate::codec::RecommendedConcurrency {
            crate::codec::RecommendedConcurrency::new_maximum(1)
        }

        fn encoded_representation(
            &self,
            decoded_representation: &crate::codec::BytesRepresentation,
        ) -> crate::codec::BytesRepresentation {
            *decoded_representation
        }

        fn encode(
            &self,
            decoded_value: Bytes,
            _chunk_representation: &ChunkRepresentation,
            _options: &CodecOptions,
        ) -> Result<Bytes, CodecError> {
            if decoded_value.first() == Some(&13) {
                Err(CodecError::Other("unlucky chunk".to_string()))
            } else {
                Ok(decoded_value)
            }
        }

        fn decode(
            &self,
            encoded_value: Bytes,
            _chunk_representation: &ChunkRepresentation,
            _options: &CodecOptions,
        ) -> Result<Bytes, CodecError> {
            Ok(encoded_value)
        }
    }

    #[derive(Debug, Default)]
    struct Progress {
        encoded: AtomicUsize,
        written: AtomicUsize,
        max_buffered: AtomicUsize,
    }

    /// Passes chunks through, recording how many are encoded but not yet written.
    #[derive(Debug)]
    struct CountingCodec(Arc<Progress>);

    impl ByteEncoder for CountingCodec {
        fn metadata(&self) -> Result<crate::codec::CodecMetadata, CodecError> {
            crate::codec::CodecMetadata::new("counting", &serde_json::Map::new())
        }

        fn recommended_concurrency(
            &self,
            _decoded_representation: &crate::codec::BytesRepresentation,
        ) -> crate::codec::RecommendedConcurrency {
            crate::codec::RecommendedConcurrency::new_maximum(1)
        }

        fn encoded_representation(
            &self,
            decoded_representation: &crate::codec::BytesRepresentation,
        ) -> crate::codec::BytesRepresentation {
            *decoded_representation
        }

        fn encode(
            &self,
            decoded_value: Bytes,
            _chunk_representation: &ChunkRepresentation,
            _options: &CodecOptions,
        ) -> Result<Bytes, CodecError> {
            let encoded = self.0.encoded.fetch_add(1, Ordering::SeqCst) + 1;
            let buffered = encoded.saturating_sub(self.0.written.load(Ordering::SeqCst));
            self.0.max_buffered.fetch_max(buffered, Ordering::SeqCst);
            Ok(decoded_value)
        }

        fn decode(
            &self,
            encoded_value: Bytes,
            _chunk_representation: &ChunkRepresentation,
            _options: &CodecOptions,
        ) -> Result<Bytes, CodecError> {
            Ok(encoded_value)
        }
    }

    /// A memory store that writes slowly.
    struct SlowStore {
        inner: MemoryStore,
        progress: Arc<Progress>,
    }

    impl SlowStore {
        fn written(&self) {
            std::thread::sleep(std::time::Duration::from_millis(2));
            self.progress.written.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl WritableStorageTraits for SlowStore {
        fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
            self.inner.set(key, value)?;
            self.written();
            Ok(())
        }

        fn set_partial_many(
            &self,
            key: &StoreKey,
            offset_values: OffsetBytesIterator,
        ) -> Result<(), StorageError> {
            self.inner.set_partial_many(key, offset_values)?;
            self.written();
            Ok(())
        }

        fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
            self.inner.erase(key)
        }

        fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
            self.inner.erase_prefix(prefix)
        }
    }

    #[test]
    fn coordinator_slow_writes_bound_buffered_chunks() {
        let progress = Arc::new(Progress::default());
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            progress: progress.clone(),
        });
        let codecs = CodecChain::new(vec![Arc::new(CountingCodec(progress.clone()))]).unwrap();
        let options = SaveOptions::default()
            .with_concurrent_target(1)
            .with_codecs(Arc::new(codecs));
        let mut coordinator = WriteCoordinator::new(store.clone(), options);
        let array = Array::from_vec(vec![64], (0u8..64).collect::<Vec<_>>()).unwrap();
        coordinator
            .submit("x", array, &SaveArgs::default().with_chunk_byte_size(Some(1)))
            .unwrap();
        let packer = FilePacker::new(store.clone(), StorePrefix::new("ckpt/d/").unwrap(), None);
        let (entries, files) = coordinator.write_chunks(packer).unwrap();
        assert_eq!(entries.len(), 64);
        assert_eq!(files, vec![DataFile { id: 0, size: 64 }]);
        assert_eq!(progress.written.load(Ordering::SeqCst), 64);

        let window = global_config().encode_window_multiplier().max(1);
        let max_buffered = progress.max_buffered.load(Ordering::SeqCst);
        assert!(
            max_buffered <= 2 * window + 2,
            "{max_buffered} chunks were buffered with a window of {window}"
        );
    }

    #[test]
    fn coordinator_encode_failure() {
        let store = Arc::new(MemoryStore::new());
        let codecs = CodecChain::new(vec![Arc::new(FailingCodec)]).unwrap();
        let options = SaveOptions::default().with_codecs(Arc::new(codecs));
        let mut coordinator = coordinator(&store, options);
        let array = Array::from_vec(vec![32], (0u8..32).collect::<Vec<_>>()).unwrap();
        coordinator
            .submit("x", array, &SaveArgs::default().with_chunk_byte_size(Some(1)))
            .unwrap();
        let err = coordinator.write_chunks(packer(&store, None)).unwrap_err();
        match err {
            SaveError::EncodeError { chunk_key, .. } => {
                assert_eq!(chunk_key, ChunkKey::new("x", vec![13]));
            }
            err => panic!("unexpected error {err}"),
        }
    }
}
