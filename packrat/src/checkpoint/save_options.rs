use std::{collections::BTreeMap, sync::Arc};

use crate::codec::CodecChain;
use crate::config::global_config;

/// Per array save arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveArgs {
    chunk_byte_size: Option<u64>,
}

impl SaveArgs {
    /// Return the chunk byte budget.
    ///
    /// If [`None`], the array is stored as a single chunk.
    #[must_use]
    pub const fn chunk_byte_size(&self) -> Option<u64> {
        self.chunk_byte_size
    }

    /// Set the chunk byte budget.
    pub fn set_chunk_byte_size(&mut self, chunk_byte_size: Option<u64>) -> &mut Self {
        self.chunk_byte_size = chunk_byte_size;
        self
    }

    /// Set the chunk byte budget.
    #[must_use]
    pub const fn with_chunk_byte_size(mut self, chunk_byte_size: Option<u64>) -> Self {
        self.chunk_byte_size = chunk_byte_size;
        self
    }
}

/// Options for a save.
///
/// The default values are:
/// - `target_data_file_size`: [`None`], every chunk is packed into one data file
/// - `concurrent_target`: the [global concurrent target](crate::config::Config#concurrent-target)
/// - `codecs`: [`CodecChain::default`], a little endian `bytes` codec
/// - `default_save_args`: [`SaveArgs::default`], one chunk per array
#[derive(Debug, Clone)]
pub struct SaveOptions {
    target_data_file_size: Option<u64>,
    concurrent_target: usize,
    codecs: Arc<CodecChain>,
    default_save_args: SaveArgs,
    save_args: BTreeMap<String, SaveArgs>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            target_data_file_size: None,
            concurrent_target: global_config().concurrent_target(),
            codecs: Arc::new(CodecChain::default()),
            default_save_args: SaveArgs::default(),
            save_args: BTreeMap::new(),
        }
    }
}

impl SaveOptions {
    /// Return the target size of backing data files.
    #[must_use]
    pub const fn target_data_file_size(&self) -> Option<u64> {
        self.target_data_file_size
    }

    /// Set the target size of backing data files.
    ///
    /// A data file only exceeds the target if it holds a single chunk larger than the target.
    pub fn set_target_data_file_size(&mut self, target_data_file_size: Option<u64>) -> &mut Self {
        self.target_data_file_size = target_data_file_size;
        self
    }

    /// Set the target size of backing data files.
    #[must_use]
    pub fn with_target_data_file_size(mut self, target_data_file_size: Option<u64>) -> Self {
        self.target_data_file_size = target_data_file_size;
        self
    }

    /// Return the concurrent target.
    #[must_use]
    pub const fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the concurrent target.
    pub fn set_concurrent_target(&mut self, concurrent_target: usize) -> &mut Self {
        self.concurrent_target = concurrent_target;
        self
    }

    /// Set the concurrent target.
    #[must_use]
    pub fn with_concurrent_target(mut self, concurrent_target: usize) -> Self {
        self.concurrent_target = concurrent_target;
        self
    }

    /// Return the codec chain applied to every chunk.
    #[must_use]
    pub fn codecs(&self) -> &Arc<CodecChain> {
        &self.codecs
    }

    /// Set the codec chain applied to every chunk.
    pub fn set_codecs(&mut self, codecs: Arc<CodecChain>) -> &mut Self {
        self.codecs = codecs;
        self
    }

    /// Set the codec chain applied to every chunk.
    #[must_use]
    pub fn with_codecs(mut self, codecs: Arc<CodecChain>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Return the save arguments of arrays without their own save arguments.
    #[must_use]
    pub const fn default_save_args(&self) -> &SaveArgs {
        &self.default_save_args
    }

    /// Set the save arguments of arrays without their own save arguments.
    pub fn set_default_save_args(&mut self, save_args: SaveArgs) -> &mut Self {
        self.default_save_args = save_args;
        self
    }

    /// Set the save arguments of arrays without their own save arguments.
    #[must_use]
    pub fn with_default_save_args(mut self, save_args: SaveArgs) -> Self {
        self.default_save_args = save_args;
        self
    }

    /// Return the save arguments of the array at `path`.
    #[must_use]
    pub fn save_args(&self, path: &str) -> &SaveArgs {
        self.save_args.get(path).unwrap_or(&self.default_save_args)
    }

    /// Set the save arguments of the array at `path`.
    pub fn set_save_args(&mut self, path: impl Into<String>, save_args: SaveArgs) -> &mut Self {
        self.save_args.insert(path.into(), save_args);
        self
    }

    /// Set the save arguments of the array at `path`.
    #[must_use]
    pub fn with_save_args(mut self, path: impl Into<String>, save_args: SaveArgs) -> Self {
        self.save_args.insert(path.into(), save_args);
        self
    }
}
