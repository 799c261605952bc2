//! `packrat` global configuration options.
//!
//! See [`Config`] for the list of options.

use std::sync::OnceLock;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `packrat` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Save Options
/// ### Concurrent Target
/// > default: [`rayon::current_num_threads()`]
///
/// The default number of concurrent chunk encodes of a save.
/// Used as the default of [`SaveOptions::concurrent_target`](crate::checkpoint::SaveOptions::concurrent_target).
///
/// ### Chunk Concurrent Minimum
/// > default: `4`
///
/// The preferred minimum number of chunks encoded concurrently.
/// The remainder of the concurrent target is handed to the codecs of each chunk.
///
/// ### Encode Window Multiplier
/// > default: `4`
///
/// Chunks are encoded in windows of `concurrent target × multiplier` chunks.
/// This bounds the number of encoded chunks held in memory while they wait to be assigned to a data file.
///
/// ## Read Options
/// ### Validate Checksums
/// > default: [`true`]
///
/// Checksum codecs (e.g. `crc32c`) validate that the checksum of a chunk is correct when decoding.
#[derive(Debug, Clone)]
#[allow(clippy::struct_field_names)]
pub struct Config {
    concurrent_target: usize,
    chunk_concurrent_minimum: usize,
    encode_window_multiplier: usize,
    validate_checksums: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrent_target: rayon::current_num_threads(),
            chunk_concurrent_minimum: 4,
            encode_window_multiplier: 4,
            validate_checksums: true,
        }
    }
}

impl Config {
    /// Get the [concurrent target](#concurrent-target) configuration.
    #[must_use]
    pub fn concurrent_target(&self) -> usize {
        self.concurrent_target
    }

    /// Set the [concurrent target](#concurrent-target) configuration.
    pub fn set_concurrent_target(&mut self, concurrent_target: usize) -> &mut Self {
        self.concurrent_target = concurrent_target;
        self
    }

    /// Get the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    #[must_use]
    pub fn chunk_concurrent_minimum(&self) -> usize {
        self.chunk_concurrent_minimum
    }

    /// Set the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    pub fn set_chunk_concurrent_minimum(&mut self, chunk_concurrent_minimum: usize) -> &mut Self {
        self.chunk_concurrent_minimum = chunk_concurrent_minimum;
        self
    }

    /// Get the [encode window multiplier](#encode-window-multiplier) configuration.
    #[must_use]
    pub fn encode_window_multiplier(&self) -> usize {
        self.encode_window_multiplier
    }

    /// Set the [encode window multiplier](#encode-window-multiplier) configuration.
    pub fn set_encode_window_multiplier(&mut self, encode_window_multiplier: usize) -> &mut Self {
        self.encode_window_multiplier = encode_window_multiplier;
        self
    }

    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) -> &mut Self {
        self.validate_checksums = validate_checksums;
        self
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `packrat` configuration.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global `packrat` configuration.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write()
}
