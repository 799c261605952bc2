//! `packrat` is a checkpoint storage engine for trees of multidimensional numeric arrays.
//!
//! A save persists a snapshot of an [`ArrayTree`](array::ArrayTree) into a storage location.
//! Each array is split into chunks, the chunks are encoded concurrently, and the encoded bytes are packed into one or more backing data files so that no data file exceeds a target size.
//! Every chunk stays independently addressable through a manifest, and the checkpoint only becomes visible once it is complete.
//!
//! ## Getting Started
//! ```rust
//! # use std::sync::Arc;
//! use packrat::array::{Array, ArrayTree};
//! use packrat::checkpoint::{SaveArgs, SaveOptions};
//! use packrat::storage::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let tree = ArrayTree::new()
//!     .with_array("params/w", Array::from_vec(vec![64, 64], vec![1.0f32; 64 * 64])?)?
//!     .with_array("step", Array::from_elements(vec![], &[100u64])?)?;
//!
//! let options = SaveOptions::default()
//!     .with_target_data_file_size(Some(4096))
//!     .with_default_save_args(SaveArgs::default().with_chunk_byte_size(Some(2048)));
//! let summary = packrat::save(store.clone(), "ckpt/100", tree.clone(), &options)?
//!     .wait_until_finished()?;
//! assert_eq!(summary.num_chunks(), 9);
//!
//! let restored = packrat::open(&store, "ckpt/100")?;
//! assert_eq!(restored, tree);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Checkpoint Layout
//! A checkpoint at `path` holds
//!  - `path/manifest.json`: the array records, backing file list and ordered chunk index, see [`Manifest`](checkpoint::Manifest),
//!  - `path/d/00000000.data`, `path/d/00000001.data`, ...: the backing data files, and
//!  - `path/commit_success.txt`: only for stores that cannot rename a prefix, see [`CommitMode`](checkpoint::CommitMode).
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: Re-export [`packrat_filesystem`] as [`packrat::filesystem`](crate::filesystem).
//!  - Codecs: `crc32c`, `gzip`.
//!
//! ## Logging
//! `packrat` logs through the [`log`] crate.
//! A logger implementation such as `env_logger` must be installed by the application to see the messages.
//! Backing file seals are logged at the `debug` level, commits at the `info` level, and failures to discard an incomplete checkpoint at the `warn` level.
//!
//! ## Licence
//! `packrat` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::wildcard_enum_match_arm)]

pub mod array;
pub mod checkpoint;
pub mod codec;
pub mod concurrency;
pub mod config;

#[cfg(feature = "filesystem")]
pub use packrat_filesystem as filesystem;
pub use packrat_chunk_grid as chunk_grid;
pub use packrat_storage as storage;

pub use checkpoint::{open, save, Checkpointer};

use rayon_iter_concurrent_limit::iter_concurrent_limit;
