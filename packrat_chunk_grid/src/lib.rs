//! The chunk grid API for the [`packrat`](https://docs.rs/packrat/latest/packrat/index.html) checkpoint engine.
//!
//! Arrays are split into rectangular chunks on a [`RegularChunkGrid`].
//! An [`ArraySubset`] describes one chunk (or any other region) of an array and the [`iterators`] walk its elements in C order.
//!
//! ## Licence
//! `packrat_chunk_grid` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

mod array_subset;
pub use array_subset::{ArraySubset, ArraySubsetError};

mod regular;
pub use regular::RegularChunkGrid;

pub mod iterators;

use std::num::NonZeroU64;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// An ND index to an element in an array or chunk.
pub type ArrayIndices = Vec<u64>;

/// The shape of a chunk. All dimensions must be non-zero.
pub type ChunkShape = Vec<NonZeroU64>;

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// Convert a [`ChunkShape`] to an [`ArrayShape`].
#[must_use]
pub fn chunk_shape_to_array_shape(chunk_shape: &[NonZeroU64]) -> ArrayShape {
    chunk_shape.iter().map(|i| i.get()).collect()
}

/// Unravel a linearised index to ND indices.
///
/// Returns [`None`] if `index` is outside of `shape`.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> Option<ArrayIndices> {
    let len = shape.len();
    let mut indices: ArrayIndices = vec![0; len];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        if dim == 0 {
            return None;
        }
        *indices_i = index % dim;
        index /= dim;
    }
    if index == 0 {
        Some(indices)
    } else {
        None
    }
}

/// Ravel ND indices to a linearised index.
///
/// Returns [`None`] if any index is outside of `shape` or dimensionalities differ.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> Option<u64> {
    if indices.len() != shape.len() {
        return None;
    }
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        if i >= s {
            return None;
        }
        index += i * count;
        count *= s;
    }
    Some(index)
}
