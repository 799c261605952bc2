//! The regular chunk grid.

use std::num::NonZeroU64;

use crate::{
    chunk_shape_to_array_shape, iterators::Indices, ArrayIndices, ArrayShape, ArraySubset,
    ChunkShape, IncompatibleDimensionalityError,
};

/// A regular chunk grid.
///
/// Every chunk has the same shape, except those on the upper boundary of the array which are clipped to the array extent.
/// An array with a zero-length dimension has no chunks.
#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularChunkGrid {
    array_shape: ArrayShape,
    grid_shape: ArrayShape,
    chunk_shape: ChunkShape,
}

impl RegularChunkGrid {
    /// Create a new regular chunk grid over `array_shape` with chunk shape `chunk_shape`.
    ///
    /// # Errors
    /// Returns an [`IncompatibleDimensionalityError`] if `chunk_shape` and `array_shape` have a different dimensionality.
    pub fn new(
        array_shape: ArrayShape,
        chunk_shape: ChunkShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if array_shape.len() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                array_shape.len(),
            ));
        }
        let grid_shape = std::iter::zip(&array_shape, &chunk_shape)
            .map(|(a, c)| a.div_ceil(c.get()))
            .collect();
        Ok(Self {
            array_shape,
            grid_shape,
            chunk_shape,
        })
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.array_shape.len()
    }

    /// Return the array shape.
    #[must_use]
    pub fn array_shape(&self) -> &[u64] {
        &self.array_shape
    }

    /// Return the number of chunks along each dimension.
    #[must_use]
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Return the (unclipped) chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[NonZeroU64] {
        &self.chunk_shape
    }

    /// Return the (unclipped) chunk shape as a [`Vec<u64>`].
    #[must_use]
    pub fn chunk_shape_u64(&self) -> Vec<u64> {
        chunk_shape_to_array_shape(&self.chunk_shape)
    }

    /// Return the total number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.grid_shape.iter().product()
    }

    /// Return the origin of the chunk at `chunk_indices`.
    ///
    /// Returns [`None`] if `chunk_indices` are out of bounds of the grid.
    #[must_use]
    pub fn chunk_origin(&self, chunk_indices: &[u64]) -> Option<ArrayIndices> {
        if !self.inbounds(chunk_indices) {
            return None;
        }
        Some(
            std::iter::zip(chunk_indices, &self.chunk_shape)
                .map(|(i, c)| i * c.get())
                .collect(),
        )
    }

    /// Return the region of the array covered by the chunk at `chunk_indices`, clipped to the array extent.
    ///
    /// Returns [`None`] if `chunk_indices` are out of bounds of the grid.
    #[must_use]
    pub fn subset(&self, chunk_indices: &[u64]) -> Option<ArraySubset> {
        let origin = self.chunk_origin(chunk_indices)?;
        let ranges = itertools::izip!(origin, &self.chunk_shape, &self.array_shape)
            .map(|(start, chunk, array)| start..(start + chunk.get()).min(*array));
        Some(ArraySubset::from(ranges))
    }

    /// Return the indices of the chunk holding the element at `array_indices`.
    ///
    /// Returns [`None`] if `array_indices` are out of bounds of the array.
    #[must_use]
    pub fn chunk_indices(&self, array_indices: &[u64]) -> Option<ArrayIndices> {
        if array_indices.len() != self.dimensionality()
            || std::iter::zip(array_indices, &self.array_shape).any(|(i, s)| i >= s)
        {
            return None;
        }
        Some(
            std::iter::zip(array_indices, &self.chunk_shape)
                .map(|(i, c)| i / c.get())
                .collect(),
        )
    }

    /// Returns an iterator over the indices of every chunk in C order.
    #[must_use]
    pub fn chunks(&self) -> Indices {
        ArraySubset::new_with_shape(self.grid_shape.clone()).indices()
    }

    fn inbounds(&self, chunk_indices: &[u64]) -> bool {
        chunk_indices.len() == self.dimensionality()
            && std::iter::zip(chunk_indices, &self.grid_shape).all(|(i, g)| i < g)
    }
}
