//! Chunk planning.
//!
//! Chunks are planned by shrinking the leading (slowest varying) dimensions of an array first, so that the elements of each chunk are as contiguous as possible in the C-order array bytes.

use std::num::NonZeroU64;

use packrat_chunk_grid::RegularChunkGrid;

use super::{ChunkKey, SaveError};
use crate::array::{ArraySubset, ChunkShape, DataType};

/// Plan the chunk shape of an array.
///
/// - With no `chunk_byte_size`, the chunk spans the whole array.
/// - Otherwise, dimensions are visited from the first.
///   A dimension whose single slab (one index along it, full extent along later dimensions) is larger than the budget gets an extent of 1 and the next dimension is visited.
///   Otherwise the dimension gets as many slabs as fit in the budget and later dimensions keep their full extent.
///
/// The resulting chunk holds at most `chunk_byte_size` bytes unless a single element is larger than the budget.
/// Zero-length dimensions are planned with an extent of 1, the resulting grid has no chunks.
///
/// # Errors
/// Returns [`SaveError::ConfigurationError`] if `chunk_byte_size` is zero.
pub fn plan_chunk_shape(
    array_shape: &[u64],
    element_size: usize,
    chunk_byte_size: Option<u64>,
) -> Result<ChunkShape, SaveError> {
    let extents: Vec<u64> = array_shape.iter().map(|&dim| dim.max(1)).collect();
    let Some(budget) = chunk_byte_size else {
        return Ok(to_chunk_shape(&extents));
    };
    if budget == 0 {
        return Err(SaveError::ConfigurationError(
            "the chunk byte size must be greater than zero".to_string(),
        ));
    }

    let mut chunk_shape = extents.clone();
    for (dim, extent) in extents.iter().enumerate() {
        let slab_size = extents[dim + 1..]
            .iter()
            .fold(element_size as u64, |size, &extent| size.saturating_mul(extent));
        if slab_size > budget {
            chunk_shape[dim] = 1;
        } else {
            chunk_shape[dim] = (*extent).min(budget / slab_size);
            break;
        }
    }
    Ok(to_chunk_shape(&chunk_shape))
}

fn to_chunk_shape(shape: &[u64]) -> ChunkShape {
    shape
        .iter()
        .map(|&extent| NonZeroU64::new(extent).unwrap_or(NonZeroU64::MIN))
        .collect()
}

/// The chunk plan of one array.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    name: String,
    data_type: DataType,
    chunk_grid: RegularChunkGrid,
}

impl ChunkPlan {
    /// Plan the chunks of the array `name`.
    ///
    /// # Errors
    /// Returns [`SaveError::ConfigurationError`] if `chunk_byte_size` is zero.
    pub fn new(
        name: impl Into<String>,
        array_shape: &[u64],
        data_type: DataType,
        chunk_byte_size: Option<u64>,
    ) -> Result<Self, SaveError> {
        let chunk_shape = plan_chunk_shape(array_shape, data_type.size(), chunk_byte_size)?;
        let chunk_grid = RegularChunkGrid::new(array_shape.to_vec(), chunk_shape)
            .map_err(|err| SaveError::ConfigurationError(err.to_string()))?;
        Ok(Self {
            name: name.into(),
            data_type,
            chunk_grid,
        })
    }

    /// Return the tree path of the array.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the data type of the array.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the chunk grid.
    #[must_use]
    pub const fn chunk_grid(&self) -> &RegularChunkGrid {
        &self.chunk_grid
    }

    /// Return the number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.chunk_grid.num_chunks()
    }

    /// Return the key and array region of every chunk in canonical order.
    #[must_use]
    pub fn chunks(&self) -> Vec<(ChunkKey, ArraySubset)> {
        self.chunk_grid
            .chunks()
            .iter()
            .filter_map(|chunk_indices| {
                let subset = self.chunk_grid.subset(&chunk_indices)?;
                Some((ChunkKey::new(self.name.clone(), chunk_indices), subset))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayShape;

    fn plan(shape: &[u64], element_size: usize, budget: Option<u64>) -> ArrayShape {
        plan_chunk_shape(shape, element_size, budget)
            .unwrap()
            .iter()
            .map(|c| c.get())
            .collect()
    }

    #[test]
    fn plan_whole_array() {
        assert_eq!(plan(&[4, 1024, 1024], 4, None), vec![4, 1024, 1024]);
        assert_eq!(plan(&[], 8, None), Vec::<u64>::new());
        assert_eq!(plan(&[], 8, Some(1)), Vec::<u64>::new());
    }

    #[test]
    fn plan_leading_dimensions_first() {
        const MIB: u64 = 1024 * 1024;
        assert_eq!(plan(&[4, 1024, 1024], 4, Some(MIB)), vec![1, 256, 1024]);
        assert_eq!(plan(&[4, 1024, 1024], 4, Some(4 * MIB)), vec![1, 1024, 1024]);
        assert_eq!(plan(&[4, 1024, 1024], 4, Some(8 * MIB)), vec![2, 1024, 1024]);
        assert_eq!(plan(&[4, 1024, 1024], 4, Some(64 * MIB)), vec![4, 1024, 1024]);
        assert_eq!(plan(&[10, 10], 1, Some(25)), vec![2, 10]);
        assert_eq!(plan(&[10, 10], 1, Some(7)), vec![1, 7]);
    }

    #[test]
    fn plan_single_element() {
        assert_eq!(plan(&[3, 3], 8, Some(4)), vec![1, 1]);
        assert_eq!(plan(&[3, 3], 8, Some(8)), vec![1, 1]);
    }

    #[test]
    fn plan_zero_budget() {
        assert!(matches!(
            plan_chunk_shape(&[3], 1, Some(0)),
            Err(SaveError::ConfigurationError(_))
        ));
    }

    #[test]
    fn plan_chunk_sizes_within_budget() {
        let shapes: [&[u64]; 4] = [&[7, 13, 5], &[100], &[2, 2, 2, 2], &[1, 999]];
        for shape in shapes {
            for budget in [1u64, 3, 10, 64, 1000, 100_000] {
                let chunk_shape = plan(shape, 2, Some(budget));
                let size = chunk_shape.iter().product::<u64>() * 2;
                assert!(size <= budget.max(2), "{shape:?} {budget} {chunk_shape:?}");
            }
        }
    }

    #[test]
    fn chunk_plan_canonical_order() {
        let plan = ChunkPlan::new("x", &[3, 4], DataType::UInt8, Some(4)).unwrap();
        assert_eq!(plan.num_chunks(), 3);
        let chunks = plan.chunks();
        assert_eq!(chunks[0].0, ChunkKey::new("x", vec![0, 0]));
        assert_eq!(chunks[2].1, ArraySubset::new_with_ranges(&[2..3, 0..4]));
        assert!(chunks.windows(2).all(|w| w[0].0 < w[1].0));

        let plan = ChunkPlan::new("x", &[5, 3], DataType::UInt8, Some(6)).unwrap();
        let chunks = plan.chunks();
        let last = chunks.last().unwrap();
        assert_eq!(last.1, ArraySubset::new_with_ranges(&[4..5, 0..3]));
    }

    #[test]
    fn chunk_plan_zero_length_dimension() {
        let plan = ChunkPlan::new("x", &[4, 0], DataType::Float32, Some(8)).unwrap();
        assert_eq!(plan.num_chunks(), 0);
        assert!(plan.chunks().is_empty());
        assert_eq!(plan.chunk_grid().chunk_shape_u64(), vec![2, 1]);
    }
}
