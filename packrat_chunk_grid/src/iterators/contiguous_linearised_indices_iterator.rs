use std::iter::FusedIterator;

use itertools::izip;

use super::{Indices, IndicesIterator};
use crate::{ravel_indices, ArrayShape, ArraySubset, ArraySubsetError};

/// Iterates over contiguous linearised element indices in an array subset.
///
/// The iterator item is a tuple: (linearised index, # contiguous elements).
///
/// Iterates over the last dimension fastest (i.e. C-contiguous order).
/// For example, consider a 4x3 array with linearised element indices
/// ```text
/// 0   1   2
/// 3   4   5
/// 6   7   8
/// 9  10  11
/// ```
/// An iterator with an array subset covering the entire array will produce
/// ```rust,ignore
/// [(0, 12)]
/// ```
/// An iterator with an array subset corresponding to the lower right 2x2 region will produce
/// ```rust,ignore
/// [(7, 2), (10, 2)]
/// ```
#[derive(Clone, Debug)]
pub struct ContiguousLinearisedIndices {
    starts: Indices,
    contiguous_elements: u64,
    array_shape: ArrayShape,
}

impl ContiguousLinearisedIndices {
    /// Create a new contiguous linearised indices iterator.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if `array_shape` does not encapsulate `subset`.
    pub fn new(subset: &ArraySubset, array_shape: ArrayShape) -> Result<Self, ArraySubsetError> {
        if subset.dimensionality() != array_shape.len() {
            return Err(ArraySubsetError::IncompatibleDimensionality {
                got: subset.dimensionality(),
                expected: array_shape.len(),
            });
        }
        if !subset.inbounds_shape(&array_shape) {
            return Err(ArraySubsetError::OutOfBounds {
                end: subset.end_exc(),
                array_shape,
            });
        }

        // Merge trailing dimensions while the subset spans them entirely
        let mut contiguous = true;
        let mut contiguous_elements = 1;
        let mut shape_out = vec![0; array_shape.len()];
        for (&subset_start, &subset_size, &array_size, shape_out_i) in izip!(
            subset.start().iter().rev(),
            subset.shape().iter().rev(),
            array_shape.iter().rev(),
            shape_out.iter_mut().rev(),
        ) {
            if contiguous {
                contiguous_elements *= subset_size;
                *shape_out_i = 1;
                contiguous = subset_start == 0 && subset_size == array_size;
            } else {
                *shape_out_i = subset_size;
            }
        }
        let starts = if subset.is_empty() {
            ArraySubset::new_with_shape(vec![0; array_shape.len()])
        } else {
            ArraySubset {
                start: subset.start().to_vec(),
                shape: shape_out,
            }
        };
        Ok(Self {
            starts: starts.indices(),
            contiguous_elements,
            array_shape,
        })
    }

    /// Return the number of starting indices (i.e. the length of the iterator).
    #[must_use]
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Returns true if the number of starting indices is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the number of contiguous elements (fixed on each iteration).
    #[must_use]
    pub fn contiguous_elements(&self) -> u64 {
        self.contiguous_elements
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> ContiguousLinearisedIndicesIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }
}

impl<'a> IntoIterator for &'a ContiguousLinearisedIndices {
    type Item = (u64, u64);
    type IntoIter = ContiguousLinearisedIndicesIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        ContiguousLinearisedIndicesIterator {
            inner: self.starts.iter(),
            contiguous_elements: self.contiguous_elements,
            array_shape: &self.array_shape,
        }
    }
}

/// Serial contiguous linearised indices iterator.
///
/// See [`ContiguousLinearisedIndices`].
pub struct ContiguousLinearisedIndicesIterator<'a> {
    inner: IndicesIterator<'a>,
    contiguous_elements: u64,
    array_shape: &'a [u64],
}

impl Iterator for ContiguousLinearisedIndicesIterator<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let indices = self.inner.next()?;
            if let Some(index) = ravel_indices(&indices, self.array_shape) {
                return Some((index, self.contiguous_elements));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl FusedIterator for ContiguousLinearisedIndicesIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_linearised_indices() {
        let array_shape = vec![4, 3];
        let whole = ArraySubset::new_with_shape(array_shape.clone());
        let indices = whole.contiguous_linearised_indices(&array_shape).unwrap();
        assert_eq!(indices.iter().collect::<Vec<_>>(), vec![(0, 12)]);

        let lower_right = ArraySubset::new_with_ranges(&[2..4, 1..3]);
        let indices = lower_right
            .contiguous_linearised_indices(&array_shape)
            .unwrap();
        assert_eq!(indices.len(), 2);
        assert_eq!(indices.contiguous_elements(), 2);
        assert_eq!(indices.iter().collect::<Vec<_>>(), vec![(7, 2), (10, 2)]);

        let rows = ArraySubset::new_with_ranges(&[1..3, 0..3]);
        let indices = rows.contiguous_linearised_indices(&array_shape).unwrap();
        assert_eq!(indices.iter().collect::<Vec<_>>(), vec![(3, 6)]);
    }

    #[test]
    fn contiguous_linearised_indices_3d() {
        let array_shape = vec![2, 4, 4];
        let subset = ArraySubset::new_with_ranges(&[0..2, 2..4, 0..4]);
        let indices = subset.contiguous_linearised_indices(&array_shape).unwrap();
        assert_eq!(indices.iter().collect::<Vec<_>>(), vec![(8, 8), (24, 8)]);
    }

    #[test]
    fn contiguous_linearised_indices_invalid() {
        let subset = ArraySubset::new_with_ranges(&[2..5, 1..3]);
        assert!(subset.contiguous_linearised_indices(&[4, 3]).is_err());
        assert!(subset.contiguous_linearised_indices(&[4, 3, 1]).is_err());
    }

    #[test]
    fn contiguous_linearised_indices_empty() {
        let subset = ArraySubset::new_with_ranges(&[0..0, 1..3]);
        let indices = subset.contiguous_linearised_indices(&[4, 3]).unwrap();
        assert!(indices.is_empty());
        assert_eq!(indices.iter().next(), None);
    }
}
