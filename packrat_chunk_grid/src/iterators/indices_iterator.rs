use std::iter::FusedIterator;

use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::{unravel_index, ArrayIndices, ArraySubset};

/// An iterator over the indices in an array subset.
///
/// Iterates over the last dimension fastest (i.e. C-contiguous order).
/// For example, consider a 4x3 array with element indices
/// ```text
/// (0, 0)  (0, 1)  (0, 2)
/// (1, 0)  (1, 1)  (1, 2)
/// (2, 0)  (2, 1)  (2, 2)
/// (3, 0)  (3, 1)  (3, 2)
/// ```
/// An iterator with an array subset corresponding to the lower right 2x2 region will produce `[(2, 1), (2, 2), (3, 1), (3, 2)]`.
#[derive(Clone, Debug)]
pub struct Indices {
    subset: ArraySubset,
}

impl Indices {
    /// Create a new indices struct.
    #[must_use]
    pub fn new(subset: ArraySubset) -> Self {
        Self { subset }
    }

    /// Return the number of indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subset.num_elements_usize()
    }

    /// Returns true if the number of indices is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> IndicesIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }

    /// Create a new parallel iterator.
    ///
    /// Items are produced in the same order as [`iter`](Self::iter) when collected.
    pub fn par_iter(&self) -> impl IndexedParallelIterator<Item = ArrayIndices> + '_ {
        (0..self.len())
            .into_par_iter()
            .map(move |index| self.indices_at(index))
    }

    fn indices_at(&self, index: usize) -> ArrayIndices {
        // index < len, so unravelling cannot fail
        let mut indices = unravel_index(index as u64, self.subset.shape()).unwrap_or_default();
        for (indices_i, start) in std::iter::zip(indices.iter_mut(), self.subset.start()) {
            *indices_i += start;
        }
        indices
    }
}

impl<'a> IntoIterator for &'a Indices {
    type Item = ArrayIndices;
    type IntoIter = IndicesIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        IndicesIterator {
            indices: self,
            range: 0..self.len(),
        }
    }
}

/// Serial indices iterator.
///
/// See [`Indices`].
pub struct IndicesIterator<'a> {
    indices: &'a Indices,
    range: std::ops::Range<usize>,
}

impl Iterator for IndicesIterator<'_> {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        self.range.next().map(|index| self.indices.indices_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl DoubleEndedIterator for IndicesIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.range
            .next_back()
            .map(|index| self.indices.indices_at(index))
    }
}

impl ExactSizeIterator for IndicesIterator<'_> {}

impl FusedIterator for IndicesIterator<'_> {}
