//! Array subset iterators.
//!
//! The iterators are:
//!  - [`Indices`]: iterate over the multidimensional indices of the elements in a subset, and
//!  - [`ContiguousLinearisedIndices`]: iterate over contiguous runs of elements of a subset in terms of linearised indices within an enclosing array.
//!
//! Both iterate in C order (the last dimension fastest).

mod contiguous_linearised_indices_iterator;
mod indices_iterator;

pub use contiguous_linearised_indices_iterator::{
    ContiguousLinearisedIndices, ContiguousLinearisedIndicesIterator,
};
pub use indices_iterator::{Indices, IndicesIterator};
