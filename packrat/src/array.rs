//! Arrays and trees of arrays.
//!
//! An [`Array`] is an immutable, typed, shaped block of numeric values held as native endian bytes in C order (the last dimension varies fastest).
//! An [`ArrayTree`] maps `/` separated tree paths to arrays and is the unit saved to a checkpoint.
//!
//! ```rust
//! # use packrat::array::{Array, ArrayTree};
//! let mut tree = ArrayTree::new();
//! tree.insert("params/dense/kernel", Array::from_elements(vec![2, 3], &[0.0f32; 6])?)?;
//! tree.insert("step", Array::from_elements(vec![], &[10u64])?)?;
//! assert_eq!(tree.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod array_bytes;
mod data_type;
mod element;

use std::collections::BTreeMap;

use bytes::Bytes;
use derive_more::Deref;
use thiserror::Error;

pub(crate) use array_bytes::{bytes_len, extract_subset_bytes, update_subset_bytes};
pub use data_type::DataType;
pub use element::{Element, ElementError};
pub use packrat_chunk_grid::{ArrayIndices, ArrayShape, ArraySubset, ArraySubsetError, ChunkShape};

/// An array error.
#[derive(Clone, Debug, Error)]
pub enum ArrayError {
    /// The number of bytes does not match the shape and data type.
    #[error("array bytes have length {len}, expected {expected_len}")]
    InvalidBytesLength {
        /// The length of the bytes.
        len: usize,
        /// The expected length of the bytes.
        expected_len: usize,
    },
    /// The size of the array exceeds the address space.
    #[error("array shape is too large")]
    ShapeOverflow,
    /// An element error.
    #[error(transparent)]
    ElementError(#[from] ElementError),
    /// An invalid subset.
    #[error(transparent)]
    InvalidSubset(#[from] ArraySubsetError),
}

/// An array.
///
/// Cloning an array is cheap, the bytes are reference counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Array {
    data_type: DataType,
    shape: ArrayShape,
    bytes: Bytes,
}

impl Array {
    /// Create a new array from native endian C-order `bytes`.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidBytesLength`] if the length of `bytes` is not `product(shape) × data_type.size()`.
    pub fn new(
        data_type: DataType,
        shape: ArrayShape,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, ArrayError> {
        let bytes = bytes.into();
        let expected_len = bytes_len(&shape, data_type.size())?;
        if bytes.len() != expected_len {
            return Err(ArrayError::InvalidBytesLength {
                len: bytes.len(),
                expected_len,
            });
        }
        Ok(Self {
            data_type,
            shape,
            bytes,
        })
    }

    /// Create a new array from a slice of C-order elements.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidBytesLength`] if the number of elements does not match `shape`.
    pub fn from_elements<T: Element>(shape: ArrayShape, elements: &[T]) -> Result<Self, ArrayError> {
        Self::new(
            T::DATA_TYPE,
            shape,
            Bytes::copy_from_slice(T::to_bytes(elements)),
        )
    }

    /// Create a new array from a vector of C-order elements.
    ///
    /// Avoids an extra copy compared to [`Array::from_elements`] when possible.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidBytesLength`] if the number of elements does not match `shape`.
    pub fn from_vec<T: Element>(shape: ArrayShape, elements: Vec<T>) -> Result<Self, ArrayError> {
        Self::new(T::DATA_TYPE, shape, T::into_bytes(elements))
    }

    /// Return the data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the native endian C-order bytes.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Return the elements.
    ///
    /// # Errors
    /// Returns an [`ElementError`] if `T` does not match the data type of the array.
    pub fn to_elements<T: Element>(&self) -> Result<Vec<T>, ArrayError> {
        T::validate_data_type(self.data_type)?;
        Ok(T::from_bytes(&self.bytes)?)
    }

    /// Return the native endian C-order bytes of `subset`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `subset` is not within the array.
    pub fn subset_bytes(&self, subset: &ArraySubset) -> Result<Bytes, ArrayError> {
        if subset.start().iter().all(|&i| i == 0) && subset.shape() == self.shape.as_slice() {
            return Ok(self.bytes.clone());
        }
        Ok(extract_subset_bytes(&self.bytes, &self.shape, self.data_type.size(), subset)?.into())
    }
}

/// An invalid tree path.
#[derive(Clone, Debug, Error)]
#[error("invalid tree path {0:?}")]
pub struct InvalidTreePathError(String);

/// A tree of arrays.
///
/// Arrays are keyed by their tree path, a `/` separated sequence of names such as `params/dense/kernel`.
/// Iteration is in sorted path order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref)]
pub struct ArrayTree(BTreeMap<String, Array>);

impl ArrayTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a tree path.
    ///
    /// A path is valid if it is non-empty and every `/` separated component is non-empty and not `.` or `..`.
    #[must_use]
    pub fn validate_path(path: &str) -> bool {
        !path.is_empty()
            && path
                .split('/')
                .all(|name| !name.is_empty() && name != "." && name != "..")
    }

    /// Insert `array` at `path`, returning the array previously held at `path`.
    ///
    /// # Errors
    /// Returns an [`InvalidTreePathError`] if `path` is not valid.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        array: Array,
    ) -> Result<Option<Array>, InvalidTreePathError> {
        let path = path.into();
        if Self::validate_path(&path) {
            Ok(self.0.insert(path, array))
        } else {
            Err(InvalidTreePathError(path))
        }
    }

    /// Insert `array` at `path`.
    ///
    /// # Errors
    /// Returns an [`InvalidTreePathError`] if `path` is not valid.
    pub fn with_array(
        mut self,
        path: impl Into<String>,
        array: Array,
    ) -> Result<Self, InvalidTreePathError> {
        self.insert(path, array)?;
        Ok(self)
    }

    /// Remove the array at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Array> {
        self.0.remove(path)
    }
}

impl IntoIterator for ArrayTree {
    type Item = (String, Array);
    type IntoIter = std::collections::btree_map::IntoIter<String, Array>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArrayTree {
    type Item = (&'a String, &'a Array);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Array>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
