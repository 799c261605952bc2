use packrat_chunk_grid::ArraySubset;

use super::ArrayError;

/// Extract the bytes of `subset` from the C-order bytes of an array with shape `array_shape`.
///
/// # Errors
/// Returns an [`ArrayError`] if `subset` is not within `array_shape` or `bytes` has an unexpected length.
pub(crate) fn extract_subset_bytes(
    bytes: &[u8],
    array_shape: &[u64],
    element_size: usize,
    subset: &ArraySubset,
) -> Result<Vec<u8>, ArrayError> {
    validate_length(bytes.len(), array_shape, element_size)?;
    let contiguous = subset.contiguous_linearised_indices(array_shape)?;
    let run_len = usize::try_from(contiguous.contiguous_elements())
        .map_err(|_| ArrayError::ShapeOverflow)?
        * element_size;
    let mut out = Vec::with_capacity(run_len * contiguous.len());
    for (index, _) in &contiguous {
        let start = offset(index, element_size)?;
        out.extend_from_slice(&bytes[start..start + run_len]);
    }
    Ok(out)
}

/// Write the C-order `subset_bytes` of `subset` into the C-order bytes of an array with shape `array_shape`.
///
/// # Errors
/// Returns an [`ArrayError`] if `subset` is not within `array_shape` or either buffer has an unexpected length.
pub(crate) fn update_subset_bytes(
    bytes: &mut [u8],
    array_shape: &[u64],
    element_size: usize,
    subset: &ArraySubset,
    subset_bytes: &[u8],
) -> Result<(), ArrayError> {
    validate_length(bytes.len(), array_shape, element_size)?;
    validate_length(subset_bytes.len(), subset.shape(), element_size)?;
    let contiguous = subset.contiguous_linearised_indices(array_shape)?;
    let run_len = usize::try_from(contiguous.contiguous_elements())
        .map_err(|_| ArrayError::ShapeOverflow)?
        * element_size;
    for ((index, _), chunk) in std::iter::zip(&contiguous, subset_bytes.chunks_exact(run_len.max(1)))
    {
        let start = offset(index, element_size)?;
        bytes[start..start + run_len].copy_from_slice(chunk);
    }
    Ok(())
}

/// Returns the number of bytes held by an array of `shape` with `element_size` byte elements.
///
/// # Errors
/// Returns [`ArrayError::ShapeOverflow`] if the size does not fit in memory.
pub(crate) fn bytes_len(shape: &[u64], element_size: usize) -> Result<usize, ArrayError> {
    shape
        .iter()
        .try_fold(element_size, |acc, &dim| {
            usize::try_from(dim).ok().and_then(|dim| acc.checked_mul(dim))
        })
        .ok_or(ArrayError::ShapeOverflow)
}

fn validate_length(len: usize, shape: &[u64], element_size: usize) -> Result<(), ArrayError> {
    let expected_len = bytes_len(shape, element_size)?;
    if len == expected_len {
        Ok(())
    } else {
        Err(ArrayError::InvalidBytesLength { len, expected_len })
    }
}

fn offset(index: u64, element_size: usize) -> Result<usize, ArrayError> {
    usize::try_from(index)
        .ok()
        .and_then(|index| index.checked_mul(element_size))
        .ok_or(ArrayError::ShapeOverflow)
}
