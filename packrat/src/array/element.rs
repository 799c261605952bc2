use super::DataType;

/// An element error.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ElementError {
    /// Incompatible element type for data type.
    #[error("incompatible element type for data type {0}")]
    IncompatibleElementType(DataType),
    /// Invalid element value.
    #[error("invalid element value")]
    InvalidElementValue,
}

/// A trait representing an array element type.
pub trait Element: Sized + Clone {
    /// The data type of this element type.
    const DATA_TYPE: DataType;

    /// Validate the data type.
    ///
    /// # Errors
    /// Returns an [`ElementError`] if the data type is incompatible with [`Element`].
    fn validate_data_type(data_type: DataType) -> Result<(), ElementError> {
        if data_type == Self::DATA_TYPE {
            Ok(())
        } else {
            Err(ElementError::IncompatibleElementType(data_type))
        }
    }

    /// Convert a slice of elements into native endian bytes.
    fn to_bytes(elements: &[Self]) -> &[u8];

    /// Convert a vector of elements into native endian bytes.
    ///
    /// Avoids an extra copy compared to `to_bytes` when possible.
    fn into_bytes(elements: Vec<Self>) -> Vec<u8>;

    /// Convert native endian bytes into a [`Vec<Element>`].
    ///
    /// # Errors
    /// Returns an [`ElementError`] if the bytes do not hold valid elements.
    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, ElementError>;
}

macro_rules! impl_element_pod {
    ($raw_type:ty, $data_type:expr) => {
        impl Element for $raw_type {
            const DATA_TYPE: DataType = $data_type;

            fn to_bytes(elements: &[Self]) -> &[u8] {
                bytemuck::must_cast_slice(elements)
            }

            fn into_bytes(elements: Vec<Self>) -> Vec<u8> {
                bytemuck::allocation::try_cast_vec(elements)
                    .unwrap_or_else(|(_err, elements)| bytemuck::must_cast_slice(&elements).to_vec())
            }

            fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, ElementError> {
                if bytes.len() % size_of::<Self>() == 0 {
                    Ok(bytemuck::allocation::pod_collect_to_vec(bytes))
                } else {
                    Err(ElementError::InvalidElementValue)
                }
            }
        }
    };
}

impl_element_pod!(i8, DataType::Int8);
impl_element_pod!(i16, DataType::Int16);
impl_element_pod!(i32, DataType::Int32);
impl_element_pod!(i64, DataType::Int64);
impl_element_pod!(u8, DataType::UInt8);
impl_element_pod!(u16, DataType::UInt16);
impl_element_pod!(u32, DataType::UInt32);
impl_element_pod!(u64, DataType::UInt64);
impl_element_pod!(half::f16, DataType::Float16);
impl_element_pod!(half::bf16, DataType::BFloat16);
impl_element_pod!(f32, DataType::Float32);
impl_element_pod!(f64, DataType::Float64);

impl Element for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn to_bytes(elements: &[Self]) -> &[u8] {
        bytemuck::must_cast_slice(elements)
    }

    fn into_bytes(elements: Vec<Self>) -> Vec<u8> {
        elements.into_iter().map(u8::from).collect()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, ElementError> {
        bytes
            .iter()
            .map(|&byte| match byte {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(ElementError::InvalidElementValue),
            })
            .collect()
    }
}
