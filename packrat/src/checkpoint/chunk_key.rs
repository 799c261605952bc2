use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::array::ArrayIndices;

/// The key of a chunk: the tree path of its array and its chunk grid indices.
///
/// Chunk keys are ordered by array name and then lexicographically by chunk indices.
/// This is the canonical order in which chunks are written to backing data files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{array}[{}]", chunk.iter().join(", "))]
pub struct ChunkKey {
    array: String,
    chunk: ArrayIndices,
}

impl ChunkKey {
    /// Create a new chunk key.
    #[must_use]
    pub fn new(array: impl Into<String>, chunk: ArrayIndices) -> Self {
        Self {
            array: array.into(),
            chunk,
        }
    }

    /// Return the tree path of the array.
    #[must_use]
    pub fn array(&self) -> &str {
        &self.array
    }

    /// Return the chunk grid indices.
    #[must_use]
    pub fn chunk_indices(&self) -> &[u64] {
        &self.chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_order() {
        let mut keys = vec![
            ChunkKey::new("b", vec![0, 0]),
            ChunkKey::new("a/x", vec![1, 0]),
            ChunkKey::new("a/x", vec![0, 2]),
            ChunkKey::new("a", vec![3]),
            ChunkKey::new("a/x", vec![0, 10]),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["a[3]", "a/x[0, 2]", "a/x[0, 10]", "a/x[1, 0]", "b[0, 0]"]
        );
    }

    #[test]
    fn chunk_key_serde() {
        let key = ChunkKey::new("params/w", vec![1, 2]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"array":"params/w","chunk":[1,2]}"#);
        assert_eq!(serde_json::from_str::<ChunkKey>(&json).unwrap(), key);
    }
}
