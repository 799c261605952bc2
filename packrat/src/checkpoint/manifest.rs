//! The checkpoint manifest.
//!
//! The manifest is the ordered index of every chunk in a checkpoint.
//! It is stored as pretty printed JSON in `manifest.json` at the root of the checkpoint.
//!
//! ### Example
//! ```json
//! {
//!   "format_version": 1,
//!   "arrays": [
//!     {
//!       "name": "params/w",
//!       "shape": [4, 3],
//!       "data_type": "float32",
//!       "chunk_shape": [2, 3],
//!       "num_chunks": 2,
//!       "codecs": [{ "name": "bytes", "configuration": { "endian": "little" } }]
//!     }
//!   ],
//!   "files": [{ "id": 0, "size": 48 }],
//!   "entries": [
//!     { "array": "params/w", "chunk": [0, 0], "file": 0, "offset": 0, "length": 24 },
//!     { "array": "params/w", "chunk": [1, 0], "file": 0, "offset": 24, "length": 24 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ChunkKey, ReadError};
use crate::array::{ArrayShape, DataType};
use crate::codec::CodecMetadata;

/// The manifest format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// The key of the manifest relative to the checkpoint prefix.
pub const MANIFEST_KEY: &str = "manifest.json";

/// The key of the commit marker relative to the checkpoint prefix.
pub const COMMIT_MARKER_KEY: &str = "commit_success.txt";

/// The name of the prefix holding the backing data files relative to the checkpoint prefix.
pub const DATA_PREFIX: &str = "d";

/// A sealed backing data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// The sequence number of the file.
    pub id: u64,
    /// The size of the file in bytes.
    pub size: u64,
}

impl DataFile {
    /// Return the name of the file with sequence number `id`, e.g. `00000003.data`.
    #[must_use]
    pub fn name(id: u64) -> String {
        format!("{id:08}.data")
    }
}

/// The location of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// The chunk key.
    #[serde(flatten)]
    pub chunk_key: ChunkKey,
    /// The sequence number of the backing data file holding the chunk.
    pub file: u64,
    /// The byte offset of the chunk in the file.
    pub offset: u64,
    /// The encoded length of the chunk in bytes.
    pub length: u64,
}

/// The record of one array.
///
/// Arrays without chunks still have a record so their shape round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayRecord {
    /// The tree path of the array.
    pub name: String,
    /// The array shape.
    pub shape: ArrayShape,
    /// The data type.
    pub data_type: DataType,
    /// The (unclipped) chunk shape.
    pub chunk_shape: Vec<u64>,
    /// The number of chunks.
    pub num_chunks: u64,
    /// The codec chain applied to every chunk.
    pub codecs: Vec<CodecMetadata>,
}

/// A checkpoint manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The manifest format version.
    pub format_version: u32,
    /// True if the checkpoint is only complete once the commit marker exists.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub commit_marker: bool,
    /// The array records, sorted by name.
    pub arrays: Vec<ArrayRecord>,
    /// The sealed backing data files in creation order.
    pub files: Vec<DataFile>,
    /// The chunk entries in canonical order.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Create a new manifest.
    #[must_use]
    pub fn new(
        arrays: Vec<ArrayRecord>,
        files: Vec<DataFile>,
        entries: Vec<ManifestEntry>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            commit_marker: false,
            arrays,
            files,
            entries,
        }
    }

    /// Serialize the manifest to pretty printed JSON.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Deserialize and validate a manifest.
    ///
    /// # Errors
    /// Returns [`ReadError::InvalidManifest`] if the manifest cannot be parsed, has an unsupported format version, or is inconsistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|err| ReadError::InvalidManifest(err.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Return the record of the array `name`.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&ArrayRecord> {
        self.arrays.iter().find(|array| array.name == name)
    }

    /// Return the entries of the array `name`.
    pub fn entries_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ManifestEntry> {
        // entries are sorted by array name
        let start = self
            .entries
            .partition_point(|entry| entry.chunk_key.array() < name);
        self.entries[start..]
            .iter()
            .take_while(move |entry| entry.chunk_key.array() == name)
    }

    /// Return the total size of the backing data files.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }

    fn validate(&self) -> Result<(), ReadError> {
        let invalid = |message: String| Err(ReadError::InvalidManifest(message));
        if self.format_version != FORMAT_VERSION {
            return invalid(format!(
                "unsupported format version {}, expected {FORMAT_VERSION}",
                self.format_version
            ));
        }
        if !self.entries.windows(2).all(|w| w[0].chunk_key < w[1].chunk_key) {
            return invalid("entries are not in canonical order".to_string());
        }

        let file_sizes: BTreeMap<u64, u64> =
            self.files.iter().map(|file| (file.id, file.size)).collect();
        let mut entries_per_array: BTreeMap<&str, u64> = BTreeMap::new();
        // chunks of a file are appended in canonical order
        let mut file_ends: BTreeMap<u64, u64> = BTreeMap::new();
        for entry in &self.entries {
            *entries_per_array.entry(entry.chunk_key.array()).or_default() += 1;
            if entry.length == 0 {
                continue;
            }
            let end = entry.offset.checked_add(entry.length);
            match (file_sizes.get(&entry.file), end) {
                (Some(&size), Some(end)) if end <= size => {
                    let file_end = file_ends.entry(entry.file).or_default();
                    if entry.offset < *file_end {
                        return invalid(format!(
                            "chunk {} overlaps a preceding chunk of data file {}",
                            entry.chunk_key,
                            DataFile::name(entry.file)
                        ));
                    }
                    *file_end = end;
                }
                _ => {
                    return invalid(format!(
                        "chunk {} is outside of data file {}",
                        entry.chunk_key,
                        DataFile::name(entry.file)
                    ))
                }
            }
        }

        for array in &self.arrays {
            if array.shape.len() != array.chunk_shape.len() || array.chunk_shape.contains(&0) {
                return invalid(format!("array {} has an invalid chunk shape", array.name));
            }
            let count = entries_per_array.remove(array.name.as_str()).unwrap_or_default();
            if count != array.num_chunks {
                return invalid(format!(
                    "array {} has {count} entries, expected {}",
                    array.name, array.num_chunks
                ));
            }
        }
        if let Some((name, _)) = entries_per_array.into_iter().next() {
            return invalid(format!("entries reference unknown array {name}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        let record = |name: &str, num_chunks| ArrayRecord {
            name: name.to_string(),
            shape: vec![4, 3],
            data_type: DataType::Float32,
            chunk_shape: vec![2, 3],
            num_chunks,
            codecs: vec![],
        };
        let entry = |array: &str, chunk, file, offset| ManifestEntry {
            chunk_key: ChunkKey::new(array, vec![chunk, 0]),
            file,
            offset,
            length: 24,
        };
        Manifest::new(
            vec![record("a", 2), record("b", 2), record("empty", 0)],
            vec![
                DataFile { id: 0, size: 48 },
                DataFile { id: 1, size: 48 },
            ],
            vec![
                entry("a", 0, 0, 0),
                entry("a", 1, 0, 24),
                entry("b", 0, 1, 0),
                entry("b", 1, 1, 24),
            ],
        )
    }

    #[test]
    fn manifest_round_trip() {
        let manifest = manifest();
        let bytes = manifest.to_bytes().unwrap();
        let json = String::from_utf8(bytes.clone()).unwrap();
        assert!(json.starts_with("{\n  \"format_version\": 1,\n  \"arrays\""));
        assert!(json.contains(r#""array": "a","#));
        assert!(!json.contains("commit_marker"));
        assert_eq!(Manifest::from_bytes(&bytes).unwrap(), manifest);
        assert_eq!(manifest.data_size(), 96);
    }

    #[test]
    fn manifest_entries_for() {
        let manifest = manifest();
        assert_eq!(manifest.entries_for("a").count(), 2);
        assert_eq!(manifest.entries_for("b").nth(1).unwrap().offset, 24);
        assert_eq!(manifest.entries_for("empty").count(), 0);
        assert_eq!(manifest.entries_for("c").count(), 0);
        assert!(manifest.array("empty").is_some());
        assert!(manifest.array("c").is_none());
    }

    #[test]
    fn manifest_invalid() {
        assert!(matches!(
            Manifest::from_bytes(b"{"),
            Err(ReadError::InvalidManifest(_))
        ));

        let mut manifest = manifest();
        manifest.format_version = 2;
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());

        let mut manifest = self::manifest();
        manifest.entries.swap(0, 1);
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());

        let mut manifest = self::manifest();
        manifest.entries[3].length = 25;
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());

        let mut manifest = self::manifest();
        manifest.entries[1].offset = 12;
        assert!(matches!(
            Manifest::from_bytes(&manifest.to_bytes().unwrap()),
            Err(ReadError::InvalidManifest(message)) if message.contains("overlaps")
        ));

        let mut manifest = self::manifest();
        manifest.entries[0].offset = 24;
        manifest.entries[1].offset = 0;
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());

        let mut manifest = self::manifest();
        manifest.arrays[1].num_chunks = 3;
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());

        let mut manifest = self::manifest();
        manifest.arrays.remove(0);
        assert!(Manifest::from_bytes(&manifest.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn data_file_name() {
        assert_eq!(DataFile::name(0), "00000000.data");
        assert_eq!(DataFile::name(123), "00000123.data");
    }
}
