#![allow(missing_docs)]
#![cfg(feature = "filesystem")]

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use packrat::array::{Array, ArrayTree};
use packrat::checkpoint::{read_manifest, SaveArgs, SaveOptions};
use packrat::filesystem::FilesystemStore;

const MIB: u64 = 1024 * 1024;

/// A 4x1024x1024 float32 array, 16 MiB.
fn tree() -> Result<ArrayTree, Box<dyn Error>> {
    let elements: Vec<f32> = (0..4 * 1024 * 1024u32).map(|i| (i % 1000) as f32).collect();
    Ok(ArrayTree::new().with_array("x", Array::from_vec(vec![4, 1024, 1024], elements)?)?)
}

/// The sizes of the data files of the checkpoint at `path`, in name order.
fn data_file_sizes(path: &Path) -> Result<Vec<u64>, Box<dyn Error>> {
    let mut sizes = Vec::new();
    for entry in walkdir::WalkDir::new(path.join("d")).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            sizes.push(entry.metadata()?.len());
        }
    }
    Ok(sizes)
}

fn save(
    store: &Arc<FilesystemStore>,
    path: &str,
    tree: &ArrayTree,
    chunk_byte_size: Option<u64>,
    target_data_file_size: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let options = SaveOptions::default()
        .with_target_data_file_size(target_data_file_size)
        .with_default_save_args(SaveArgs::default().with_chunk_byte_size(chunk_byte_size));
    packrat::save(store.clone(), path, tree.clone(), &options)?.wait_until_finished()?;
    Ok(())
}

#[test]
fn file_size_unchunked_array_is_one_file() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(FilesystemStore::new(dir.path())?);
    let tree = tree()?;
    save(&store, "ckpt", &tree, None, Some(3 * MIB))?;

    // a chunk is never split, so the single 16 MiB chunk overshoots the target
    assert_eq!(data_file_sizes(&dir.path().join("ckpt"))?, vec![16 * MIB]);
    let manifest = read_manifest(&*store, "ckpt")?;
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.arrays[0].chunk_shape, vec![4, 1024, 1024]);
    assert_eq!(packrat::open(&*store, "ckpt")?, tree);
    Ok(())
}

#[test]
fn file_size_chunked_array() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(FilesystemStore::new(dir.path())?);
    let tree = tree()?;
    save(&store, "ckpt", &tree, Some(MIB), Some(2 * MIB))?;

    assert_eq!(data_file_sizes(&dir.path().join("ckpt"))?, vec![2 * MIB; 8]);
    let manifest = read_manifest(&*store, "ckpt")?;
    assert_eq!(manifest.arrays[0].chunk_shape, vec![1, 256, 1024]);
    assert_eq!(manifest.entries.len(), 16);
    assert!(manifest.entries.iter().all(|entry| entry.length == MIB));
    assert_eq!(
        manifest.entries.iter().map(|entry| entry.file).collect::<Vec<_>>(),
        (0..8u64).flat_map(|file| [file, file]).collect::<Vec<_>>()
    );
    assert_eq!(packrat::open(&*store, "ckpt")?, tree);
    Ok(())
}

#[test]
fn file_size_no_target() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(FilesystemStore::new(dir.path())?);
    let tree = tree()?;
    save(&store, "ckpt", &tree, Some(MIB), None)?;
    assert_eq!(data_file_sizes(&dir.path().join("ckpt"))?, vec![16 * MIB]);
    assert_eq!(read_manifest(&*store, "ckpt")?.entries.len(), 16);
    Ok(())
}

#[test]
fn file_size_within_target() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(FilesystemStore::new(dir.path())?);
    let tree = ArrayTree::new()
        .with_array("a", Array::from_vec(vec![100, 37], vec![1u16; 3700])?)?
        .with_array("b", Array::from_vec(vec![5000], vec![2u8; 5000])?)?
        .with_array("c", Array::from_vec(vec![3, 3], vec![3.0f64; 9])?)?;
    let target = 1000;
    save(&store, "ckpt", &tree, Some(300), Some(target))?;

    let manifest = read_manifest(&*store, "ckpt")?;
    let sizes = data_file_sizes(&dir.path().join("ckpt"))?;
    assert_eq!(sizes, manifest.files.iter().map(|file| file.size).collect::<Vec<_>>());
    assert_eq!(sizes.iter().sum::<u64>(), 3700 * 2 + 5000 + 9 * 8);
    for file in &manifest.files {
        let chunks = manifest.entries.iter().filter(|entry| entry.file == file.id).count();
        assert!(file.size <= target || chunks == 1);
    }
    // files are only sealed once the next chunk does not fit
    for (file, next) in manifest.files.iter().zip(manifest.files.iter().skip(1)) {
        let next_first = manifest
            .entries
            .iter()
            .find(|entry| entry.file == next.id && entry.length > 0)
            .ok_or("empty file")?;
        assert!(file.size + next_first.length > target);
    }
    assert_eq!(packrat::open(&*store, "ckpt")?, tree);
    Ok(())
}
