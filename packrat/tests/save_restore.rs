#![allow(missing_docs)]
#![cfg(all(feature = "filesystem", feature = "crc32c", feature = "gzip"))]

use std::error::Error;
use std::sync::Arc;

use packrat::array::{Array, ArrayTree, DataType};
use packrat::checkpoint::{
    open_array, read_manifest, CommitMode, ReadError, SaveArgs, SaveOptions,
};
use packrat::codec::{bytes::BytesCodec, crc32c::Crc32cCodec, gzip::GzipCodec, CodecChain};
use packrat::filesystem::FilesystemStore;
use packrat::storage::{store::MemoryStore, ListableStorageTraits, ReadableStorageTraits, StorePrefix};

fn tree() -> Result<ArrayTree, Box<dyn Error>> {
    let tree = ArrayTree::new()
        .with_array("params/dense/kernel", Array::from_vec(vec![32, 16], (0..512).map(|i| i as f32 * 0.5).collect())?)?
        .with_array("params/dense/bias", Array::from_vec(vec![16], (0..16).map(f64::from).collect())?)?
        .with_array("params/embed", Array::from_vec(vec![10, 3, 7], (0..210u16).collect())?)?
        .with_array("opt/mask", Array::from_elements(vec![5], &[true, false, true, true, false])?)?
        .with_array("opt/count", Array::from_vec(vec![3, 3], (-4i64..5).collect())?)?
        .with_array("opt/half", Array::from_vec(vec![6], (0..6).map(|i| half::f16::from_f32(i as f32 / 4.0)).collect())?)?
        .with_array("opt/bhalf", Array::from_vec(vec![6], (0..6).map(|i| half::bf16::from_f32(i as f32 * 3.0)).collect())?)?
        .with_array("opt/small", Array::from_vec(vec![2, 2], vec![-1i8, 2, -3, 4])?)?
        .with_array("step", Array::from_elements(vec![], &[1000u64])?)?;
    Ok(tree)
}

#[test]
fn save_restore_memory() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let tree = tree()?;
    let options = SaveOptions::default()
        .with_target_data_file_size(Some(700))
        .with_default_save_args(SaveArgs::default().with_chunk_byte_size(Some(256)))
        .with_save_args("params/embed", SaveArgs::default());
    let summary = packrat::save(store.clone(), "ckpt/1000", tree.clone(), &options)?
        .wait_until_finished()?;
    assert_eq!(summary.mode(), CommitMode::Rename);
    assert_eq!(summary.num_arrays(), 9);
    assert_eq!(summary.prefix().as_str(), "ckpt/1000/");
    assert!(summary.files().iter().all(|file| file.size <= 700));

    // only the published checkpoint remains
    let prefixes = store.list_dir(&StorePrefix::new("ckpt/")?)?;
    assert_eq!(prefixes.prefixes(), &[StorePrefix::new("ckpt/1000/")?]);
    assert!(prefixes.keys().is_empty());

    let restored = packrat::open(&store, "ckpt/1000")?;
    assert_eq!(restored, tree);
    assert_eq!(restored["opt/mask"].to_elements::<bool>()?, vec![true, false, true, true, false]);
    assert_eq!(restored["step"].to_elements::<u64>()?, vec![1000]);

    let manifest = read_manifest(&store, "ckpt/1000")?;
    let embed = manifest.array("params/embed").ok_or("missing record")?;
    assert_eq!(embed.chunk_shape, vec![10, 3, 7]);
    assert_eq!(embed.num_chunks, 1);
    let kernel = manifest.array("params/dense/kernel").ok_or("missing record")?;
    assert_eq!(kernel.chunk_shape, vec![4, 16]);
    assert_eq!(kernel.num_chunks, 8);
    assert_eq!(manifest.data_size(), summary.data_size());
    Ok(())
}

#[test]
fn save_restore_filesystem() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let store = Arc::new(FilesystemStore::new(path.path())?);
    let tree = tree()?;
    let codecs = CodecChain::new(vec![
        Arc::new(BytesCodec::big()),
        Arc::new(GzipCodec::new(5)?),
        Arc::new(Crc32cCodec::new()),
    ])?;
    let options = SaveOptions::default()
        .with_codecs(Arc::new(codecs))
        .with_target_data_file_size(Some(1024))
        .with_default_save_args(SaveArgs::default().with_chunk_byte_size(Some(100)));
    packrat::save(store.clone(), "run/ckpt_1", tree.clone(), &options)?.wait_until_finished()?;

    assert!(path.path().join("run/ckpt_1/manifest.json").is_file());
    assert!(path.path().join("run/ckpt_1/d/00000000.data").is_file());
    assert!(!path.path().join("run/ckpt_1/commit_success.txt").exists());
    let entries: Vec<_> = std::fs::read_dir(path.path().join("run"))?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1);

    // a fresh store sees the same checkpoint
    let store = FilesystemStore::new(path.path())?;
    assert_eq!(packrat::open(&store, "run/ckpt_1")?, tree);
    let manifest = read_manifest(&store, "run/ckpt_1")?;
    assert_eq!(manifest.arrays[0].codecs.len(), 3);
    Ok(())
}

#[test]
fn save_restore_open_array() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    packrat::save(store.clone(), "ckpt", tree()?, &SaveOptions::default())?.wait_until_finished()?;
    let embed = open_array(&store, "ckpt", "params/embed")?;
    assert_eq!(embed.data_type(), DataType::UInt16);
    assert_eq!(embed.shape(), &[10, 3, 7]);
    assert_eq!(embed.to_elements::<u16>()?, (0..210u16).collect::<Vec<_>>());
    assert!(matches!(
        open_array(&store, "ckpt", "params/missing"),
        Err(ReadError::ArrayNotFound(_))
    ));
    assert!(matches!(
        packrat::open(&store, "other"),
        Err(ReadError::MissingManifest(_))
    ));
    assert!(matches!(
        packrat::open(&store, "ckpt/"),
        Err(ReadError::InvalidPath(_))
    ));
    Ok(())
}

#[test]
fn save_restore_zero_length_dimensions() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let tree = ArrayTree::new()
        .with_array("empty", Array::from_vec(vec![3, 0, 2], Vec::<f32>::new())?)?
        .with_array("also_empty", Array::from_vec(vec![0], Vec::<u8>::new())?)?;
    let options = SaveOptions::default()
        .with_default_save_args(SaveArgs::default().with_chunk_byte_size(Some(8)));
    let summary = packrat::save(store.clone(), "ckpt", tree.clone(), &options)?.wait_until_finished()?;
    assert_eq!(summary.num_chunks(), 0);
    assert!(summary.files().is_empty());

    let manifest = read_manifest(&store, "ckpt")?;
    assert_eq!(manifest.arrays.len(), 2);
    assert!(manifest.entries.is_empty());
    assert_eq!(packrat::open(&store, "ckpt")?, tree);
    Ok(())
}

#[test]
fn save_restore_deterministic() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let tree = tree()?;
    for (path, concurrent_target) in [("a", 1), ("b", 3), ("c", 32)] {
        let options = SaveOptions::default()
            .with_concurrent_target(concurrent_target)
            .with_target_data_file_size(Some(300))
            .with_default_save_args(SaveArgs::default().with_chunk_byte_size(Some(64)));
        packrat::save(store.clone(), path, tree.clone(), &options)?.wait_until_finished()?;
    }

    let contents = |path: &str| -> Result<Vec<(String, Vec<u8>)>, Box<dyn Error>> {
        let prefix = StorePrefix::new(format!("{path}/"))?;
        let mut contents = Vec::new();
        for key in store.list_prefix(&prefix)? {
            let name = key.as_str().strip_prefix(prefix.as_str()).unwrap_or_default().to_string();
            contents.push((name, store.get(&key)?.unwrap_or_default().to_vec()));
        }
        Ok(contents)
    };
    let a = contents("a")?;
    assert!(a.len() > 2);
    assert_eq!(a, contents("b")?);
    assert_eq!(a, contents("c")?);
    Ok(())
}

#[test]
fn save_restore_empty_tree() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    packrat::save(store.clone(), "ckpt", ArrayTree::new(), &SaveOptions::default())?
        .wait_until_finished()?;
    assert!(packrat::open(&store, "ckpt")?.is_empty());
    Ok(())
}
