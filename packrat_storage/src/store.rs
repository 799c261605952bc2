//! Stores included with `packrat_storage`.

mod memory_store;
pub use memory_store::MemoryStore;
