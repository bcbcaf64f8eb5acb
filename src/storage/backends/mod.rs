//! Store implementations.
//!
//! - `MemoryStore`: in-process collections of JSON documents, for tests and demos

mod memory;

pub use memory::MemoryStore;
