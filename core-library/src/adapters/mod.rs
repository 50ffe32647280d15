//! Storage adapters
//!
//! Converters between in-memory library snapshots and on-disk formats.

pub mod relational;

pub use relational::RelationalAdapter;
