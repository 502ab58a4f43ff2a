//! GObj State - Attribute storage
//!
//! This crate implements the per-instance attribute layer:
//! - Schema resolution and indexing
//! - Typed reads and writes
//! - JSON config merging with type coercion
//! - Save/restore of persistent attributes through a storage collaborator

pub mod store;
pub mod persist;

pub use store::*;
pub use persist::*;
