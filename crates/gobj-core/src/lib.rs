//! GObj Core - Fundamental types of the object runtime
//!
//! This crate defines the types shared by every layer of the runtime:
//! - Identifiers (GObjId, SubscriptionId)
//! - Flag sets for attributes, events, classes and instances
//! - The attribute data model (DataType, AttrValue, AttrDesc)
//! - Events, payloads and subscription filters
//! - The error taxonomy

pub mod id;
pub mod flags;
pub mod data;
pub mod event;
pub mod error;

pub use id::*;
pub use flags::*;
pub use data::*;
pub use event::*;
pub use error::*;
