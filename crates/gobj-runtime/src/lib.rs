//! GObj Runtime - Hierarchical event-driven object runtime
//!
//! This crate implements the object substrate:
//! - Class registry with compiled state tables
//! - Instance arena, creation and lifecycle (start/stop/play/pause/destroy)
//! - Finite-state dispatch of direct sends
//! - Filtered publish/subscribe with symmetric teardown
//! - Parent/child hierarchy and tree-wide operations
//! - Instance trees built from JSON
//!
//! Dispatch is synchronous and single-threaded: `send_event` and
//! `publish_event` return only after every handler they trigger has run.

pub mod class;
pub mod registry;
pub mod instance;
pub mod runtime;
pub mod dispatch;
pub mod router;
pub mod hierarchy;
pub mod tree;
pub mod config;
pub mod telemetry;

pub use class::*;
pub use registry::*;
pub use instance::GObj;
pub use runtime::*;
pub use router::*;
pub use tree::*;
pub use config::*;
pub use telemetry::init_logging;
