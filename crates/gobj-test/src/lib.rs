//! GObj Test Harness - Journaling classes and end-to-end scenarios
//!
//! This crate provides:
//! - Recorder classes that journal every hook and action they receive
//! - A ready-made world with a runtime, manual clock, timers and storage
//! - End-to-end scenarios over lifecycle, routing, hierarchy and timers

pub mod recorder;
pub mod scenarios;

pub use recorder::*;
pub use scenarios::*;
