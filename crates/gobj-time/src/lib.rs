//! GObj Time - Clocks and the timer class
//!
//! This crate provides time to the object runtime from the outside:
//! - Clock abstraction (system and manual clocks)
//! - The C_TIMER class, whose instances publish timeouts
//! - The timer driver that re-enters the runtime when deadlines pass

pub mod clock;
pub mod timer;

pub use clock::*;
pub use timer::*;
