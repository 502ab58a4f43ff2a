//! End-to-end scenarios
//!
//! A [`World`] is a runtime with recorder classes, C_TIMER, a manual clock
//! and an in-memory attribute store already wired, so a scenario only has
//! to build its tree and act.

use std::sync::Arc;
use std::time::Duration;

use gobj_core::{ClassFlags, GObjId, GObjResult, Kw};
use gobj_runtime::{init_logging, Runtime, RuntimeConfig};
use gobj_state::MemoryStore;
use gobj_time::{register_c_timer, ManualClock, TimerDriver};

use crate::recorder::{register_recorder, Journal};

/// Recorder class with no flags
pub const C_REC: &str = "C_REC";
/// Recorder class skipped by `start_tree`
pub const C_REC_MANUAL: &str = "C_REC_MANUAL";

pub struct World {
    pub rt: Runtime,
    pub journal: Journal,
    pub clock: Arc<ManualClock>,
    pub timers: TimerDriver,
    pub store: Arc<MemoryStore>,
}

impl World {
    pub fn new() -> GObjResult<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> GObjResult<Self> {
        init_logging(&config.logging);
        let journal = Journal::new();
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new());
        let mut rt = Runtime::with_config(config);
        rt.set_persistence(store.clone());
        register_recorder(&mut rt, C_REC, ClassFlags::NONE, &journal)?;
        register_recorder(&mut rt, C_REC_MANUAL, ClassFlags::MANUAL_START, &journal)?;
        register_c_timer(&mut rt, clock.clone())?;
        let timers = TimerDriver::new(clock.clone());
        Ok(World {
            rt,
            journal,
            clock,
            timers,
            store,
        })
    }

    /// Create a recorder instance
    pub fn node(&mut self, name: &str, parent: Option<GObjId>) -> GObjResult<GObjId> {
        self.rt.create(name, C_REC, Kw::new(), parent)
    }

    /// Advance the clock and fire what became due
    pub fn elapse(&mut self, dt: Duration) -> usize {
        self.clock.advance(dt);
        self.timers.poll(&mut self.rt)
    }
}
