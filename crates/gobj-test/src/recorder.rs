//! Recorder - a class that journals every hook and action it receives
//!
//! Instances of a recorder class append one [`Entry`] per invocation to a
//! shared [`Journal`], so a test can assert on the exact order in which
//! the runtime called into its objects.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use gobj_core::{
    AttrDesc, AttrFlags, ClassFlags, DataType, EventFlags, GObjId, GObjResult, Kw, EV_STATE_CHANGED,
};
use gobj_runtime::{on, GClass, Runtime, Transition};
use gobj_time::{EV_TIMEOUT, EV_TIMEOUT_PERIODIC};

pub const ST_IDLE: &str = "ST_IDLE";
pub const ST_BUSY: &str = "ST_BUSY";

/// Handled in every state; the action returns the payload's `ret` field
pub const EV_PING: &str = "EV_PING";
/// Moves `ST_IDLE` to `ST_BUSY`
pub const EV_WORK: &str = "EV_WORK";
/// Moves `ST_BUSY` back to `ST_IDLE`
pub const EV_DONE: &str = "EV_DONE";
/// Output event, journaled when received
pub const EV_REPORT: &str = "EV_REPORT";
/// Output event that never warns when unheard, journaled when received
pub const EV_QUIET: &str = "EV_QUIET";

/// What was invoked
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hook {
    Create,
    Writing(String),
    Start,
    Stop,
    Play,
    Pause,
    Destroy,
    ChildAdded(String),
    ChildRemoved(String),
    /// Action run for an event
    Action(String),
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Create => f.write_str("create"),
            Hook::Writing(path) => write!(f, "writing {path}"),
            Hook::Start => f.write_str("start"),
            Hook::Stop => f.write_str("stop"),
            Hook::Play => f.write_str("play"),
            Hook::Pause => f.write_str("pause"),
            Hook::Destroy => f.write_str("destroy"),
            Hook::ChildAdded(child) => write!(f, "child_added {child}"),
            Hook::ChildRemoved(child) => write!(f, "child_removed {child}"),
            Hook::Action(event) => write!(f, "action {event}"),
        }
    }
}

/// One journal line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Instance name at the time of the call
    pub gobj: String,
    pub hook: Hook,
    /// Payload of actions, empty for hooks
    pub kw: Kw,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.gobj, self.hook)
    }
}

/// Shared, ordered log of invocations
#[derive(Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<Entry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    fn push(&self, rt: &Runtime, id: GObjId, hook: Hook, kw: Kw) {
        let gobj = rt.name(id).unwrap_or("<destroyed>").to_string();
        self.entries.borrow_mut().push(Entry { gobj, hook, kw });
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.borrow().clone()
    }

    /// Entries rendered as `name: hook`
    pub fn lines(&self) -> Vec<String> {
        self.entries.borrow().iter().map(Entry::to_string).collect()
    }

    /// Drain the journal
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.borrow_mut())
            .iter()
            .map(Entry::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn count(&self, gobj: &str, hook: &Hook) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.gobj == gobj && &e.hook == hook)
            .count()
    }

    /// Index of the first `gobj: hook` line
    pub fn position(&self, gobj: &str, hook: &Hook) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|e| e.gobj == gobj && &e.hook == hook)
    }

    /// Actions received by `gobj`, as `(event, payload)`
    pub fn received(&self, gobj: &str) -> Vec<(String, Kw)> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.gobj == gobj)
            .filter_map(|e| match &e.hook {
                Hook::Action(event) => Some((event.clone(), e.kw.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Build a recorder class named `name`.
///
/// States `ST_IDLE` and `ST_BUSY`; inputs `EV_PING`, `EV_WORK`, `EV_DONE`,
/// `EV_STATE_CHANGED` and the timer timeouts; outputs `EV_REPORT` and
/// `EV_QUIET`. The `label` string attribute is writable and persistent,
/// `count` is a stats counter.
pub fn recorder_class(name: &str, flags: ClassFlags, journal: &Journal) -> GObjResult<GClass> {
    let action = |event: &'static str, journal: &Journal| {
        let journal = journal.clone();
        on(event, move |rt, id, event, kw, _src| {
            journal.push(rt, id, Hook::Action(event.to_string()), kw.clone());
            kw.get("ret").and_then(|v| v.as_i64()).unwrap_or(0) as i32
        })
    };
    let hook = |journal: &Journal, hook: Hook| {
        let journal = journal.clone();
        move |rt: &mut Runtime, id: GObjId| journal.push(rt, id, hook.clone(), Kw::new())
    };
    let status = |journal: &Journal, h: Hook| {
        let record = hook(journal, h);
        move |rt: &mut Runtime, id: GObjId| {
            record(rt, id);
            0
        }
    };
    let (j_write, j_added, j_removed) = (journal.clone(), journal.clone(), journal.clone());

    GClass::builder(name)
        .description("Journals every hook and action")
        .flags(flags)
        .attrs([
            AttrDesc::new(
                DataType::String,
                "label",
                AttrFlags::RD | AttrFlags::WR | AttrFlags::PERSIST,
                "Free text",
            ),
            AttrDesc::new(DataType::Integer, "count", AttrFlags::RSTATS, "Events received"),
        ])
        .event(EV_PING, EventFlags::NONE)
        .event(EV_WORK, EventFlags::NONE)
        .event(EV_DONE, EventFlags::NONE)
        .event(EV_STATE_CHANGED, EventFlags::NONE)
        .event(EV_TIMEOUT, EventFlags::NONE)
        .event(EV_TIMEOUT_PERIODIC, EventFlags::NONE)
        .event(EV_REPORT, EventFlags::OUTPUT)
        .event(EV_QUIET, EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS)
        .state(
            ST_IDLE,
            [
                action(EV_PING, journal),
                action(EV_WORK, journal).to(ST_BUSY),
                action(EV_STATE_CHANGED, journal),
                action(EV_TIMEOUT, journal),
                action(EV_TIMEOUT_PERIODIC, journal),
                action(EV_REPORT, journal),
                action(EV_QUIET, journal),
            ],
        )
        .state(
            ST_BUSY,
            [
                action(EV_PING, journal),
                action(EV_DONE, journal).to(ST_IDLE),
                Transition::new(EV_STATE_CHANGED),
                action(EV_TIMEOUT, journal),
                action(EV_TIMEOUT_PERIODIC, journal),
                action(EV_REPORT, journal),
                action(EV_QUIET, journal),
            ],
        )
        .on_create(hook(journal, Hook::Create))
        .on_writing(move |rt, id, path| j_write.push(rt, id, Hook::Writing(path.to_string()), Kw::new()))
        .on_start(status(journal, Hook::Start))
        .on_stop(status(journal, Hook::Stop))
        .on_play(status(journal, Hook::Play))
        .on_pause(status(journal, Hook::Pause))
        .on_destroy(hook(journal, Hook::Destroy))
        .on_child_added(move |rt, parent, child| {
            let child = rt.name(child).unwrap_or("").to_string();
            j_added.push(rt, parent, Hook::ChildAdded(child), Kw::new());
            0
        })
        .on_child_removed(move |rt, parent, child| {
            let child = rt.name(child).unwrap_or("").to_string();
            j_removed.push(rt, parent, Hook::ChildRemoved(child), Kw::new());
            0
        })
        .build()
}

/// Register a recorder class in `rt`
pub fn register_recorder(rt: &mut Runtime, name: &str, flags: ClassFlags, journal: &Journal) -> GObjResult<()> {
    rt.register_class(recorder_class(name, flags, journal)?)?;
    Ok(())
}
