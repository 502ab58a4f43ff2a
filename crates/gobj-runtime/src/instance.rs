//! Instances and the instance arena
//!
//! Instances live in slots addressed by [`GObjId`]. A slot's generation is
//! bumped when its instance is freed, so stale ids of destroyed instances
//! never resolve to a later occupant of the same slot.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use gobj_core::{GObjFlags, GObjId, SubscriptionId};
use gobj_state::AttrStore;

use crate::GClass;

/// A live instance
pub struct GObj {
    pub(crate) id: GObjId,
    pub(crate) name: String,
    pub(crate) gclass: Rc<GClass>,
    pub(crate) flags: GObjFlags,
    pub(crate) attrs: AttrStore,
    pub(crate) private: Option<Box<dyn Any>>,
    /// Index into the class state table
    pub(crate) state: usize,
    pub(crate) last_state: usize,
    /// Bumped on every effective state change
    pub(crate) state_epoch: u64,
    /// Weak back-reference: identifies the parent, never owns it
    pub(crate) parent: Option<GObjId>,
    pub(crate) children: Vec<GObjId>,
    /// Subscriptions other instances hold on this publisher
    pub(crate) subscriptions: Vec<SubscriptionId>,
    /// Subscriptions this instance holds on publishers
    pub(crate) subscribings: Vec<SubscriptionId>,
    pub(crate) running: bool,
    pub(crate) playing: bool,
    pub(crate) disabled: bool,
    pub(crate) destroying: bool,
}

impl GObj {
    pub(crate) fn new(id: GObjId, name: String, gclass: Rc<GClass>, flags: GObjFlags, attrs: AttrStore) -> Self {
        let private = gclass.private_init.as_ref().map(|init| init());
        GObj {
            id,
            name,
            gclass,
            flags,
            attrs,
            private,
            state: 0,
            last_state: 0,
            state_epoch: 0,
            parent: None,
            children: Vec::new(),
            subscriptions: Vec::new(),
            subscribings: Vec::new(),
            running: false,
            playing: false,
            disabled: false,
            destroying: false,
        }
    }

    pub fn id(&self) -> GObjId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gclass(&self) -> &Rc<GClass> {
        &self.gclass
    }

    pub fn gclass_name(&self) -> &str {
        self.gclass.name()
    }

    pub fn flags(&self) -> GObjFlags {
        self.flags
    }

    /// `gclass^name`
    pub fn short_name(&self) -> String {
        format!("{}^{}", self.gclass.name(), self.name)
    }

    pub fn current_state(&self) -> &'static str {
        self.gclass.state_name(self.state)
    }

    pub fn last_state(&self) -> &'static str {
        self.gclass.state_name(self.last_state)
    }

    pub fn parent(&self) -> Option<GObjId> {
        self.parent
    }

    pub fn children(&self) -> &[GObjId] {
        &self.children
    }

    pub fn attrs(&self) -> &AttrStore {
        &self.attrs
    }

    pub fn subscriptions(&self) -> &[SubscriptionId] {
        &self.subscriptions
    }

    pub fn subscribings(&self) -> &[SubscriptionId] {
        &self.subscribings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_destroying(&self) -> bool {
        self.destroying
    }

    pub fn is_service(&self) -> bool {
        self.flags.is_service()
    }

    pub fn is_pure_child(&self) -> bool {
        self.flags.is_pure_child()
    }
}

impl fmt::Debug for GObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GObj")
            .field("id", &self.id)
            .field("name", &self.short_name())
            .field("state", &self.current_state())
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("running", &self.running)
            .field("playing", &self.playing)
            .finish()
    }
}

struct Slot {
    generation: u32,
    gobj: Option<GObj>,
}

/// Generational slot table holding every live instance
#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    /// Id the next insert will use
    pub(crate) fn next_id(&self) -> GObjId {
        match self.free.last() {
            Some(&index) => GObjId::new(index, self.slots[index as usize].generation),
            None => GObjId::new(self.slots.len() as u32, 0),
        }
    }

    pub(crate) fn insert(&mut self, gobj: GObj) -> GObjId {
        let id = gobj.id;
        debug_assert_eq!(id, self.next_id());
        match self.free.pop() {
            Some(index) => self.slots[index as usize].gobj = Some(gobj),
            None => self.slots.push(Slot {
                generation: 0,
                gobj: Some(gobj),
            }),
        }
        self.live += 1;
        id
    }

    pub(crate) fn get(&self, id: GObjId) -> Option<&GObj> {
        let slot = self.slots.get(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.gobj.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: GObjId) -> Option<&mut GObj> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.gobj.as_mut()
    }

    pub(crate) fn remove(&mut self, id: GObjId) -> Option<GObj> {
        let slot = self.slots.get_mut(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        let gobj = slot.gobj.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(gobj)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &GObj> {
        self.slots.iter().filter_map(|slot| slot.gobj.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}
