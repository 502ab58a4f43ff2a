//! Class descriptors
//!
//! A [`GClass`] bundles the attribute schema, the event-type table, the
//! state table and the lifecycle hooks of a class. The state table is
//! compiled once by [`GClassBuilder::build`] into per-state maps keyed by
//! event name, so dispatch is a direct lookup.

use std::any::Any;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use gobj_core::{
    AttrDesc, ClassFlags, EventFlags, EventType, GObjError, GObjId, GObjResult, Kw, StateChanged,
};
use gobj_state::AttrSchema;

use crate::{Runtime, Subscription};

/// State-table action: `(runtime, gobj, event, kw, src) -> status`
pub type ActionFn = Box<dyn Fn(&mut Runtime, GObjId, &str, &mut Kw, Option<GObjId>) -> i32>;
/// start/stop/play/pause hooks
pub type LifecycleFn = Box<dyn Fn(&mut Runtime, GObjId) -> i32>;
/// create/destroy hooks
pub type NotifyFn = Box<dyn Fn(&mut Runtime, GObjId)>;
/// writing hook, receives the attribute path written
pub type WritingFn = Box<dyn Fn(&mut Runtime, GObjId, &str)>;
/// child_added/child_removed hooks: `(runtime, parent, child)`
pub type ChildFn = Box<dyn Fn(&mut Runtime, GObjId, GObjId) -> i32>;
pub type StateChangedFn = Box<dyn Fn(&mut Runtime, GObjId, &StateChanged) -> i32>;
/// subscription_added/subscription_deleted hooks, called on the publisher
pub type SubscriptionFn = Box<dyn Fn(&mut Runtime, GObjId, &Subscription) -> i32>;
/// Per-subscriber publication veto: `(runtime, publisher, event, kw, subscriber)`
pub type PublicationFilterFn = Box<dyn Fn(&mut Runtime, GObjId, &str, &Kw, GObjId) -> bool>;
pub type PrivateInitFn = Box<dyn Fn() -> Box<dyn Any>>;

/// Lifecycle hook table
#[derive(Default)]
pub struct GClassHooks {
    pub create: Option<NotifyFn>,
    pub writing: Option<WritingFn>,
    pub start: Option<LifecycleFn>,
    pub stop: Option<LifecycleFn>,
    pub play: Option<LifecycleFn>,
    pub pause: Option<LifecycleFn>,
    pub destroy: Option<NotifyFn>,
    pub child_added: Option<ChildFn>,
    pub child_removed: Option<ChildFn>,
    pub state_changed: Option<StateChangedFn>,
    pub inject_event: Option<ActionFn>,
    pub subscription_added: Option<SubscriptionFn>,
    pub subscription_deleted: Option<SubscriptionFn>,
    pub publication_filter: Option<PublicationFilterFn>,
}

/// One `(event, action, next-state)` entry of a state
pub struct Transition {
    pub event: &'static str,
    action: Option<ActionFn>,
    next_state: Option<&'static str>,
}

impl Transition {
    /// Entry without action
    pub fn new(event: &'static str) -> Self {
        Transition {
            event,
            action: None,
            next_state: None,
        }
    }

    /// Transition to `state` after the action returns
    pub fn to(mut self, state: &'static str) -> Self {
        self.next_state = Some(state);
        self
    }
}

/// Entry running `action` on `event`
pub fn on<F>(event: &'static str, action: F) -> Transition
where
    F: Fn(&mut Runtime, GObjId, &str, &mut Kw, Option<GObjId>) -> i32 + 'static,
{
    Transition {
        event,
        action: Some(Box::new(action)),
        next_state: None,
    }
}

/// Compiled state-table entry
pub struct Action {
    pub(crate) action: Option<ActionFn>,
    pub(crate) next_state: Option<usize>,
}

impl Action {
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn next_state(&self) -> Option<usize> {
        self.next_state
    }
}

struct State {
    name: &'static str,
    /// Event names in declaration order
    events: Vec<&'static str>,
    actions: HashMap<&'static str, Action>,
}

/// Registered class descriptor
pub struct GClass {
    name: String,
    description: String,
    flags: ClassFlags,
    schema: Arc<AttrSchema>,
    event_types: Vec<EventType>,
    event_index: HashMap<&'static str, usize>,
    states: Vec<State>,
    state_index: HashMap<&'static str, usize>,
    pub(crate) hooks: GClassHooks,
    pub(crate) private_init: Option<PrivateInitFn>,
    command_table: Option<Value>,
    authz_table: Option<Value>,
    instances: Cell<usize>,
}

impl GClass {
    pub fn builder(name: &str) -> GClassBuilder {
        GClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    pub fn schema(&self) -> &Arc<AttrSchema> {
        &self.schema
    }

    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    pub fn event_type(&self, event: &str) -> Option<&EventType> {
        self.event_index.get(event).map(|&i| &self.event_types[i])
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.event_index.contains_key(event)
    }

    /// Declared and accepted as input
    pub fn has_input_event(&self, event: &str) -> bool {
        self.event_type(event).map_or(false, |ev| !ev.flags.is_output())
    }

    /// Declared as output or system event, or the class does not check
    pub fn can_publish(&self, event: &str) -> bool {
        if self.flags.contains(ClassFlags::NO_CHECK_OUTPUT_EVENTS) {
            return true;
        }
        self.event_type(event)
            .map_or(false, |ev| ev.flags.intersects(EventFlags::OUTPUT | EventFlags::SYSTEM))
    }

    /// State names in declaration order; the first one is the initial state
    pub fn state_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.states.iter().map(|s| s.name)
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.state_index.get(state).copied()
    }

    pub fn state_name(&self, index: usize) -> &'static str {
        self.states.get(index).map_or("", |s| s.name)
    }

    /// Events with an entry in `state`, in declaration order
    pub fn state_events(&self, index: usize) -> &[&'static str] {
        self.states.get(index).map_or(&[], |s| s.events.as_slice())
    }

    pub fn action(&self, state: usize, event: &str) -> Option<&Action> {
        self.states.get(state)?.actions.get(event)
    }

    pub fn hooks(&self) -> &GClassHooks {
        &self.hooks
    }

    /// Opaque command table, for command collaborators
    pub fn command_table(&self) -> Option<&Value> {
        self.command_table.as_ref()
    }

    /// Opaque authorization table, for authorization collaborators
    pub fn authz_table(&self) -> Option<&Value> {
        self.authz_table.as_ref()
    }

    /// Live instances of this class
    pub fn instances(&self) -> usize {
        self.instances.get()
    }

    pub(crate) fn inc_instances(&self) {
        self.instances.set(self.instances.get() + 1);
    }

    pub(crate) fn dec_instances(&self) {
        self.instances.set(self.instances.get().saturating_sub(1));
    }
}

impl fmt::Debug for GClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GClass")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("attrs", &self.schema.len())
            .field("events", &self.event_types.len())
            .field("states", &self.states.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("instances", &self.instances.get())
            .finish()
    }
}

/// Class names may not contain the full-name separators or dots
pub fn check_class_name(name: &str) -> GObjResult<()> {
    if name.is_empty() || name.contains(['`', '^', '.']) {
        return Err(GObjError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Builder for [`GClass`]
pub struct GClassBuilder {
    name: String,
    description: String,
    flags: ClassFlags,
    attrs: Vec<AttrDesc>,
    event_types: Vec<EventType>,
    states: Vec<(&'static str, Vec<Transition>)>,
    hooks: GClassHooks,
    private_init: Option<PrivateInitFn>,
    command_table: Option<Value>,
    authz_table: Option<Value>,
}

impl GClassBuilder {
    pub fn new(name: &str) -> Self {
        GClassBuilder {
            name: name.to_string(),
            description: String::new(),
            flags: ClassFlags::NONE,
            attrs: Vec::new(),
            event_types: Vec::new(),
            states: Vec::new(),
            hooks: GClassHooks::default(),
            private_init: None,
            command_table: None,
            authz_table: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn attr(mut self, desc: AttrDesc) -> Self {
        self.attrs.push(desc);
        self
    }

    pub fn attrs(mut self, descs: impl IntoIterator<Item = AttrDesc>) -> Self {
        self.attrs.extend(descs);
        self
    }

    pub fn event(mut self, name: &'static str, flags: EventFlags) -> Self {
        self.event_types.push(EventType::new(name, flags));
        self
    }

    /// Add a state. The first state added is the initial state.
    pub fn state(mut self, name: &'static str, transitions: impl IntoIterator<Item = Transition>) -> Self {
        self.states.push((name, transitions.into_iter().collect()));
        self
    }

    /// Private data constructor, run once per instance before the create hook
    pub fn private_data<T, F>(mut self, init: F) -> Self
    where
        T: Any,
        F: Fn() -> T + 'static,
    {
        self.private_init = Some(Box::new(move || Box::new(init()) as Box<dyn Any>));
        self
    }

    pub fn command_table(mut self, table: Value) -> Self {
        self.command_table = Some(table);
        self
    }

    pub fn authz_table(mut self, table: Value) -> Self {
        self.authz_table = Some(table);
        self
    }

    pub fn on_create(mut self, f: impl Fn(&mut Runtime, GObjId) + 'static) -> Self {
        self.hooks.create = Some(Box::new(f));
        self
    }

    pub fn on_writing(mut self, f: impl Fn(&mut Runtime, GObjId, &str) + 'static) -> Self {
        self.hooks.writing = Some(Box::new(f));
        self
    }

    pub fn on_start(mut self, f: impl Fn(&mut Runtime, GObjId) -> i32 + 'static) -> Self {
        self.hooks.start = Some(Box::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl Fn(&mut Runtime, GObjId) -> i32 + 'static) -> Self {
        self.hooks.stop = Some(Box::new(f));
        self
    }

    pub fn on_play(mut self, f: impl Fn(&mut Runtime, GObjId) -> i32 + 'static) -> Self {
        self.hooks.play = Some(Box::new(f));
        self
    }

    pub fn on_pause(mut self, f: impl Fn(&mut Runtime, GObjId) -> i32 + 'static) -> Self {
        self.hooks.pause = Some(Box::new(f));
        self
    }

    pub fn on_destroy(mut self, f: impl Fn(&mut Runtime, GObjId) + 'static) -> Self {
        self.hooks.destroy = Some(Box::new(f));
        self
    }

    pub fn on_child_added(mut self, f: impl Fn(&mut Runtime, GObjId, GObjId) -> i32 + 'static) -> Self {
        self.hooks.child_added = Some(Box::new(f));
        self
    }

    pub fn on_child_removed(mut self, f: impl Fn(&mut Runtime, GObjId, GObjId) -> i32 + 'static) -> Self {
        self.hooks.child_removed = Some(Box::new(f));
        self
    }

    pub fn on_state_changed(mut self, f: impl Fn(&mut Runtime, GObjId, &StateChanged) -> i32 + 'static) -> Self {
        self.hooks.state_changed = Some(Box::new(f));
        self
    }

    pub fn on_inject_event(
        mut self,
        f: impl Fn(&mut Runtime, GObjId, &str, &mut Kw, Option<GObjId>) -> i32 + 'static,
    ) -> Self {
        self.hooks.inject_event = Some(Box::new(f));
        self
    }

    pub fn on_subscription_added(mut self, f: impl Fn(&mut Runtime, GObjId, &Subscription) -> i32 + 'static) -> Self {
        self.hooks.subscription_added = Some(Box::new(f));
        self
    }

    pub fn on_subscription_deleted(
        mut self,
        f: impl Fn(&mut Runtime, GObjId, &Subscription) -> i32 + 'static,
    ) -> Self {
        self.hooks.subscription_deleted = Some(Box::new(f));
        self
    }

    pub fn on_publication_filter(
        mut self,
        f: impl Fn(&mut Runtime, GObjId, &str, &Kw, GObjId) -> bool + 'static,
    ) -> Self {
        self.hooks.publication_filter = Some(Box::new(f));
        self
    }

    /// Validate the descriptor and compile its state table
    pub fn build(self) -> GObjResult<GClass> {
        check_class_name(&self.name)?;
        let gclass = self.name.clone();
        let invalid = |reason: String| GObjError::InvalidClass {
            gclass: gclass.clone(),
            reason,
        };

        let schema = AttrSchema::new(self.attrs).map_err(|e| invalid(format!("attribute schema: {e}")))?;

        let mut event_index = HashMap::with_capacity(self.event_types.len());
        for (i, ev) in self.event_types.iter().enumerate() {
            if ev.name.is_empty() {
                return Err(invalid("empty event name".into()));
            }
            if event_index.insert(ev.name, i).is_some() {
                return Err(invalid(format!("event {} declared twice", ev.name)));
            }
        }

        if self.states.is_empty() {
            return Err(invalid("no states".into()));
        }
        let mut state_index = HashMap::with_capacity(self.states.len());
        for (i, (name, _)) in self.states.iter().enumerate() {
            if name.is_empty() {
                return Err(invalid("empty state name".into()));
            }
            if state_index.insert(*name, i).is_some() {
                return Err(invalid(format!("state {name} declared twice")));
            }
        }

        let mut used: HashSet<&'static str> = HashSet::new();
        let mut states = Vec::with_capacity(self.states.len());
        for (name, transitions) in self.states {
            let mut events = Vec::with_capacity(transitions.len());
            let mut actions = HashMap::with_capacity(transitions.len());
            for tr in transitions {
                if !event_index.contains_key(tr.event) {
                    return Err(invalid(format!("state {name}: event {} not declared", tr.event)));
                }
                let next_state = match tr.next_state {
                    Some(next) => Some(
                        state_index
                            .get(next)
                            .copied()
                            .ok_or_else(|| invalid(format!("state {name}: next state {next} not declared")))?,
                    ),
                    None => None,
                };
                let action = Action {
                    action: tr.action,
                    next_state,
                };
                if actions.insert(tr.event, action).is_some() {
                    return Err(invalid(format!("state {name}: event {} repeated", tr.event)));
                }
                events.push(tr.event);
                used.insert(tr.event);
            }
            states.push(State { name, events, actions });
        }

        if self.hooks.inject_event.is_none() {
            if let Some(unused) = self
                .event_types
                .iter()
                .find(|ev| !ev.flags.is_output() && !used.contains(ev.name))
            {
                return Err(invalid(format!("input event {} not used in any state", unused.name)));
            }
        }

        Ok(GClass {
            name: self.name,
            description: self.description,
            flags: self.flags,
            schema: Arc::new(schema),
            event_types: self.event_types,
            event_index,
            states,
            state_index,
            hooks: self.hooks,
            private_init: self.private_init,
            command_table: self.command_table,
            authz_table: self.authz_table,
            instances: Cell::new(0),
        })
    }
}
