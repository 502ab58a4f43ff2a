//! Event definitions
//!
//! Events are named messages. A class declares the names it knows in its
//! event-type table; payloads are open JSON maps ([`Kw`]) except where a
//! concrete type exists ([`StateChanged`]).

use serde_json::{Map, Value};

use crate::EventFlags;

/// Event payload: an open key/value map
pub type Kw = Map<String, Value>;

/// System event published after an effective state change
pub const EV_STATE_CHANGED: &str = "EV_STATE_CHANGED";

/// Entry of a class event-type table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventType {
    pub name: &'static str,
    pub flags: EventFlags,
}

impl EventType {
    pub fn new(name: &'static str, flags: EventFlags) -> Self {
        EventType { name, flags }
    }
}

/// Outcome of a direct send
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran and returned this advisory status
    Handled(i32),
    /// Declared event, no transition in the current state
    NotHandled,
}

impl Dispatch {
    #[inline]
    pub fn is_handled(self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }

    /// Handler status, 0 when not handled
    #[inline]
    pub fn status(self) -> i32 {
        match self {
            Dispatch::Handled(ret) => ret,
            Dispatch::NotHandled => 0,
        }
    }
}

/// Outcome of a publication
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Published {
    /// Subscribers the event was sent to, whether or not they handled it
    pub delivered: usize,
    /// Sum of handler statuses
    pub status: i32,
    /// An `own_event` subscriber returned a negative status and stopped
    /// the fan-out
    pub owned: bool,
}

/// Subscription filter
///
/// `All` is a conjunctive field/value map: every field must be present in
/// the payload with an equal value. `Any` is a disjunction of such maps.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    All(Kw),
    Any(Vec<Kw>),
}

impl Filter {
    /// Build from JSON: an object is `All`, an array of objects is `Any`
    pub fn from_json(value: &Value) -> Option<Filter> {
        match value {
            Value::Object(map) => Some(Filter::All(map.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_object().cloned())
                .collect::<Option<Vec<_>>>()
                .map(Filter::Any),
            _ => None,
        }
    }

    pub fn matches(&self, kw: &Kw) -> bool {
        match self {
            Filter::All(fields) => match_fields(fields, kw),
            Filter::Any(alternatives) => alternatives.iter().any(|fields| match_fields(fields, kw)),
        }
    }
}

fn match_fields(fields: &Kw, kw: &Kw) -> bool {
    fields
        .iter()
        .all(|(key, expected)| kw.get(key).map_or(false, |actual| actual == expected))
}

/// Payload of [`EV_STATE_CHANGED`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateChanged {
    pub previous: String,
    pub current: String,
}

impl StateChanged {
    pub fn to_kw(&self) -> Kw {
        let mut kw = Kw::new();
        kw.insert("previous_state".into(), Value::String(self.previous.clone()));
        kw.insert("current_state".into(), Value::String(self.current.clone()));
        kw
    }

    pub fn from_kw(kw: &Kw) -> Option<Self> {
        Some(StateChanged {
            previous: kw.get("previous_state")?.as_str()?.to_string(),
            current: kw.get("current_state")?.as_str()?.to_string(),
        })
    }
}

/// Build a [`Kw`] from a `serde_json::json!` object literal.
/// Non-object values give an empty map.
pub fn kw_from(value: Value) -> Kw {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
