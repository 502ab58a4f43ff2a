//! Finite-state dispatcher
//!
//! `send_event` resolves `(current state, event)` in the compiled table of
//! the target's class. Dispatch is synchronous and reentrant: handlers may
//! send and publish, including to the instance being dispatched.

use std::rc::Rc;

use tracing::{debug, error, warn};

use gobj_core::{Dispatch, GObjError, GObjId, GObjResult, Kw, StateChanged, EV_STATE_CHANGED};

use crate::Runtime;

impl Runtime {
    /// Send an event directly to `dst`.
    ///
    /// Unknown events fail with `UnknownEvent`. A declared event without a
    /// transition in the current state gives `Dispatch::NotHandled`. When the
    /// entry names a next state it is applied after the action returns,
    /// unless the action changed state itself or destroyed the target.
    pub fn send_event(&mut self, dst: GObjId, event: &str, kw: Kw, src: Option<GObjId>) -> GObjResult<Dispatch> {
        let mut kw = kw;
        self.dispatch(dst, event, &mut kw, src)
    }

    /// Dispatch with a caller-owned payload; publications with `share_kw`
    /// pass the same map to every subscriber
    pub(crate) fn dispatch(&mut self, dst: GObjId, event: &str, kw: &mut Kw, src: Option<GObjId>) -> GObjResult<Dispatch> {
        if !self.is_alive(dst) {
            warn!(gobj = %dst, event, src = ?src.map(|s| self.short_name(s)), "Dispatch to destroyed gobj, dropped");
            self.stats.dropped_dispatches += 1;
            return Err(GObjError::DestroyedTarget(dst));
        }
        let gobj = self.live(dst)?;
        let gclass = Rc::clone(&gobj.gclass);
        let state = gobj.state;
        let epoch = gobj.state_epoch;

        if !gclass.has_event(event) {
            error!(
                gclass = %gclass.name(),
                gobj = %self.full_name(dst),
                state = gclass.state_name(state),
                event,
                src = ?src.map(|s| self.short_name(s)),
                "Event NOT DEFINED in gclass"
            );
            self.stats.unknown_events += 1;
            return Err(GObjError::UnknownEvent {
                gclass: gclass.name().to_string(),
                event: event.to_string(),
            });
        }

        if let Some(max) = self.config.max_dispatch_depth {
            if self.depth >= max {
                error!(gobj = %self.full_name(dst), event, depth = self.depth, "Dispatch depth exceeded");
                return Err(GObjError::DispatchDepthExceeded(max));
            }
        }
        self.stats.events_sent += 1;

        let Some(action) = gclass.action(state, event) else {
            if let Some(inject) = &gclass.hooks.inject_event {
                self.depth += 1;
                let ret = inject(self, dst, event, kw, src);
                self.depth -= 1;
                return Ok(Dispatch::Handled(ret));
            }
            if self.config.trace_events {
                debug!(gobj = %self.short_name(dst), state = gclass.state_name(state), event, "not handled");
            }
            self.stats.events_not_handled += 1;
            return Ok(Dispatch::NotHandled);
        };

        if self.config.trace_events {
            debug!(
                gobj = %self.short_name(dst),
                state = gclass.state_name(state),
                event,
                src = ?src.map(|s| self.short_name(s)),
                "dispatch"
            );
        }

        self.depth += 1;
        let ret = match &action.action {
            Some(f) => f(self, dst, event, kw, src),
            None => 0,
        };
        self.depth -= 1;

        if let Some(next) = action.next_state {
            let untouched = self
                .arena
                .get(dst)
                .map_or(false, |g| !g.destroying && g.state_epoch == epoch);
            if untouched {
                self.set_state(dst, next);
            }
        }

        if self.config.trace_events {
            debug!(gobj = %self.short_name(dst), event, ret, "dispatched");
        }
        Ok(Dispatch::Handled(ret))
    }

    /// Explicit transition outside the handler-return path.
    ///
    /// Returns `false` when already in `state`.
    pub fn change_state(&mut self, id: GObjId, state: &str) -> GObjResult<bool> {
        let gobj = self.live(id)?;
        let Some(index) = gobj.gclass.state_index(state) else {
            error!(gclass = %gobj.gclass.name(), gobj = %self.full_name(id), state, "State NOT DEFINED");
            return Err(GObjError::UnknownState {
                gclass: gobj.gclass.name().to_string(),
                state: state.to_string(),
            });
        };
        if gobj.state == index {
            return Ok(false);
        }
        self.set_state(id, index);
        Ok(true)
    }

    /// Apply a state change and report it through the state_changed hook,
    /// or publish `EV_STATE_CHANGED` when the class declares it
    pub(crate) fn set_state(&mut self, id: GObjId, index: usize) {
        let Some(gobj) = self.arena.get_mut(id) else {
            return;
        };
        if gobj.state == index {
            // Self-transition: no state change to report
            return;
        }
        gobj.last_state = gobj.state;
        gobj.state = index;
        gobj.state_epoch += 1;

        let gclass = Rc::clone(&gobj.gclass);
        let change = StateChanged {
            previous: gclass.state_name(gobj.last_state).to_string(),
            current: gclass.state_name(index).to_string(),
        };
        if self.config.trace_events {
            debug!(gobj = %self.short_name(id), from = %change.previous, to = %change.current, "state changed");
        }

        if let Some(hook) = &gclass.hooks.state_changed {
            hook(self, id, &change);
        } else if gclass.has_event(EV_STATE_CHANGED) && gclass.can_publish(EV_STATE_CHANGED) {
            if let Err(e) = self.publish_event(id, EV_STATE_CHANGED, change.to_kw()) {
                debug!(gobj = %self.short_name(id), error = %e, "EV_STATE_CHANGED not published");
            }
        }
    }

    pub fn current_state(&self, id: GObjId) -> GObjResult<&'static str> {
        Ok(self.gobj(id)?.current_state())
    }

    pub fn last_state(&self, id: GObjId) -> GObjResult<&'static str> {
        Ok(self.gobj(id)?.last_state())
    }

    pub fn in_state(&self, id: GObjId, state: &str) -> bool {
        self.arena.get(id).map_or(false, |g| g.current_state() == state)
    }

    /// Is `event` declared in the class of `id`?
    pub fn has_event(&self, id: GObjId, event: &str) -> bool {
        self.arena.get(id).map_or(false, |g| g.gclass.has_event(event))
    }

    pub fn has_input_event(&self, id: GObjId, event: &str) -> bool {
        self.arena.get(id).map_or(false, |g| g.gclass.has_input_event(event))
    }
}
