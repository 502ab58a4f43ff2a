//! Publish/subscribe router
//!
//! Every subscription is stored once in the runtime and referenced from
//! both ends: the publisher's `subscriptions` list (fan-out order) and the
//! subscriber's `subscribings` list (teardown).

use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, error, warn};

use gobj_core::{Filter, GObjError, GObjId, GObjResult, Kw, Published, SubscriptionId, EV_STATE_CHANGED};

use crate::Runtime;

/// Per-subscription delivery options
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionConfig {
    /// Payload predicate; deliveries whose payload doesn't match are skipped
    pub filter: Option<Filter>,
    /// Keys merged into each delivered payload
    pub global: Option<Kw>,
    /// Keys removed from each delivered payload
    pub local: Vec<String>,
    /// Deliver under this event name
    pub rename_event: Option<String>,
    /// Survives ordinary unsubscribe and stop
    pub hard: bool,
    /// A negative status from this subscriber stops the fan-out
    pub own_event: bool,
    /// Deliver the publisher's payload itself instead of a copy
    pub share_kw: bool,
}

impl SubscriptionConfig {
    pub fn new() -> Self {
        SubscriptionConfig::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn global(mut self, kw: Kw) -> Self {
        self.global = Some(kw);
        self
    }

    pub fn local<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.local = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn rename_event(mut self, event: &str) -> Self {
        self.rename_event = Some(event.to_string());
        self
    }

    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }

    pub fn own_event(mut self) -> Self {
        self.own_event = true;
        self
    }

    pub fn share_kw(mut self) -> Self {
        self.share_kw = true;
        self
    }

    /// Parse the JSON form used in configuration files:
    ///
    /// ```json
    /// {
    ///     "__filter__": {"id": "a"},
    ///     "__global__": {"origin": "panel"},
    ///     "__local__": ["token"],
    ///     "__config__": {
    ///         "__hard_subscription__": true,
    ///         "__own_event__": false,
    ///         "__share_kw__": false,
    ///         "__rename_event_name__": "EV_OTHER"
    ///     }
    /// }
    /// ```
    pub fn from_kw(kw: &Kw) -> GObjResult<Self> {
        let bad = |what: &str| GObjError::InvalidTree(format!("subscription config: bad {what}"));
        let mut config = SubscriptionConfig::new();
        if let Some(filter) = kw.get("__filter__") {
            config.filter = Some(Filter::from_json(filter).ok_or_else(|| bad("__filter__"))?);
        }
        if let Some(global) = kw.get("__global__") {
            config.global = Some(global.as_object().cloned().ok_or_else(|| bad("__global__"))?);
        }
        if let Some(local) = kw.get("__local__") {
            config.local = local
                .as_array()
                .and_then(|keys| keys.iter().map(|k| k.as_str().map(str::to_string)).collect())
                .ok_or_else(|| bad("__local__"))?;
        }
        if let Some(flags) = kw.get("__config__") {
            let flags = flags.as_object().ok_or_else(|| bad("__config__"))?;
            let flag = |key: &str| flags.get(key).and_then(Value::as_bool).unwrap_or(false);
            config.hard = flag("__hard_subscription__");
            config.own_event = flag("__own_event__");
            config.share_kw = flag("__share_kw__");
            config.rename_event = flags
                .get("__rename_event_name__")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(config)
    }
}

/// A registered subscription
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub publisher: GObjId,
    pub subscriber: GObjId,
    /// `None` subscribes to every event of the publisher
    pub event: Option<String>,
    pub config: SubscriptionConfig,
}

impl Subscription {
    pub fn matches_event(&self, event: &str) -> bool {
        self.event.as_deref().map_or(true, |e| e == event)
    }
}

impl Runtime {
    /// Subscribe `subscriber` to `event` (or every event) of `publisher`.
    ///
    /// The event must be an output or system event of the publisher unless
    /// its class carries `NO_CHECK_OUTPUT_EVENTS`. An identical previous
    /// subscription is replaced.
    pub fn subscribe_event(
        &mut self,
        publisher: GObjId,
        event: Option<&str>,
        config: SubscriptionConfig,
        subscriber: GObjId,
    ) -> GObjResult<SubscriptionId> {
        let gclass = Rc::clone(&self.live(publisher)?.gclass);
        self.live(subscriber)?;
        if let Some(event) = event {
            if !gclass.can_publish(event) {
                error!(
                    gclass = %gclass.name(),
                    publisher = %self.full_name(publisher),
                    event,
                    "event NOT in output event list"
                );
                return Err(GObjError::UnknownEvent {
                    gclass: gclass.name().to_string(),
                    event: event.to_string(),
                });
            }
        }

        let repeated: Vec<SubscriptionId> = self
            .find_subscriptions(publisher, event, Some(subscriber))
            .into_iter()
            .filter(|s| s.event.as_deref() == event && s.config == config)
            .map(|s| s.id)
            .collect();
        if !repeated.is_empty() {
            warn!(
                publisher = %self.full_name(publisher),
                subscriber = %self.full_name(subscriber),
                event = event.unwrap_or(""),
                "subscription(s) REPEATED, will be deleted and override"
            );
            self.unsubscribe_list(&repeated, true);
        }

        let id = SubscriptionId::new(self.next_subscription);
        self.next_subscription += 1;
        let subscription = Subscription {
            id,
            publisher,
            subscriber,
            event: event.map(str::to_string),
            config,
        };
        self.subscriptions.insert(id, subscription.clone());
        self.gobj_mut(publisher)?.subscriptions.push(id);
        self.gobj_mut(subscriber)?.subscribings.push(id);

        if self.config.trace_subscriptions {
            debug!(
                subscriber = %self.full_name(subscriber),
                publisher = %self.full_name(publisher),
                event = event.unwrap_or("*"),
                "subscribing"
            );
        }

        if let Some(hook) = &gclass.hooks.subscription_added {
            if hook(self, publisher, &subscription) < 0 {
                self.delete_subscription(id, false);
                return Err(GObjError::SubscriptionRejected {
                    publisher,
                    event: event.unwrap_or("").to_string(),
                });
            }
        }
        Ok(id)
    }

    /// Remove the non-hard subscriptions of `subscriber` to `event` of
    /// `publisher`. Removing a pair that doesn't exist is a no-op.
    pub fn unsubscribe_event(&mut self, publisher: GObjId, event: Option<&str>, subscriber: GObjId) -> usize {
        let ids: Vec<SubscriptionId> = self
            .find_subscriptions(publisher, event, Some(subscriber))
            .into_iter()
            .filter(|s| s.event.as_deref() == event)
            .map(|s| s.id)
            .collect();
        self.unsubscribe_list(&ids, false)
    }

    /// Remove a list of subscriptions. Hard ones are kept unless `force`.
    /// Returns how many were removed.
    pub fn unsubscribe_list(&mut self, ids: &[SubscriptionId], force: bool) -> usize {
        let mut removed = 0;
        for &id in ids {
            let Some(sub) = self.subscriptions.get(&id) else {
                continue;
            };
            if sub.config.hard && !force {
                continue;
            }
            if self.delete_subscription(id, true) {
                removed += 1;
            }
        }
        removed
    }

    /// Drop every subscription on or by `id`, hard ones included
    pub(crate) fn purge_subscriptions(&mut self, id: GObjId) {
        let Some(gobj) = self.arena.get(id) else {
            return;
        };
        let mut ids = gobj.subscriptions.clone();
        ids.extend_from_slice(&gobj.subscribings);
        self.unsubscribe_list(&ids, true);
    }

    fn delete_subscription(&mut self, id: SubscriptionId, inform: bool) -> bool {
        let Some(sub) = self.subscriptions.remove(&id) else {
            return false;
        };
        if let Some(publisher) = self.arena.get_mut(sub.publisher) {
            publisher.subscriptions.retain(|&s| s != id);
        }
        if let Some(subscriber) = self.arena.get_mut(sub.subscriber) {
            subscriber.subscribings.retain(|&s| s != id);
        }
        if self.config.trace_subscriptions {
            debug!(
                subscriber = %self.full_name(sub.subscriber),
                publisher = %self.full_name(sub.publisher),
                event = sub.event.as_deref().unwrap_or("*"),
                "unsubscribing"
            );
        }
        if inform {
            if let Ok(gclass) = self.gclass_of(sub.publisher) {
                if let Some(hook) = &gclass.hooks.subscription_deleted {
                    hook(self, sub.publisher, &sub);
                }
            }
        }
        true
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    /// Subscriptions held on `publisher`, in registration order, narrowed
    /// by event and subscriber
    pub fn find_subscriptions(
        &self,
        publisher: GObjId,
        event: Option<&str>,
        subscriber: Option<GObjId>,
    ) -> Vec<&Subscription> {
        let Some(gobj) = self.arena.get(publisher) else {
            return Vec::new();
        };
        gobj.subscriptions
            .iter()
            .filter_map(|id| self.subscriptions.get(id))
            .filter(|s| event.map_or(true, |e| s.event.as_deref() == Some(e)))
            .filter(|s| subscriber.map_or(true, |sub| s.subscriber == sub))
            .collect()
    }

    /// Subscriptions held by `subscriber`, narrowed by event and publisher
    pub fn find_subscribings(
        &self,
        subscriber: GObjId,
        event: Option<&str>,
        publisher: Option<GObjId>,
    ) -> Vec<&Subscription> {
        let Some(gobj) = self.arena.get(subscriber) else {
            return Vec::new();
        };
        gobj.subscribings
            .iter()
            .filter_map(|id| self.subscriptions.get(id))
            .filter(|s| event.map_or(true, |e| s.event.as_deref() == Some(e)))
            .filter(|s| publisher.map_or(true, |p| s.publisher == p))
            .collect()
    }

    /// Fan an event out to the matching subscribers of `publisher`, in
    /// registration order.
    ///
    /// A publication that reaches nobody logs a warning unless the event
    /// type carries `NO_WARN_SUBS`.
    pub fn publish_event(&mut self, publisher: GObjId, event: &str, kw: Kw) -> GObjResult<Published> {
        if !self.is_alive(publisher) {
            warn!(gobj = %publisher, event, "Publish from destroyed gobj, dropped");
            self.stats.dropped_dispatches += 1;
            return Err(GObjError::DestroyedTarget(publisher));
        }
        let gobj = self.live(publisher)?;
        let gclass = Rc::clone(&gobj.gclass);
        if !gclass.can_publish(event) {
            error!(
                gclass = %gclass.name(),
                publisher = %self.full_name(publisher),
                event,
                "event NOT in output event list"
            );
            return Err(GObjError::UnknownEvent {
                gclass: gclass.name().to_string(),
                event: event.to_string(),
            });
        }
        let no_warn = gclass.event_type(event).map_or(false, |ev| ev.flags.no_warn_subs());
        let ids = gobj.subscriptions.clone();
        self.stats.publications += 1;
        if self.config.trace_events {
            debug!(publisher = %self.short_name(publisher), event, subscriptions = ids.len(), "publish");
        }

        let mut shared = kw;
        let mut published = Published::default();
        for id in ids {
            // Handlers may unsubscribe during the fan-out
            let Some(sub) = self.subscriptions.get(&id).cloned() else {
                continue;
            };
            if !sub.matches_event(event) || !self.is_alive(sub.subscriber) {
                continue;
            }
            if let Some(filter) = &sub.config.filter {
                if !filter.matches(&shared) {
                    continue;
                }
            }
            if let Some(hook) = &gclass.hooks.publication_filter {
                if !hook(self, publisher, event, &shared, sub.subscriber) {
                    continue;
                }
            }
            if event == EV_STATE_CHANGED && !self.has_input_event(sub.subscriber, event) {
                continue;
            }

            let name = sub.config.rename_event.as_deref().unwrap_or(event);
            let shares = sub.config.share_kw && sub.config.local.is_empty() && sub.config.global.is_none();
            let result = if shares {
                self.dispatch(sub.subscriber, name, &mut shared, Some(publisher))
            } else {
                let mut copy = shared.clone();
                for key in &sub.config.local {
                    copy.remove(key);
                }
                if let Some(global) = &sub.config.global {
                    for (key, value) in global {
                        copy.insert(key.clone(), value.clone());
                    }
                }
                self.dispatch(sub.subscriber, name, &mut copy, Some(publisher))
            };

            // Every attempted send counts, whatever the subscriber made of it
            published.delivered += 1;
            match result {
                Ok(dispatch) => {
                    published.status += dispatch.status();
                    if dispatch.status() < 0 && sub.config.own_event {
                        published.owned = true;
                        break;
                    }
                }
                Err(e) => {
                    debug!(publisher = %self.short_name(publisher), subscriber = %sub.subscriber, event = name, error = %e, "delivery failed");
                }
            }
            if !self.is_alive(publisher) {
                break;
            }
        }

        self.stats.deliveries += published.delivered as u64;
        if published.delivered == 0 && !no_warn {
            warn!(publisher = %self.full_name(publisher), event, "Publish event WITHOUT subscribers");
            self.stats.publications_without_subscribers += 1;
        }
        Ok(published)
    }

    /// Publish an output event, or send it to the parent for pure children
    pub fn publish_output(&mut self, id: GObjId, event: &str, kw: Kw) -> GObjResult<Published> {
        let gobj = self.live(id)?;
        match (gobj.is_pure_child(), gobj.parent) {
            (true, Some(parent)) => {
                let dispatch = self.send_event(parent, event, kw, Some(id))?;
                Ok(Published {
                    delivered: 1,
                    status: dispatch.status(),
                    owned: false,
                })
            }
            _ => self.publish_event(id, event, kw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use gobj_core::{kw_from, ClassFlags, EventFlags, StateChanged};
    use serde_json::json;

    use crate::{on, GClass, Transition};

    type Inbox = Rc<RefCell<Vec<(String, String, Kw)>>>;

    fn publisher_class(extra: ClassFlags) -> GClass {
        GClass::builder("C_PUB")
            .flags(extra)
            .event("EV_DATA", EventFlags::OUTPUT)
            .event("EV_QUIET", EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS)
            .event(EV_STATE_CHANGED, EventFlags::OUTPUT | EventFlags::SYSTEM | EventFlags::NO_WARN_SUBS)
            .event("EV_GO", EventFlags::NONE)
            .state("ST_A", [Transition::new("EV_GO").to("ST_B")])
            .state("ST_B", [Transition::new("EV_GO").to("ST_A")])
            .build()
            .unwrap()
    }

    fn subscriber_class(inbox: &Inbox) -> GClass {
        let (i1, i2, i3) = (inbox.clone(), inbox.clone(), inbox.clone());
        GClass::builder("C_SUB")
            .event("EV_DATA", EventFlags::NONE)
            .event("EV_RENAMED", EventFlags::NONE)
            .event(EV_STATE_CHANGED, EventFlags::NONE)
            .state(
                "ST_IDLE",
                [
                    on("EV_DATA", move |rt, id, event, kw, _| {
                        i1.borrow_mut().push((rt.name(id).unwrap().to_string(), event.to_string(), kw.clone()));
                        kw.insert("touched".into(), json!(true));
                        kw.get("ret").and_then(Value::as_i64).unwrap_or(0) as i32
                    }),
                    on("EV_RENAMED", move |rt, id, event, kw, _| {
                        i2.borrow_mut().push((rt.name(id).unwrap().to_string(), event.to_string(), kw.clone()));
                        0
                    }),
                    on(EV_STATE_CHANGED, move |rt, id, event, kw, _| {
                        i3.borrow_mut().push((rt.name(id).unwrap().to_string(), event.to_string(), kw.clone()));
                        0
                    }),
                ],
            )
            .build()
            .unwrap()
    }

    fn setup() -> (Runtime, Inbox, GObjId, GObjId, GObjId) {
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(publisher_class(ClassFlags::NONE)).unwrap();
        rt.register_class(subscriber_class(&inbox)).unwrap();
        let p = rt.create("p", "C_PUB", Kw::new(), None).unwrap();
        let s1 = rt.create("s1", "C_SUB", Kw::new(), None).unwrap();
        let s2 = rt.create("s2", "C_SUB", Kw::new(), None).unwrap();
        (rt, inbox, p, s1, s2)
    }

    fn receivers(inbox: &Inbox) -> Vec<String> {
        inbox.borrow().iter().map(|(who, _, _)| who.clone()).collect()
    }

    #[test]
    fn test_filtered_fan_out() {
        let (mut rt, inbox, p, s1, s2) = setup();
        let f1 = Filter::from_json(&json!({"id": "a"})).unwrap();
        let f2 = Filter::from_json(&json!({"id": "b"})).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().filter(f1), s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().filter(f2), s2).unwrap();

        let published = rt.publish_event(p, "EV_DATA", kw_from(json!({"id": "a"}))).unwrap();
        assert_eq!(published.delivered, 1);
        assert_eq!(receivers(&inbox), vec!["s1"]);

        let published = rt.publish_event(p, "EV_DATA", kw_from(json!({"id": "c"}))).unwrap();
        assert_eq!(published.delivered, 0);
        assert_eq!(receivers(&inbox), vec!["s1"]);
        assert_eq!(rt.stats().publications_without_subscribers, 1);
    }

    #[test]
    fn test_no_warn_subs_is_not_counted() {
        let (mut rt, _, p, _, _) = setup();
        rt.publish_event(p, "EV_QUIET", Kw::new()).unwrap();
        assert_eq!(rt.stats().publications_without_subscribers, 0);
        rt.publish_event(p, "EV_DATA", Kw::new()).unwrap();
        assert_eq!(rt.stats().publications_without_subscribers, 1);
    }

    #[test]
    fn test_registration_order_and_status_sum() {
        let (mut rt, inbox, p, s1, s2) = setup();
        rt.subscribe_event(p, None, SubscriptionConfig::new(), s2).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        let published = rt.publish_event(p, "EV_DATA", kw_from(json!({"ret": 2}))).unwrap();
        assert_eq!(receivers(&inbox), vec!["s2", "s1"]);
        assert_eq!(published.status, 4);
        assert!(!published.owned);
    }

    #[test]
    fn test_share_kw() {
        let (mut rt, inbox, p, s1, s2) = setup();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().share_kw(), s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().share_kw(), s2).unwrap();
        rt.publish_event(p, "EV_DATA", Kw::new()).unwrap();
        let inbox = inbox.borrow();
        assert!(!inbox[0].2.contains_key("touched"));
        assert!(inbox[1].2.contains_key("touched"));
    }

    #[test]
    fn test_copies_are_independent() {
        let (mut rt, inbox, p, s1, s2) = setup();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s2).unwrap();
        rt.publish_event(p, "EV_DATA", Kw::new()).unwrap();
        assert!(!inbox.borrow()[1].2.contains_key("touched"));
    }

    #[test]
    fn test_global_local_rename() {
        let (mut rt, inbox, p, s1, _) = setup();
        let config = SubscriptionConfig::new()
            .global(kw_from(json!({"origin": "panel"})))
            .local(["token"])
            .rename_event("EV_RENAMED");
        rt.subscribe_event(p, Some("EV_DATA"), config, s1).unwrap();
        rt.publish_event(p, "EV_DATA", kw_from(json!({"token": "x", "n": 1}))).unwrap();
        let inbox = inbox.borrow();
        assert_eq!(inbox[0].1, "EV_RENAMED");
        assert_eq!(Value::Object(inbox[0].2.clone()), json!({"origin": "panel", "n": 1}));
    }

    #[test]
    fn test_own_event_stops_fan_out() {
        let (mut rt, inbox, p, s1, s2) = setup();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().own_event(), s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s2).unwrap();
        let published = rt.publish_event(p, "EV_DATA", kw_from(json!({"ret": -1}))).unwrap();
        assert!(published.owned);
        assert_eq!(receivers(&inbox), vec!["s1"]);
    }

    #[test]
    fn test_subscribe_checks_output_events() {
        let (mut rt, _, p, s1, _) = setup();
        assert!(matches!(
            rt.subscribe_event(p, Some("EV_GO"), SubscriptionConfig::new(), s1),
            Err(GObjError::UnknownEvent { .. })
        ));
        assert!(matches!(rt.publish_event(p, "EV_GO", Kw::new()), Err(GObjError::UnknownEvent { .. })));
    }

    #[test]
    fn test_no_check_output_events() {
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(publisher_class(ClassFlags::NO_CHECK_OUTPUT_EVENTS)).unwrap();
        rt.register_class(subscriber_class(&inbox)).unwrap();
        let p = rt.create("p", "C_PUB", Kw::new(), None).unwrap();
        let s = rt.create("s", "C_SUB", Kw::new(), None).unwrap();
        rt.subscribe_event(p, Some("EV_RENAMED"), SubscriptionConfig::new(), s).unwrap();
        assert_eq!(rt.publish_event(p, "EV_RENAMED", Kw::new()).unwrap().delivered, 1);
    }

    #[test]
    fn test_wildcard_subscriber_without_the_event_still_counts() {
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(publisher_class(ClassFlags::NO_CHECK_OUTPUT_EVENTS)).unwrap();
        rt.register_class(subscriber_class(&inbox)).unwrap();
        let p = rt.create("p", "C_PUB", Kw::new(), None).unwrap();
        let s = rt.create("s", "C_SUB", Kw::new(), None).unwrap();
        rt.subscribe_event(p, None, SubscriptionConfig::new(), s).unwrap();

        let published = rt.publish_event(p, "EV_OTHER", Kw::new()).unwrap();
        assert_eq!(published.delivered, 1);
        assert_eq!(rt.stats().unknown_events, 1);
        assert_eq!(rt.stats().publications_without_subscribers, 0);
        assert!(inbox.borrow().is_empty());
    }

    #[test]
    fn test_repeated_subscription_replaced() {
        let (mut rt, inbox, p, s1, _) = setup();
        let first = rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        let second = rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        assert_ne!(first, second);
        assert!(rt.subscription(first).is_none());
        rt.publish_event(p, "EV_DATA", Kw::new()).unwrap();
        assert_eq!(inbox.borrow().len(), 1);
    }

    #[test]
    fn test_unsubscribe_idempotent_and_hard() {
        let (mut rt, _, p, s1, s2) = setup();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new().hard(), s2).unwrap();
        assert_eq!(rt.unsubscribe_event(p, Some("EV_DATA"), s1), 1);
        assert_eq!(rt.unsubscribe_event(p, Some("EV_DATA"), s1), 0);
        assert_eq!(rt.unsubscribe_event(p, Some("EV_DATA"), s2), 0);
        assert!(rt.find_subscribings(s1, None, None).is_empty());
        let hard: Vec<_> = rt.find_subscriptions(p, None, None).iter().map(|s| s.id).collect();
        assert_eq!(rt.unsubscribe_list(&hard, true), 1);
        assert!(rt.find_subscriptions(p, None, None).is_empty());
    }

    #[test]
    fn test_stop_drops_soft_subscribings() {
        let (mut rt, _, p, s1, _) = setup();
        rt.start(s1).unwrap();
        rt.subscribe_event(p, Some("EV_DATA"), SubscriptionConfig::new(), s1).unwrap();
        rt.subscribe_event(p, Some("EV_QUIET"), SubscriptionConfig::new().hard(), s1).unwrap();
        rt.stop(s1).unwrap();
        let left = rt.find_subscribings(s1, None, Some(p));
        assert_eq!(left.len(), 1);
        assert!(left[0].config.hard);
    }

    #[test]
    fn test_destroy_purges_both_ends() {
        let (mut rt, _, p, s1, s2) = setup();
        rt.subscribe_event(p, None, SubscriptionConfig::new().hard(), s1).unwrap();
        rt.destroy(s1).unwrap();
        assert!(rt.find_subscriptions(p, None, None).is_empty());
        assert!(rt.subscriptions.is_empty());
        assert_eq!(rt.publish_event(s1, "EV_DATA", Kw::new()), Err(GObjError::DestroyedTarget(s1)));
    }

    #[test]
    fn test_state_changed_published_to_input_subscribers() {
        let (mut rt, inbox, p, s1, _) = setup();
        rt.subscribe_event(p, None, SubscriptionConfig::new(), s1).unwrap();
        rt.send_event(p, "EV_GO", Kw::new(), None).unwrap();
        let inbox = inbox.borrow();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].1, EV_STATE_CHANGED);
        let change = StateChanged::from_kw(&inbox[0].2).unwrap();
        assert_eq!((change.previous.as_str(), change.current.as_str()), ("ST_A", "ST_B"));
    }

    #[test]
    fn test_subscription_hooks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(
            GClass::builder("C_GATE")
                .event("EV_DATA", EventFlags::OUTPUT)
                .state("ST_IDLE", [])
                .on_subscription_added(move |rt, _, sub| {
                    l1.borrow_mut().push(format!("added {}", rt.name(sub.subscriber).unwrap_or("")));
                    if rt.name(sub.subscriber) == Ok("intruder") {
                        -1
                    } else {
                        0
                    }
                })
                .on_subscription_deleted(move |_, _, sub| {
                    l2.borrow_mut().push(format!("deleted {}", sub.id.0));
                    0
                })
                .on_publication_filter(|_, _, _, kw, _| kw.get("secret").is_none())
                .build()
                .unwrap(),
        )
        .unwrap();
        rt.register_class(subscriber_class(&inbox)).unwrap();
        let gate = rt.create("gate", "C_GATE", Kw::new(), None).unwrap();
        let ok = rt.create("ok", "C_SUB", Kw::new(), None).unwrap();
        let bad = rt.create("intruder", "C_SUB", Kw::new(), None).unwrap();

        let sid = rt.subscribe_event(gate, Some("EV_DATA"), SubscriptionConfig::new(), ok).unwrap();
        assert!(matches!(
            rt.subscribe_event(gate, Some("EV_DATA"), SubscriptionConfig::new(), bad),
            Err(GObjError::SubscriptionRejected { .. })
        ));
        assert!(rt.find_subscribings(bad, None, None).is_empty());

        assert_eq!(rt.publish_event(gate, "EV_DATA", kw_from(json!({"secret": 1}))).unwrap().delivered, 0);
        assert_eq!(rt.publish_event(gate, "EV_DATA", Kw::new()).unwrap().delivered, 1);

        rt.unsubscribe_event(gate, Some("EV_DATA"), ok);
        assert_eq!(
            log.borrow().as_slice(),
            ["added ok".to_string(), "added intruder".to_string(), format!("deleted {}", sid.0)]
        );
    }

    #[test]
    fn test_config_from_kw() {
        let kw = kw_from(json!({
            "__filter__": [{"id": "a"}, {"id": "b"}],
            "__global__": {"origin": "x"},
            "__local__": ["token"],
            "__config__": {"__hard_subscription__": true, "__rename_event_name__": "EV_RENAMED"}
        }));
        let config = SubscriptionConfig::from_kw(&kw).unwrap();
        assert!(config.hard);
        assert!(!config.own_event);
        assert_eq!(config.local, vec!["token".to_string()]);
        assert_eq!(config.rename_event.as_deref(), Some("EV_RENAMED"));
        assert!(matches!(config.filter, Some(Filter::Any(ref alts)) if alts.len() == 2));
        assert!(SubscriptionConfig::from_kw(&kw_from(json!({"__local__": "token"}))).is_err());
    }

    #[test]
    fn test_pure_child_output_goes_to_parent() {
        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(publisher_class(ClassFlags::NONE)).unwrap();
        rt.register_class(subscriber_class(&inbox)).unwrap();
        let parent = rt.create("parent", "C_SUB", Kw::new(), None).unwrap();
        let child = rt.create_pure_child("child", "C_PUB", Kw::new(), parent).unwrap();
        let published = rt.publish_output(child, "EV_DATA", kw_from(json!({"ret": 3}))).unwrap();
        assert_eq!(published, Published { delivered: 1, status: 3, owned: false });
        assert_eq!(receivers(&inbox), vec!["parent"]);
    }
}
