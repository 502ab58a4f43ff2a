//! C_TIMER - timeouts as ordinary child instances
//!
//! A timer holds a deadline in its private data. The core never waits:
//! [`TimerDriver::poll`] compares deadlines with its [`Clock`] and sends
//! the due event to each expired timer, which then publishes it (or hands
//! it to its parent when created as a pure child).
//!
//! Output goes to the instance named by the `subscriber` attribute, or to
//! the parent when that is unset.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use gobj_core::{AttrDesc, AttrFlags, ClassFlags, DataType, EventFlags, GObjId, GObjResult, Kw};
use gobj_runtime::{on, GClass, Runtime, SubscriptionConfig};

use crate::Clock;

pub const C_TIMER: &str = "C_TIMER";
pub const EV_TIMEOUT: &str = "EV_TIMEOUT";
pub const EV_TIMEOUT_PERIODIC: &str = "EV_TIMEOUT_PERIODIC";
pub const ST_IDLE: &str = "ST_IDLE";

#[derive(Debug, Default)]
struct TimerPriv {
    deadline: Option<Duration>,
}

/// Build the C_TIMER class. Deadlines are taken from `clock`, which must be
/// the clock the [`TimerDriver`] polls with.
pub fn timer_class(clock: Arc<dyn Clock>) -> GObjResult<GClass> {
    let (on_start, on_play, on_writing) = (Arc::clone(&clock), Arc::clone(&clock), clock);
    GClass::builder(C_TIMER)
        .description("Timer publishing EV_TIMEOUT or EV_TIMEOUT_PERIODIC when msec elapses")
        .flags(ClassFlags::MANUAL_START)
        .attrs([
            AttrDesc::new(
                DataType::Pointer,
                "subscriber",
                AttrFlags::NONE,
                "subscriber of output-events. Default if null is parent.",
            ),
            AttrDesc::new(DataType::Boolean, "periodic", AttrFlags::RD | AttrFlags::WR, "True for periodic timeouts")
                .with_default(false),
            AttrDesc::new(DataType::Integer, "msec", AttrFlags::RD | AttrFlags::WR, "Timeout in milliseconds")
                .with_default(0i64),
        ])
        .event(EV_TIMEOUT, EventFlags::OUTPUT)
        .event(EV_TIMEOUT_PERIODIC, EventFlags::OUTPUT)
        .state(ST_IDLE, [on(EV_TIMEOUT, ac_timeout), on(EV_TIMEOUT_PERIODIC, ac_timeout)])
        .private_data(TimerPriv::default)
        .on_create(mt_create)
        .on_start(move |rt, id| {
            arm(rt, id, &*on_start);
            0
        })
        .on_play(move |rt, id| {
            arm(rt, id, &*on_play);
            0
        })
        .on_pause(|rt, id| {
            disarm(rt, id);
            0
        })
        .on_stop(|rt, id| {
            disarm(rt, id);
            0
        })
        .on_writing(move |rt, id, path| {
            let running = rt.gobj(id).map_or(false, |g| g.is_running());
            if running && (path == "msec" || path == "periodic") {
                arm(rt, id, &*on_writing);
            }
        })
        .build()
}

/// Register C_TIMER in `rt`
pub fn register_c_timer(rt: &mut Runtime, clock: Arc<dyn Clock>) -> GObjResult<Rc<GClass>> {
    rt.register_class(timer_class(clock)?)
}

fn mt_create(rt: &mut Runtime, id: GObjId) {
    if rt.gobj(id).map_or(true, |g| g.is_pure_child()) {
        return;
    }
    let Some(subscriber) = rt.read_pointer(id, "subscriber").or_else(|| rt.parent(id)) else {
        return;
    };
    // Lives as long as the timer, whatever the subscriber's lifecycle
    let config = SubscriptionConfig::new().hard();
    if let Err(e) = rt.subscribe_event(id, None, config, subscriber) {
        warn!(gobj = %rt.full_name(id), error = %e, "C_TIMER: cannot subscribe output events");
    }
}

fn ac_timeout(rt: &mut Runtime, id: GObjId, event: &str, kw: &mut Kw, _src: Option<GObjId>) -> i32 {
    if let Err(e) = rt.publish_output(id, event, std::mem::take(kw)) {
        debug!(gobj = %rt.short_name(id), event, error = %e, "C_TIMER: timeout not delivered");
    }
    0
}

fn arm(rt: &mut Runtime, id: GObjId, clock: &dyn Clock) {
    let msec = rt.read_i64(id, "msec").unwrap_or(0);
    let deadline = (msec > 0).then(|| clock.now() + Duration::from_millis(msec as u64));
    if let Some(timer) = rt.private_mut::<TimerPriv>(id) {
        timer.deadline = deadline;
    }
}

fn disarm(rt: &mut Runtime, id: GObjId) {
    if let Some(timer) = rt.private_mut::<TimerPriv>(id) {
        timer.deadline = None;
    }
}

/// Deadline of an armed timer, on its clock's time line
pub fn timer_deadline(rt: &Runtime, id: GObjId) -> Option<Duration> {
    rt.private::<TimerPriv>(id)?.deadline
}

/// One-shot timeout of `msec` milliseconds, replacing any pending one
pub fn set_timeout(rt: &mut Runtime, id: GObjId, msec: i64) -> GObjResult<()> {
    rearm(rt, id, msec, false)
}

/// Periodic timeout every `msec` milliseconds, replacing any pending one
pub fn set_timeout_periodic(rt: &mut Runtime, id: GObjId, msec: i64) -> GObjResult<()> {
    rearm(rt, id, msec, true)
}

fn rearm(rt: &mut Runtime, id: GObjId, msec: i64, periodic: bool) -> GObjResult<()> {
    if rt.gobj(id)?.is_playing() {
        rt.pause(id)?;
    }
    rt.write_attr(id, "msec", msec)?;
    rt.write_attr(id, "periodic", periodic)?;
    rt.play(id)?;
    Ok(())
}

/// Cancel any pending timeout
pub fn clear_timeout(rt: &mut Runtime, id: GObjId) -> GObjResult<()> {
    if rt.gobj(id)?.is_playing() {
        rt.pause(id)?;
    }
    disarm(rt, id);
    Ok(())
}

/// Re-enters the runtime with the timeouts that have elapsed
pub struct TimerDriver {
    clock: Arc<dyn Clock>,
}

impl TimerDriver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        TimerDriver { clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fire every expired timer once, earliest deadline first.
    ///
    /// One-shot timers are disarmed and periodic ones re-armed from now
    /// before their event is sent. Returns the number of timers fired.
    pub fn poll(&self, rt: &mut Runtime) -> usize {
        let now = self.clock.now();
        let mut due: Vec<(Duration, GObjId)> = rt
            .instances_of(C_TIMER)
            .into_iter()
            .filter_map(|id| timer_deadline(rt, id).map(|deadline| (deadline, id)))
            .filter(|&(deadline, _)| deadline <= now)
            .collect();
        due.sort();

        let mut fired = 0;
        for (_, id) in due {
            // An earlier timeout handler may have cleared or destroyed it
            if !rt.is_alive(id) || timer_deadline(rt, id).map_or(true, |d| d > now) {
                continue;
            }
            let periodic = rt.read_bool(id, "periodic").unwrap_or(false);
            let msec = rt.read_i64(id, "msec").unwrap_or(0);
            let next = (periodic && msec > 0).then(|| now + Duration::from_millis(msec as u64));
            if let Some(timer) = rt.private_mut::<TimerPriv>(id) {
                timer.deadline = next;
            }

            let event = if periodic { EV_TIMEOUT_PERIODIC } else { EV_TIMEOUT };
            if let Err(e) = rt.send_event(id, event, Kw::new(), Some(id)) {
                warn!(gobj = %rt.full_name(id), event, error = %e, "C_TIMER: timeout dispatch failed");
            }
            fired += 1;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;

    use crate::ManualClock;

    type Inbox = Rc<RefCell<Vec<String>>>;

    fn setup() -> (Runtime, Arc<ManualClock>, TimerDriver, Inbox, GObjId) {
        let clock = Arc::new(ManualClock::new());
        let mut rt = Runtime::new();
        register_c_timer(&mut rt, clock.clone()).unwrap();

        let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
        let (i1, i2) = (inbox.clone(), inbox.clone());
        rt.register_class(
            GClass::builder("C_WATCH")
                .event(EV_TIMEOUT, EventFlags::NONE)
                .event(EV_TIMEOUT_PERIODIC, EventFlags::NONE)
                .state(
                    "ST_IDLE",
                    [
                        on(EV_TIMEOUT, move |_, _, event, _, _| {
                            i1.borrow_mut().push(event.to_string());
                            0
                        }),
                        on(EV_TIMEOUT_PERIODIC, move |_, _, event, _, _| {
                            i2.borrow_mut().push(event.to_string());
                            0
                        }),
                    ],
                )
                .build()
                .unwrap(),
        )
        .unwrap();
        let watch = rt.create("watch", "C_WATCH", Kw::new(), None).unwrap();
        let driver = TimerDriver::new(clock.clone());
        (rt, clock, driver, inbox, watch)
    }

    fn timer(rt: &mut Runtime, parent: GObjId, kw: serde_json::Value) -> GObjId {
        rt.create("t", C_TIMER, gobj_core::kw_from(kw), Some(parent)).unwrap()
    }

    #[test]
    fn test_periodic_fires_once_per_period() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"periodic": true, "msec": 1000}));
        rt.start(t).unwrap();

        clock.advance_ms(999);
        assert_eq!(driver.poll(&mut rt), 0);
        clock.advance_ms(1);
        assert_eq!(driver.poll(&mut rt), 1);
        assert_eq!(inbox.borrow().as_slice(), [EV_TIMEOUT_PERIODIC]);
        assert_eq!(driver.poll(&mut rt), 0);

        clock.advance_ms(1000);
        assert_eq!(driver.poll(&mut rt), 1);
        assert_eq!(inbox.borrow().len(), 2);
    }

    #[test]
    fn test_zero_msec_never_fires() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"periodic": true, "msec": 0}));
        rt.start(t).unwrap();
        for _ in 0..5 {
            clock.advance_ms(60_000);
            assert_eq!(driver.poll(&mut rt), 0);
        }
        assert!(inbox.borrow().is_empty());
        assert_eq!(timer_deadline(&rt, t), None);
    }

    #[test]
    fn test_one_shot_disarms() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"msec": 50}));
        rt.start(t).unwrap();
        clock.advance_ms(500);
        assert_eq!(driver.poll(&mut rt), 1);
        clock.advance_ms(500);
        assert_eq!(driver.poll(&mut rt), 0);
        assert_eq!(inbox.borrow().as_slice(), [EV_TIMEOUT]);
    }

    #[test]
    fn test_stop_disarms() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"msec": 10}));
        rt.start(t).unwrap();
        rt.stop(t).unwrap();
        clock.advance_ms(100);
        assert_eq!(driver.poll(&mut rt), 0);
        assert!(inbox.borrow().is_empty());
    }

    #[test]
    fn test_not_started_by_start_tree() {
        let (mut rt, clock, driver, _, watch) = setup();
        let t = timer(&mut rt, watch, json!({"msec": 10}));
        rt.start_tree(watch).unwrap();
        assert!(!rt.gobj(t).unwrap().is_running());
        clock.advance_ms(100);
        assert_eq!(driver.poll(&mut rt), 0);
    }

    #[test]
    fn test_set_and_clear_timeout() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({}));

        set_timeout(&mut rt, t, 100).unwrap();
        assert_eq!(timer_deadline(&rt, t), Some(Duration::from_millis(100)));
        clock.advance_ms(40);
        set_timeout_periodic(&mut rt, t, 100).unwrap();
        assert_eq!(timer_deadline(&rt, t), Some(Duration::from_millis(140)));

        clock.advance_ms(100);
        assert_eq!(driver.poll(&mut rt), 1);
        assert_eq!(inbox.borrow().as_slice(), [EV_TIMEOUT_PERIODIC]);

        clear_timeout(&mut rt, t).unwrap();
        clock.advance_ms(1000);
        assert_eq!(driver.poll(&mut rt), 0);
    }

    #[test]
    fn test_pure_child_sends_to_parent() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = rt
            .create_pure_child("t", C_TIMER, gobj_core::kw_from(json!({"msec": 5})), watch)
            .unwrap();
        assert!(rt.find_subscriptions(t, None, None).is_empty());
        rt.start(t).unwrap();
        clock.advance_ms(5);
        assert_eq!(driver.poll(&mut rt), 1);
        assert_eq!(inbox.borrow().as_slice(), [EV_TIMEOUT]);
        assert_eq!(rt.stats().publications, 0);
    }

    #[test]
    fn test_subscription_survives_subscriber_stop() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"periodic": true, "msec": 10}));
        rt.start(watch).unwrap();
        rt.stop(watch).unwrap();
        rt.start(t).unwrap();
        clock.advance_ms(10);
        driver.poll(&mut rt);
        assert_eq!(inbox.borrow().len(), 1);
    }

    #[test]
    fn test_destroyed_timer_is_skipped() {
        let (mut rt, clock, driver, inbox, watch) = setup();
        let t = timer(&mut rt, watch, json!({"msec": 10}));
        rt.start(t).unwrap();
        rt.destroy(t).unwrap();
        clock.advance_ms(10);
        assert_eq!(driver.poll(&mut rt), 0);
        assert!(inbox.borrow().is_empty());
    }
}
