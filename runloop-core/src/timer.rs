//! Scheduled, possibly repeating, callbacks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::registration::Registration;
use crate::sync::{lock, try_lock};

entity_id!(
    /// Identifies a [`Timer`] and all of its clones.
    TimerId
);

/// The callback invoked when a [`Timer`] fires.
pub type TimerCallback = Box<dyn FnMut(&Timer) + Send + 'static>;

/// A callback scheduled at a point in monotonic time, optionally repeating.
///
/// A `Timer` is a cheap handle: clones refer to the same logical timer, and two timers compare
/// equal only if one is a clone of the other. A timer does nothing until it is added to a
/// [`RunLoop`]; a one-shot timer is removed from its run loop after it fires, a repeating timer
/// stays registered until it is cancelled or removed.
///
/// The scheduling methods are safe to call from any thread, including from the timer's own
/// callback.
///
/// [`RunLoop`]: crate::run_loop::RunLoop
#[derive(Clone)]
pub struct Timer {
    inner: Arc<Inner>,
}

struct Inner {
    id: TimerId,
    schedule: Mutex<Schedule>,
    cancelled: AtomicBool,
    callback: Mutex<TimerCallback>,
    registration: Registration,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    fire_time: Instant,
    /// Zero for one-shot timers.
    interval: Duration,
}

impl Timer {
    /// Create a timer that first fires at `fire_time`, then every `interval`.
    ///
    /// Pass [`Duration::ZERO`] as the interval for a one-shot timer.
    pub fn new<F>(fire_time: Instant, interval: Duration, callback: F) -> Self
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                id: TimerId::next(),
                schedule: Mutex::new(Schedule { fire_time, interval }),
                cancelled: AtomicBool::new(false),
                callback: Mutex::new(Box::new(callback)),
                registration: Registration::default(),
            }),
        }
    }

    /// Create a timer that fires `delay` from now.
    ///
    /// If `repeats` is set, the timer then keeps firing every `delay`.
    pub fn after<F>(delay: Duration, repeats: bool, callback: F) -> Self
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        let interval = if repeats { delay } else { Duration::ZERO };
        Self::new(instant_after(Instant::now(), delay), interval, callback)
    }

    pub fn id(&self) -> TimerId {
        self.inner.id
    }

    /// The instant at which the timer fires next.
    pub fn next_fire_time(&self) -> Instant {
        lock(&self.inner.schedule).fire_time
    }

    /// Reschedule the timer.
    ///
    /// When called from the timer's own callback, the run loop does not additionally advance a
    /// repeating timer for the tick that is being delivered.
    pub fn set_next_fire_time(&self, fire_time: Instant) {
        lock(&self.inner.schedule).fire_time = fire_time;
        if let Some(owner) = self.inner.registration.owner() {
            owner.timer_rescheduled(self.id(), fire_time);
        }
    }

    /// Time left until the timer fires next, zero if it is already due.
    pub fn next_fire_interval(&self) -> Duration {
        self.next_fire_time().saturating_duration_since(Instant::now())
    }

    /// Reschedule the timer to fire `delay` from now.
    pub fn set_next_fire_interval(&self, delay: Duration) {
        self.set_next_fire_time(instant_after(Instant::now(), delay));
    }

    /// The repeat interval, [`Duration::ZERO`] for one-shot timers.
    pub fn repeat_interval(&self) -> Duration {
        lock(&self.inner.schedule).interval
    }

    pub fn repeats(&self) -> bool {
        !self.repeat_interval().is_zero()
    }

    /// Cancel the timer, so it never fires again.
    ///
    /// This is idempotent, and may be called from any thread, including from the timer's own
    /// callback. The run loop drops the timer on its next pass.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = self.inner.registration.owner() {
            owner.timer_invalidated(self.id());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn registration(&self) -> &Registration {
        &self.inner.registration
    }

    /// Advance the fire time without notifying the owner, which is the caller.
    pub(crate) fn advance_to(&self, fire_time: Instant) {
        lock(&self.inner.schedule).fire_time = fire_time;
    }

    /// Invoke the callback.
    ///
    /// Returns `false` without invoking anything if the callback is already running further up
    /// the stack.
    pub(crate) fn fire(&self) -> bool {
        match try_lock(&self.inner.callback) {
            Some(mut callback) => {
                (*callback)(self);
                true
            },
            None => false,
        }
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Timer {}

impl std::hash::Hash for Timer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = *lock(&self.inner.schedule);
        f.debug_struct("Timer")
            .field("id", &self.id())
            .field("fire_time", &schedule.fire_time)
            .field("interval", &schedule.interval)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// `now + delay`, clamped to a far-future instant when that is not representable.
pub(crate) fn instant_after(now: Instant, delay: Duration) -> Instant {
    // Roughly 30 years.
    const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn noop(_: &Timer) {}

    #[test]
    fn identity_not_value_equality() {
        let when = Instant::now() + Duration::from_secs(1);
        let a = Timer::new(when, Duration::ZERO, noop);
        let b = Timer::new(when, Duration::ZERO, noop);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let set: HashSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn relative_constructor() {
        let one_shot = Timer::after(Duration::from_millis(50), false, noop);
        assert!(!one_shot.repeats());
        assert_eq!(one_shot.repeat_interval(), Duration::ZERO);
        assert!(one_shot.next_fire_interval() <= Duration::from_millis(50));

        let repeating = Timer::after(Duration::from_millis(50), true, noop);
        assert!(repeating.repeats());
        assert_eq!(repeating.repeat_interval(), Duration::from_millis(50));
    }

    #[test]
    fn rescheduling_unregistered_timer() {
        let timer = Timer::after(Duration::from_secs(60), false, noop);
        let when = Instant::now() + Duration::from_millis(5);
        timer.set_next_fire_time(when);
        assert_eq!(timer.next_fire_time(), when);

        timer.set_next_fire_interval(Duration::ZERO);
        assert_eq!(timer.next_fire_interval(), Duration::ZERO);
    }

    #[test]
    fn cancel_is_idempotent() {
        let timer = Timer::after(Duration::from_secs(1), true, noop);
        assert!(!timer.is_cancelled());
        timer.cancel();
        timer.cancel();
        assert!(timer.is_cancelled());
        assert!(timer.clone().is_cancelled());
    }

    #[test]
    fn fire_is_not_reentrant() {
        let timer = Timer::after(Duration::ZERO, false, |timer: &Timer| {
            // The callback is already running, so this nested invocation is refused.
            assert!(!timer.fire());
        });
        assert!(timer.fire());
    }

    #[test]
    fn overflowing_delay_is_clamped() {
        let now = Instant::now();
        let when = instant_after(now, Duration::MAX);
        assert!(when > now);
    }
}
