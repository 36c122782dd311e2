//! The dispatch algorithm shared by every backend.
//!
//! Callbacks are never invoked with the tables locked. Each phase takes a snapshot of the
//! entities it is about to fire under the lock, releases it, and then re-checks every entity
//! right before invoking it, so callbacks are free to register, remove, cancel or even run the
//! loop recursively.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, trace_span};

use super::{ExitReason, Shared, WaitTarget};
use crate::event_source::EventSource;
use crate::observer::{Activity, Observer};
use crate::sync::lock;
use crate::timer::{instant_after, Timer};
use crate::wait::WaitOutcome;

impl Shared {
    pub(super) fn run_internal(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        return_after_source_handled: bool,
    ) -> ExitReason {
        // Catch a stop requested while no invocation was running.
        if self.stop_requested.swap(false, Ordering::AcqRel) {
            debug!("stop was requested before entering the run loop");
            return ExitReason::Stopped;
        }

        let deadline = timeout.map(|timeout| instant_after(Instant::now(), timeout));
        let _span = trace_span!("run loop", ?timeout, return_after_source_handled).entered();

        self.notify_observers(Activity::ENTRY);
        let reason = self.run_passes(deadline, return_after_source_handled);
        self.notify_observers(Activity::EXIT);

        debug!(?reason, "exiting run loop");
        reason
    }

    fn run_passes(
        self: &Arc<Self>,
        deadline: Option<Instant>,
        return_after_source_handled: bool,
    ) -> ExitReason {
        loop {
            if self.is_idle() {
                return ExitReason::Finished;
            }

            self.fire_due_timers();

            let handled = self.fire_signaled_sources(return_after_source_handled);
            if handled && return_after_source_handled {
                return ExitReason::HandledOneSource;
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return ExitReason::TimedOut;
            }

            // The callbacks above may have consumed the last timer or source, don't block on
            // nothing.
            if self.is_idle() {
                return ExitReason::Finished;
            }

            self.notify_observers(Activity::BEFORE_WAITING);
            self.wait(deadline);
            self.notify_observers(Activity::AFTER_WAITING);

            if self.stop_requested.swap(false, Ordering::AcqRel) {
                return ExitReason::Stopped;
            }
        }
    }

    fn is_idle(&self) -> bool {
        let mut tables = lock(&self.tables);
        tables.purge_cancelled();
        tables.is_idle()
    }

    /// Fire every timer that is due, in ascending fire-time order.
    fn fire_due_timers(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let due: Vec<Timer> = {
            let mut tables = lock(&self.tables);
            tables.purge_cancelled();
            tables.sort_timers();
            tables
                .timers
                .iter()
                .take_while(|scheduled| scheduled.timer.next_fire_time() <= now)
                .map(|scheduled| scheduled.timer.clone())
                .collect()
        };
        if due.is_empty() {
            return 0;
        }

        self.notify_observers(Activity::BEFORE_TIMERS);

        let mut fired = 0;
        for timer in &due {
            // An earlier callback in this pass may have removed, cancelled or rescheduled it.
            if timer.is_cancelled() || !timer.registration().is_owned_by(self) {
                continue;
            }
            let scheduled = timer.next_fire_time();
            if scheduled > now {
                continue;
            }

            if !timer.fire() {
                trace!(id = ?timer.id(), "timer callback is already running, skipping");
                continue;
            }
            fired += 1;
            self.rearm(timer, scheduled);
        }

        trace!(fired, "fired timers");
        fired
    }

    /// Reschedule or drop a timer that just fired for its `scheduled` tick.
    fn rearm(self: &Arc<Self>, timer: &Timer, scheduled: Instant) {
        if !timer.registration().is_owned_by(self) {
            return;
        }
        if timer.is_cancelled() {
            self.unregister_timer(timer.id());
            return;
        }
        // The callback moved its own fire time, leave it alone.
        if timer.next_fire_time() != scheduled {
            return;
        }

        let interval = timer.repeat_interval();
        if interval.is_zero() {
            self.unregister_timer(timer.id());
        } else {
            // Advance from the scheduled tick rather than from now, so a late pass catches up on
            // missed ticks instead of drifting.
            timer.advance_to(instant_after(scheduled, interval));
            lock(&self.tables).sort_timers();
        }
    }

    /// Consume and fire the signaled sources, or only the first one if `only_one` is set.
    ///
    /// Returns whether any source fired.
    fn fire_signaled_sources(self: &Arc<Self>, only_one: bool) -> bool {
        let signaled: Vec<EventSource> = {
            let mut tables = lock(&self.tables);
            tables.purge_cancelled();
            let mut signaled = Vec::new();
            for source in &tables.sources {
                if source.take_signal() {
                    signaled.push(source.clone());
                    if only_one {
                        // Leave the other sources signaled for the next invocation.
                        break;
                    }
                }
            }
            signaled
        };
        if signaled.is_empty() {
            return false;
        }

        self.notify_observers(Activity::BEFORE_SOURCES);

        let mut fired = 0;
        for source in &signaled {
            if source.is_cancelled() || !source.registration().is_owned_by(self) {
                continue;
            }
            if !source.fire() {
                trace!(id = ?source.id(), "source callback is already running, deferring");
                source.restore_signal();
                continue;
            }
            fired += 1;
            if source.is_cancelled() {
                self.unregister_event_source(source);
            }
        }

        trace!(fired, "fired event sources");
        fired > 0
    }

    /// Fire the observers of `activity`, in registration order.
    fn notify_observers(self: &Arc<Self>, activity: Activity) {
        let observers: Vec<Observer> = {
            let mut tables = lock(&self.tables);
            if !tables.observer_mask.intersects(activity) {
                return;
            }
            tables.purge_cancelled_observers();
            tables
                .observers
                .iter()
                .filter(|observer| observer.activities().intersects(activity))
                .cloned()
                .collect()
        };

        for observer in &observers {
            if observer.is_cancelled() || !observer.registration().is_owned_by(self) {
                continue;
            }
            if !observer.fire(activity) {
                continue;
            }
            if !observer.repeats() || observer.is_cancelled() {
                self.remove_observer(observer);
            }
        }
    }

    /// Block until the earliest timer, the caller's deadline, or a wake up.
    ///
    /// Returns without blocking when no timers or sources are left, since work may have been
    /// removed after the last idle check.
    fn wait(&self, deadline: Option<Instant>) -> WaitOutcome {
        let target = {
            let mut tables = lock(&self.tables);
            tables.purge_cancelled();
            if tables.is_idle() {
                trace!("nothing left to wait for");
                return WaitOutcome::Woken;
            }
            tables.sort_timers();
            let next_timer = tables.timers.first().map(|scheduled| &scheduled.timer);
            let target = match (next_timer, deadline) {
                (Some(timer), Some(deadline)) if deadline <= timer.next_fire_time() => {
                    WaitTarget { deadline: Some(deadline), timer: None }
                },
                (Some(timer), _) => {
                    WaitTarget { deadline: Some(timer.next_fire_time()), timer: Some(timer.id()) }
                },
                (None, deadline) => WaitTarget { deadline, timer: None },
            };
            tables.wait_target = Some(target);
            self.waiting.store(true, Ordering::Release);
            target
        };

        trace!(deadline = ?target.deadline, timer = ?target.timer, "waiting");
        let outcome = self.waiter.wait(target.deadline);

        lock(&self.tables).wait_target = None;
        self.waiting.store(false, Ordering::Release);
        trace!(?outcome, "done waiting");
        outcome
    }
}
