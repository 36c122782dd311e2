//! The [`RunLoop`] and its cross-thread [`RunLoopHandle`].

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::{fmt, thread};

use tracing::{trace, warn};

use crate::event_source::EventSource;
use crate::observer::{Activity, Observer};
use crate::sync::lock;
use crate::timer::{Timer, TimerId};
use crate::wait::Waiter;

mod dispatch;

/// Why a run loop invocation returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExitReason {
    /// The run loop has no timers or event sources left.
    Finished,
    /// [`RunLoopHandle::stop`] was called.
    Stopped,
    /// The timeout given to [`RunLoop::run_for`] elapsed.
    TimedOut,
    /// A single event source fired, and the caller asked to return after that.
    HandledOneSource,
}

/// A cooperative, single-threaded dispatcher for [`Timer`]s, [`EventSource`]s and [`Observer`]s.
///
/// The run loop is bound to the thread that created it: it is neither [`Send`] nor [`Sync`], and
/// callbacks only ever run on that thread, one at a time. Other threads interact with it through
/// a [`RunLoopHandle`], obtained with [`RunLoop::handle`], which can register and remove work,
/// wake the loop up and stop it.
///
/// Each dispatch pass fires the due timers in ascending fire-time order, then the signaled
/// sources, then blocks until the earliest timer deadline or until woken.
///
/// Clones refer to the same run loop.
#[derive(Clone)]
pub struct RunLoop {
    handle: RunLoopHandle,
    _marker: PhantomData<*mut ()>, // Not Send nor Sync
}

/// Control a [`RunLoop`], possibly from a different thread, without owning it.
///
/// Every mutation that could change what the run loop is waiting for wakes it up, so it never
/// oversleeps.
#[derive(Clone)]
pub struct RunLoopHandle {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    tables: Mutex<Tables>,
    waiter: Arc<dyn Waiter>,
    waiting: AtomicBool,
    stop_requested: AtomicBool,
    owner_thread: thread::ThreadId,
}

#[derive(Default)]
struct Tables {
    /// Sorted by ascending fire time, then registration order.
    timers: Vec<ScheduledTimer>,
    next_timer_seq: u64,
    sources: Vec<EventSource>,
    observers: Vec<Observer>,
    /// Union of the activities of all registered observers.
    observer_mask: Activity,
    /// What the run loop is blocked on, only set while waiting.
    wait_target: Option<WaitTarget>,
}

struct ScheduledTimer {
    seq: u64,
    timer: Timer,
}

#[derive(Debug, Clone, Copy)]
struct WaitTarget {
    deadline: Option<Instant>,
    timer: Option<TimerId>,
}

impl RunLoop {
    /// Create a run loop bound to the calling thread, blocking with the given backend.
    pub fn with_waiter(waiter: Arc<dyn Waiter>) -> Self {
        let shared = Shared {
            tables: Mutex::new(Tables::default()),
            waiter,
            waiting: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            owner_thread: thread::current().id(),
        };
        Self { handle: RunLoopHandle { shared: Arc::new(shared) }, _marker: PhantomData }
    }

    /// A handle that can be sent to other threads.
    pub fn handle(&self) -> RunLoopHandle {
        self.handle.clone()
    }

    /// The thread this run loop belongs to.
    pub fn owner_thread(&self) -> thread::ThreadId {
        self.handle.shared.owner_thread
    }

    /// Run until [stopped][RunLoopHandle::stop], or until no timers or sources remain.
    pub fn run(&self) -> ExitReason {
        loop {
            match self.run_for(None, false) {
                reason @ (ExitReason::Stopped | ExitReason::Finished) => return reason,
                ExitReason::TimedOut | ExitReason::HandledOneSource => {},
            }
        }
    }

    /// Run the loop once, with an optional timeout.
    ///
    /// A timeout of [`Duration::ZERO`] dispatches whatever is ready without blocking. With
    /// `return_after_source_handled`, the invocation returns as soon as a single event source
    /// has fired; timers never cause an early return.
    pub fn run_for(
        &self,
        timeout: Option<Duration>,
        return_after_source_handled: bool,
    ) -> ExitReason {
        self.handle.shared.run_internal(timeout, return_after_source_handled)
    }

    #[inline]
    pub fn stop(&self) {
        self.handle.stop();
    }

    #[inline]
    pub fn wake_up(&self) {
        self.handle.wake_up();
    }

    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.handle.is_waiting()
    }

    #[inline]
    pub fn perform<F: FnOnce() + Send + 'static>(&self, f: F) {
        self.handle.perform(f);
    }

    #[inline]
    pub fn add_timer(&self, timer: &Timer) {
        self.handle.add_timer(timer);
    }

    #[inline]
    pub fn remove_timer(&self, timer: &Timer) {
        self.handle.remove_timer(timer);
    }

    #[inline]
    pub fn contains_timer(&self, timer: &Timer) -> bool {
        self.handle.contains_timer(timer)
    }

    #[inline]
    pub fn add_event_source(&self, source: &EventSource) {
        self.handle.add_event_source(source);
    }

    #[inline]
    pub fn remove_event_source(&self, source: &EventSource) {
        self.handle.remove_event_source(source);
    }

    #[inline]
    pub fn contains_event_source(&self, source: &EventSource) -> bool {
        self.handle.contains_event_source(source)
    }

    #[inline]
    pub fn add_observer(&self, observer: &Observer) {
        self.handle.add_observer(observer);
    }

    #[inline]
    pub fn remove_observer(&self, observer: &Observer) {
        self.handle.remove_observer(observer);
    }

    #[inline]
    pub fn contains_observer(&self, observer: &Observer) -> bool {
        self.handle.contains_observer(observer)
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("owner_thread", &self.owner_thread())
            .field("waiting", &self.is_waiting())
            .finish_non_exhaustive()
    }
}

impl RunLoopHandle {
    /// Ask the run loop to return [`ExitReason::Stopped`].
    ///
    /// This is not synchronous: a callback that is already running completes first. If no
    /// invocation is in progress, the next one returns immediately.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.waiter.wake_up();
    }

    /// Force a blocked run loop to re-evaluate its timers and sources.
    pub fn wake_up(&self) {
        self.shared.wake_up();
    }

    /// Whether the run loop is currently blocked waiting for a deadline or a wake up.
    pub fn is_waiting(&self) -> bool {
        self.shared.waiting.load(Ordering::Acquire)
    }

    /// Run `f` on the run loop's thread during its next dispatch pass.
    ///
    /// `f` is never invoked synchronously, even when called from the run loop's own thread.
    pub fn perform<F: FnOnce() + Send + 'static>(&self, f: F) {
        let mut f = Some(f);
        let source = EventSource::new(move |source| {
            if let Some(f) = f.take() {
                f();
            }
            // The run loop drops cancelled sources right after their callback returns.
            source.cancel();
        });
        self.add_event_source(&source);
        source.signal();
    }

    /// Register a timer. Adding a timer twice is the same as adding it once.
    ///
    /// Cancelled timers, and timers registered with another run loop, are ignored.
    pub fn add_timer(&self, timer: &Timer) {
        if timer.is_cancelled() {
            return;
        }

        let mut tables = lock(&self.shared.tables);
        if tables.contains_timer(timer.id()) {
            return;
        }
        if !timer.registration().claim(&self.shared) {
            warn!(id = ?timer.id(), "timer is already registered with another run loop");
            return;
        }

        let seq = tables.next_timer_seq;
        tables.next_timer_seq += 1;
        tables.timers.push(ScheduledTimer { seq, timer: timer.clone() });
        tables.sort_timers();
        trace!(id = ?timer.id(), "added timer");

        let fire_time = timer.next_fire_time();
        if tables.wait_target.is_some_and(|target| target.is_later_than(fire_time)) {
            drop(tables);
            self.shared.wake_up();
        }
    }

    /// Unregister a timer without cancelling it.
    pub fn remove_timer(&self, timer: &Timer) {
        self.shared.remove_timer(timer.id());
    }

    pub fn contains_timer(&self, timer: &Timer) -> bool {
        lock(&self.shared.tables).contains_timer(timer.id())
    }

    /// Register an event source. Adding a source twice is the same as adding it once.
    ///
    /// A source signaled before registration fires on the next dispatch pass.
    pub fn add_event_source(&self, source: &EventSource) {
        if source.is_cancelled() {
            return;
        }

        let mut tables = lock(&self.shared.tables);
        if tables.sources.contains(source) {
            return;
        }
        if !source.registration().claim(&self.shared) {
            warn!(id = ?source.id(), "event source is already registered with another run loop");
            return;
        }

        tables.sources.push(source.clone());
        trace!(id = ?source.id(), "added event source");
        drop(tables);

        // The loop may be past its source scan but not yet blocked, the waiter remembers the wake.
        self.shared.wake_up();
    }

    /// Unregister an event source without cancelling it.
    pub fn remove_event_source(&self, source: &EventSource) {
        self.shared.remove_event_source(source);
    }

    pub fn contains_event_source(&self, source: &EventSource) -> bool {
        lock(&self.shared.tables).sources.contains(source)
    }

    /// Register an observer. Adding an observer twice is the same as adding it once.
    pub fn add_observer(&self, observer: &Observer) {
        if observer.is_cancelled() {
            return;
        }

        let mut tables = lock(&self.shared.tables);
        if tables.observers.contains(observer) {
            return;
        }
        if !observer.registration().claim(&self.shared) {
            warn!(id = ?observer.id(), "observer is already registered with another run loop");
            return;
        }

        tables.observers.push(observer.clone());
        tables.observer_mask |= observer.activities();
        trace!(id = ?observer.id(), activities = ?observer.activities(), "added observer");
    }

    /// Unregister an observer without cancelling it.
    pub fn remove_observer(&self, observer: &Observer) {
        self.shared.remove_observer(observer);
    }

    pub fn contains_observer(&self, observer: &Observer) -> bool {
        lock(&self.shared.tables).observers.contains(observer)
    }
}

impl fmt::Debug for RunLoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoopHandle")
            .field("owner_thread", &self.shared.owner_thread)
            .field("waiter", &self.shared.waiter)
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn wake_up(&self) {
        self.waiter.wake_up();
    }

    /// A registered timer got a new fire time.
    pub(crate) fn timer_rescheduled(&self, id: TimerId, fire_time: Instant) {
        let mut tables = lock(&self.tables);
        if !tables.contains_timer(id) {
            return;
        }
        tables.sort_timers();

        let wake = tables
            .wait_target
            .is_some_and(|target| target.timer == Some(id) || target.is_later_than(fire_time));
        drop(tables);
        if wake {
            self.wake_up();
        }
    }

    /// A registered timer was cancelled.
    ///
    /// The timer itself is purged on the next pass or right before blocking.
    pub(crate) fn timer_invalidated(&self, id: TimerId) {
        trace!(?id, "registered timer cancelled");
        self.wake_up();
    }

    /// A registered event source was cancelled.
    pub(crate) fn source_invalidated(&self) {
        self.wake_up();
    }

    fn remove_timer(&self, id: TimerId) {
        // Wake even when not blocked yet: the loop may already have passed its idle check.
        if self.unregister_timer(id) {
            self.wake_up();
        }
    }

    fn remove_event_source(&self, source: &EventSource) {
        if self.unregister_event_source(source) {
            self.wake_up();
        }
    }

    /// Drop a timer from the tables without waking the loop.
    fn unregister_timer(&self, id: TimerId) -> bool {
        let mut tables = lock(&self.tables);
        let Some(index) = tables.timers.iter().position(|scheduled| scheduled.timer.id() == id)
        else {
            return false;
        };
        tables.timers.remove(index).timer.registration().release();
        trace!(?id, "removed timer");
        true
    }

    /// Drop an event source from the tables without waking the loop.
    fn unregister_event_source(&self, source: &EventSource) -> bool {
        let mut tables = lock(&self.tables);
        let Some(index) = tables.sources.iter().position(|registered| registered == source) else {
            return false;
        };
        tables.sources.remove(index).registration().release();
        trace!(id = ?source.id(), "removed event source");
        true
    }

    fn remove_observer(&self, observer: &Observer) {
        let mut tables = lock(&self.tables);
        let Some(index) = tables.observers.iter().position(|registered| registered == observer)
        else {
            return;
        };
        tables.observers.remove(index).registration().release();
        tables.recompute_observer_mask();
        trace!(id = ?observer.id(), "removed observer");
    }
}

impl Tables {
    fn contains_timer(&self, id: TimerId) -> bool {
        self.timers.iter().any(|scheduled| scheduled.timer.id() == id)
    }

    fn sort_timers(&mut self) {
        self.timers
            .sort_by_cached_key(|scheduled| (scheduled.timer.next_fire_time(), scheduled.seq));
    }

    fn recompute_observer_mask(&mut self) {
        self.observer_mask = self
            .observers
            .iter()
            .fold(Activity::empty(), |mask, observer| mask | observer.activities());
    }

    fn is_idle(&self) -> bool {
        self.timers.is_empty() && self.sources.is_empty()
    }

    /// Drop cancelled timers and sources, and release their registrations.
    fn purge_cancelled(&mut self) {
        self.timers.retain(|scheduled| {
            let keep = !scheduled.timer.is_cancelled();
            if !keep {
                scheduled.timer.registration().release();
            }
            keep
        });
        self.sources.retain(|source| {
            let keep = !source.is_cancelled();
            if !keep {
                source.registration().release();
            }
            keep
        });
    }

    fn purge_cancelled_observers(&mut self) {
        let before = self.observers.len();
        self.observers.retain(|observer| {
            let keep = !observer.is_cancelled();
            if !keep {
                observer.registration().release();
            }
            keep
        });
        if self.observers.len() != before {
            self.recompute_observer_mask();
        }
    }
}

impl WaitTarget {
    /// Whether something due at `instant` needs an earlier wake up than this target.
    fn is_later_than(&self, instant: Instant) -> bool {
        self.deadline.map_or(true, |deadline| instant < deadline)
    }
}
