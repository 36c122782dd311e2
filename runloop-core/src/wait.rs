//! The interface between the dispatch algorithm and a platform's native wait facility.
//!
//! The [`RunLoop`] has exactly one suspension point: after dispatching due timers and signaled
//! sources it blocks until the next deadline or until something wakes it. Everything
//! platform-specific about that suspension lives behind [`Waiter`].
//!
//! [`RunLoop`]: crate::run_loop::RunLoop

use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::sync::lock;

/// Why [`Waiter::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// [`Waiter::wake_up`] was called, either during the wait or before it started.
    Woken,
    /// The deadline passed without a wake up.
    TimedOut,
}

/// A blocking wait primitive keyed to a monotonic deadline.
///
/// Implementations must uphold the following:
///
/// - [`wait`] returns no earlier than `deadline` unless woken. Spurious early returns are allowed
///   (the run loop re-evaluates its state anyway), but should be rare.
/// - A [`wake_up`] that happens while no thread is waiting is remembered, and makes the next
///   [`wait`] return [`WaitOutcome::Woken`] immediately. Multiple such calls coalesce into one.
/// - [`wake_up`] may be called from any thread, at any time, and never blocks for long.
///
/// [`wait`]: Self::wait
/// [`wake_up`]: Self::wake_up
pub trait Waiter: Send + Sync + fmt::Debug {
    /// Block the calling thread until `deadline`, or until woken.
    ///
    /// `None` means wait without a deadline.
    fn wait(&self, deadline: Option<Instant>) -> WaitOutcome;

    /// Interrupt a blocked [`wait`][Self::wait], or the next one if none is in progress.
    fn wake_up(&self);
}

/// The portable backend: a flag guarded by a [`Mutex`], and a [`Condvar`] to sleep on.
///
/// Construction cannot fail, which makes this the fallback on every platform.
#[derive(Debug, Default)]
pub struct CondvarWaiter {
    /// Set by [`wake_up`][Waiter::wake_up], consumed by [`wait`][Waiter::wait].
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarWaiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Waiter for CondvarWaiter {
    fn wait(&self, deadline: Option<Instant>) -> WaitOutcome {
        let mut pending = lock(&self.pending);
        loop {
            if *pending {
                *pending = false;
                return WaitOutcome::Woken;
            }

            pending = match deadline {
                None => self.condvar.wait(pending).unwrap_or_else(|err| err.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let (guard, _) = self
                        .condvar
                        .wait_timeout(pending, deadline - now)
                        .unwrap_or_else(|err| err.into_inner());
                    guard
                },
            };
        }
    }

    fn wake_up(&self) {
        *lock(&self.pending) = true;
        self.condvar.notify_all();
    }
}
