//! Hooks into the phases of the run loop itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::registration::Registration;
use crate::sync::try_lock;

bitflags! {
    /// The phases of a run loop invocation that an [`Observer`] can subscribe to.
    ///
    /// The order of activities observed when a loop waits twice and then exits looks like:
    ///
    /// - [`ENTRY`]
    /// - [`BEFORE_TIMERS`] (only when timers are due)
    /// - [`BEFORE_SOURCES`] (only when sources are signaled)
    /// - [`BEFORE_WAITING`]
    /// - [`AFTER_WAITING`]
    /// - [`BEFORE_TIMERS`]
    /// - [`BEFORE_SOURCES`]
    /// - [`BEFORE_WAITING`]
    /// - [`AFTER_WAITING`]
    /// - [`EXIT`]
    ///
    /// [`ENTRY`]: Self::ENTRY
    /// [`BEFORE_TIMERS`]: Self::BEFORE_TIMERS
    /// [`BEFORE_SOURCES`]: Self::BEFORE_SOURCES
    /// [`BEFORE_WAITING`]: Self::BEFORE_WAITING
    /// [`AFTER_WAITING`]: Self::AFTER_WAITING
    /// [`EXIT`]: Self::EXIT
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Activity: u32 {
        /// The run loop was entered.
        const ENTRY = 1 << 0;
        /// Due timers are about to fire.
        const BEFORE_TIMERS = 1 << 1;
        /// Signaled event sources are about to fire.
        const BEFORE_SOURCES = 1 << 2;
        /// The run loop is about to block.
        const BEFORE_WAITING = 1 << 5;
        /// The run loop stopped blocking, because of a deadline or a wake up.
        const AFTER_WAITING = 1 << 6;
        /// The run loop invocation is about to return.
        const EXIT = 1 << 7;
        const ALL = Self::ENTRY.bits()
            | Self::BEFORE_TIMERS.bits()
            | Self::BEFORE_SOURCES.bits()
            | Self::BEFORE_WAITING.bits()
            | Self::AFTER_WAITING.bits()
            | Self::EXIT.bits();
    }
}

entity_id!(
    /// Identifies an [`Observer`] and all of its clones.
    ObserverId
);

/// The callback invoked when an [`Observer`] fires, with the activity that triggered it.
pub type ObserverCallback = Box<dyn FnMut(&Observer, Activity) + Send + 'static>;

/// A callback bound to specific phases of the run loop.
///
/// Observers are invoked synchronously on the run loop's thread, in registration order, when the
/// loop reaches one of the observed [`Activity`] phases. A non-repeating observer is removed
/// from its run loop right after it fires once.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<Inner>,
}

struct Inner {
    id: ObserverId,
    activities: Activity,
    repeats: bool,
    cancelled: AtomicBool,
    callback: Mutex<ObserverCallback>,
    registration: Registration,
}

impl Observer {
    pub fn new<F>(activities: Activity, repeats: bool, callback: F) -> Self
    where
        F: FnMut(&Observer, Activity) + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                id: ObserverId::next(),
                activities,
                repeats,
                cancelled: AtomicBool::new(false),
                callback: Mutex::new(Box::new(callback)),
                registration: Registration::default(),
            }),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// The activities this observer is interested in.
    pub fn activities(&self) -> Activity {
        self.inner.activities
    }

    pub fn repeats(&self) -> bool {
        self.inner.repeats
    }

    /// Cancel the observer, so it never fires again.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn registration(&self) -> &Registration {
        &self.inner.registration
    }

    pub(crate) fn fire(&self, activity: Activity) -> bool {
        match try_lock(&self.inner.callback) {
            Some(mut callback) => {
                (*callback)(self, activity);
                true
            },
            None => false,
        }
    }
}

impl PartialEq for Observer {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Observer {}

impl std::hash::Hash for Observer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id())
            .field("activities", &self.activities())
            .field("repeats", &self.repeats())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_activities() {
        assert_eq!(Activity::ALL.bits(), 0b1110_0111);
        assert!(Activity::ALL.contains(Activity::EXIT | Activity::ENTRY));
        assert!(!Activity::ENTRY.intersects(Activity::EXIT));
    }

    #[test]
    fn fire_reports_activity() {
        let observer = Observer::new(Activity::ENTRY | Activity::EXIT, false, |observer, activity| {
            assert!(observer.activities().contains(activity));
            assert_eq!(activity, Activity::EXIT);
        });
        assert!(!observer.repeats());
        assert!(observer.fire(Activity::EXIT));
    }

    #[test]
    fn cancel_is_idempotent() {
        let observer = Observer::new(Activity::ALL, true, |_, _| {});
        observer.cancel();
        observer.cancel();
        assert!(observer.is_cancelled());
    }
}
