//! Edge-triggered, cross-thread signalable callbacks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::registration::Registration;
use crate::sync::try_lock;

entity_id!(
    /// Identifies an [`EventSource`] and all of its clones.
    SourceId
);

/// The callback invoked when an [`EventSource`] fires.
pub type EventSourceCallback = Box<dyn FnMut(&EventSource) + Send + 'static>;

/// A one-bit wake signal with a callback.
///
/// [`signal`] may be called from any thread, any number of times: signals that arrive before the
/// run loop gets to the source coalesce into a single invocation of the callback.
///
/// Like [`Timer`], this is a handle with identity semantics.
///
/// [`signal`]: Self::signal
/// [`Timer`]: crate::timer::Timer
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<Inner>,
}

struct Inner {
    id: SourceId,
    signaled: AtomicBool,
    cancelled: AtomicBool,
    callback: Mutex<EventSourceCallback>,
    registration: Registration,
}

impl EventSource {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&EventSource) + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                id: SourceId::next(),
                signaled: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                callback: Mutex::new(Box::new(callback)),
                registration: Registration::default(),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Mark the source as pending, and wake the run loop it is registered with.
    ///
    /// Signaling a source before it is registered is allowed, it fires on the first pass after
    /// registration. Signaling a cancelled source does nothing.
    pub fn signal(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.signaled.store(true, Ordering::Release);
        // Wake unconditionally: the loop may be just about to go to sleep, and the wait primitive
        // coalesces redundant wake ups.
        if let Some(owner) = self.inner.registration.owner() {
            owner.wake_up();
        }
    }

    /// Whether the source has been signaled, and not yet consumed by a run loop.
    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Cancel the source permanently.
    ///
    /// A pending signal is discarded. This is idempotent and may be called from any thread,
    /// including from the source's own callback.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.signaled.store(false, Ordering::Release);
        if let Some(owner) = self.inner.registration.owner() {
            owner.source_invalidated();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn registration(&self) -> &Registration {
        &self.inner.registration
    }

    /// Atomically test and clear the pending flag.
    pub(crate) fn take_signal(&self) -> bool {
        !self.is_cancelled() && self.inner.signaled.swap(false, Ordering::AcqRel)
    }

    /// Put back a signal consumed by [`take_signal`][Self::take_signal] that could not be
    /// delivered.
    pub(crate) fn restore_signal(&self) {
        if !self.is_cancelled() {
            self.inner.signaled.store(true, Ordering::Release);
        }
    }

    /// Invoke the callback, unless it is already running further up the stack.
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

impl PartialEq for EventSource {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EventSource {}

impl std::hash::Hash for EventSource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("id", &self.id())
            .field("signaled", &self.is_signaled())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
