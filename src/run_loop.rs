//! The [`RunLoop`] and how to build one.
//!
//! The dispatch algorithm lives in [`runloop_core`]. This module adds backend selection through
//! [`RunLoopBuilder`], and the per-thread run loop returned by [`RunLoopExt::current`].

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use runloop_core::run_loop::{ExitReason, RunLoop, RunLoopHandle};

use crate::error::{NotSupportedError, RunLoopError};
use crate::platform_impl;
use crate::wait::Waiter;

/// The primitive a run loop blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Backend {
    /// A mutex and condition variable pair. Available everywhere.
    #[cfg_attr(not(pipe_backend), default)]
    Condvar,
    /// A non-blocking self-pipe polled with a timeout.
    ///
    /// ## Platform-specific
    ///
    /// Only available on Linux, the BSDs and Android.
    #[cfg_attr(pipe_backend, default)]
    Pipe,
}

impl Backend {
    /// Whether this backend can be used on the current platform.
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Condvar => true,
            Self::Pipe => cfg!(pipe_backend),
        }
    }
}

/// Object that allows configuring a run loop before creating it.
///
/// This can be created using [`RunLoopBuilder::new`] or [`RunLoopExt::builder`].
#[derive(Default)]
pub struct RunLoopBuilder {
    backend: Backend,
    waiter: Option<Arc<dyn Waiter>>,
}

impl RunLoopBuilder {
    /// Start building a new run loop, with the default backend for the platform.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the backend to block on.
    ///
    /// Ignored when a waiter was set with [`with_waiter`][Self::with_waiter].
    #[inline]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Block on a custom [`Waiter`] instead of one of the built-in backends.
    #[inline]
    pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Build a run loop bound to the calling thread.
    ///
    /// ## Errors
    ///
    /// - [`RunLoopError::NotSupported`] if the selected backend is not available on this
    ///   platform.
    /// - [`RunLoopError::Os`] if the backend could not allocate its wake primitive.
    pub fn build(self) -> Result<RunLoop, RunLoopError> {
        let _span = tracing::debug_span!("runloop::RunLoopBuilder::build", backend = ?self.backend)
            .entered();

        let waiter = match self.waiter {
            Some(waiter) => waiter,
            None if !self.backend.is_supported() => {
                return Err(NotSupportedError::new("the selected backend").into());
            },
            None => platform_impl::new_waiter(self.backend)?,
        };
        debug!(?waiter, "created run loop");

        Ok(RunLoop::with_waiter(waiter))
    }
}

impl fmt::Debug for RunLoopBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoopBuilder")
            .field("backend", &self.backend)
            .field("waiter", &self.waiter)
            .finish()
    }
}

thread_local! {
    static CURRENT: OnceCell<RunLoop> = const { OnceCell::new() };
}

/// Constructors for [`RunLoop`] that pick a platform backend.
pub trait RunLoopExt: Sized {
    /// Create a run loop bound to the calling thread, with the default backend.
    ///
    /// This is an alias of `RunLoop::builder().build()`.
    fn new() -> Result<Self, RunLoopError>;

    /// Start building a new run loop.
    fn builder() -> RunLoopBuilder;

    /// The run loop of the calling thread.
    ///
    /// It is created with the default backend the first time this is called on a thread, and
    /// every later call on that thread returns the same run loop.
    fn current() -> Result<Self, RunLoopError>;
}

impl RunLoopExt for RunLoop {
    #[inline]
    fn new() -> Result<Self, RunLoopError> {
        Self::builder().build()
    }

    #[inline]
    fn builder() -> RunLoopBuilder {
        RunLoopBuilder::new()
    }

    fn current() -> Result<Self, RunLoopError> {
        CURRENT.with(|current| {
            if let Some(run_loop) = current.get() {
                return Ok(run_loop.clone());
            }
            let run_loop = RunLoop::new()?;
            Ok(current.get_or_init(|| run_loop).clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::timer::Timer;
    use crate::wait::CondvarWaiter;

    #[test]
    fn default_backend_is_supported() {
        assert!(Backend::default().is_supported());
        assert!(Backend::Condvar.is_supported());
        assert_eq!(Backend::Pipe.is_supported(), cfg!(pipe_backend));
    }

    #[test]
    fn build_every_supported_backend() {
        for backend in [Backend::Condvar, Backend::Pipe] {
            let result = RunLoop::builder().with_backend(backend).build();
            if backend.is_supported() {
                let run_loop = result.unwrap();
                assert_eq!(run_loop.run(), ExitReason::Finished);
            } else {
                assert!(matches!(result, Err(RunLoopError::NotSupported(_))));
            }
        }
    }

    #[test]
    fn custom_waiter_overrides_backend() {
        let waiter: Arc<dyn Waiter> = Arc::new(CondvarWaiter::new());
        let run_loop =
            RunLoop::builder().with_backend(Backend::Pipe).with_waiter(waiter).build().unwrap();
        let start = Instant::now();
        run_loop.add_timer(&Timer::after(Duration::from_millis(5), false, |_| {}));
        assert_eq!(run_loop.run(), ExitReason::Finished);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn current_is_per_thread() {
        let run_loop = RunLoop::current().unwrap();
        let timer = Timer::after(Duration::from_secs(60), false, |_| {});
        run_loop.add_timer(&timer);
        assert!(RunLoop::current().unwrap().contains_timer(&timer));
        assert_eq!(run_loop.owner_thread(), std::thread::current().id());

        let timer_clone = timer.clone();
        std::thread::spawn(move || {
            let other = RunLoop::current().unwrap();
            assert!(!other.contains_timer(&timer_clone));
        })
        .join()
        .unwrap();

        run_loop.remove_timer(&timer);
    }
}
