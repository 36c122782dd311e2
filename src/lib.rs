//! A cooperative, single-threaded run loop.
//!
//! A [`RunLoop`] multiplexes three kinds of work on the thread that owns it:
//!
//! - [`Timer`]s, which fire at an instant and optionally repeat;
//! - [`EventSource`]s, which fire after being [signaled][EventSource::signal] from any thread;
//! - [`Observer`]s, which fire when the loop reaches one of the phases described by [`Activity`].
//!
//! Each invocation of the loop dispatches the due timers, then the signaled sources, and then
//! blocks until the next timer is due or until something wakes it up. The loop returns with an
//! [`ExitReason`] once stopped, once its timeout elapses, or once there is nothing left to do.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use runloop::run_loop::{ExitReason, RunLoop, RunLoopExt};
//! use runloop::timer::Timer;
//!
//! let run_loop = RunLoop::new().unwrap();
//! let handle = run_loop.handle();
//!
//! let timer = Timer::after(Duration::from_millis(10), true, move |_| handle.stop());
//! run_loop.add_timer(&timer);
//!
//! assert_eq!(run_loop.run(), ExitReason::Stopped);
//! ```
//!
//! # Backends
//!
//! The loop blocks through a [`Waiter`]. On Linux, the BSDs and Android the default backend is a
//! self-pipe, elsewhere it is a condition variable. See [`RunLoopBuilder`] to pick one.
//!
//! # Cross-thread use
//!
//! A [`RunLoop`] never leaves its thread. Other threads use a [`RunLoopHandle`] to add and
//! remove work, wake the loop, or stop it. [`Timer`], [`EventSource`] and [`Observer`] are all
//! [`Send`] and [`Sync`].
//!
//! # Logging
//!
//! Every phase of the loop is logged through [`tracing`]. [`tracing_observer`] additionally
//! builds an [`Observer`] that reports each activity at the `TRACE` level.
//!
//! # Features
//!
//! - `serde`: Implements serialization/deserialization using [`serde`] for [`Activity`],
//!   [`ExitReason`] and [`Backend`].
//!
//! [`serde`]: https://docs.rs/serde
//! [`tracing`]: https://docs.rs/tracing
//! [`RunLoop`]: run_loop::RunLoop
//! [`RunLoopHandle`]: run_loop::RunLoopHandle
//! [`RunLoopBuilder`]: run_loop::RunLoopBuilder
//! [`ExitReason`]: run_loop::ExitReason
//! [`Backend`]: run_loop::Backend
//! [`Timer`]: timer::Timer
//! [`EventSource`]: event_source::EventSource
//! [`EventSource::signal`]: event_source::EventSource::signal
//! [`Observer`]: observer::Observer
//! [`Activity`]: observer::Activity
//! [`Waiter`]: wait::Waiter
//! [`tracing_observer`]: tracing_observer::tracing_observer

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use runloop_core::{error, event_source, observer, timer, wait};

pub mod run_loop;
pub mod tracing_observer;

mod platform_impl;
