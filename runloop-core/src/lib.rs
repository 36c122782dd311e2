//! Base types for the run loop.
//!
//! This crate contains the scheduling entities ([`Timer`], [`EventSource`], [`Observer`]), the
//! dispatch algorithm ([`RunLoop`]) and the [`Waiter`] interface that every platform backend
//! implements. It is intended to allow alternative wait backends to be written without pulling in
//! the platform code of [`runloop`].
//!
//! [`runloop`]: https://docs.rs/runloop
//!
//! [`Timer`]: timer::Timer
//! [`EventSource`]: event_source::EventSource
//! [`Observer`]: observer::Observer
//! [`RunLoop`]: run_loop::RunLoop
//! [`Waiter`]: wait::Waiter

#[macro_use]
mod id;
mod registration;
mod sync;

pub mod error;
pub mod event_source;
pub mod observer;
pub mod run_loop;
pub mod timer;
pub mod wait;
