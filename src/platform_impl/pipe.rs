//! A [`Waiter`] built on a non-blocking self-pipe.
//!
//! Waking writes a byte into the pipe, waiting polls the read end with a timeout. Bytes that
//! are never read stay in the pipe, so a wake up that happens before the wait is not lost.

use std::os::fd::OwnedFd;
use std::time::Instant;

use rustix::event::{poll, PollFd, PollFlags};
use rustix::io::{self, Errno};
use rustix::pipe::{pipe_with, PipeFlags};
use tracing::error;

use runloop_core::os_error;

use crate::error::OsError;
use crate::wait::{WaitOutcome, Waiter};

#[derive(Debug)]
pub(crate) struct PipeWaiter {
    read: OwnedFd,
    write: OwnedFd,
}

impl PipeWaiter {
    pub(crate) fn new() -> Result<Self, OsError> {
        let (read, write) =
            pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK).map_err(|err| os_error!(err))?;
        Ok(Self { read, write })
    }

    /// Empty the pipe, returning whether anything was in it.
    fn drain(&self) -> bool {
        let mut buf = [0u8; 64];
        let mut drained = false;
        loop {
            match io::read(&self.read, &mut buf) {
                Ok(0) => return drained,
                Ok(_) => drained = true,
                Err(Errno::INTR) => {},
                Err(Errno::AGAIN) => return drained,
                Err(err) => {
                    error!(%err, "failed to drain the wake pipe");
                    return drained;
                },
            }
        }
    }
}

/// Milliseconds until `deadline` for `poll`, rounded up so the wait never ends early.
fn poll_timeout(deadline: Option<Instant>, now: Instant) -> i32 {
    let Some(deadline) = deadline else {
        return -1;
    };
    let remaining = deadline.saturating_duration_since(now);
    let millis = remaining.as_nanos().div_ceil(1_000_000);
    i32::try_from(millis).unwrap_or(i32::MAX)
}

impl Waiter for PipeWaiter {
    fn wait(&self, deadline: Option<Instant>) -> WaitOutcome {
        loop {
            let now = Instant::now();
            let timeout = poll_timeout(deadline, now);

            let mut fds = [PollFd::new(&self.read, PollFlags::IN)];
            match poll(&mut fds, timeout) {
                Ok(0) => {},
                Ok(_) => {
                    if self.drain() {
                        return WaitOutcome::Woken;
                    }
                },
                Err(Errno::INTR) => {},
                Err(err) => {
                    // Report a spurious wake up, the run loop re-evaluates its state anyway.
                    error!(%err, "failed to poll the wake pipe");
                    return WaitOutcome::Woken;
                },
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return WaitOutcome::TimedOut;
            }
        }
    }

    fn wake_up(&self) {
        loop {
            match io::write(&self.write, &[1]) {
                // A full pipe already holds a pending wake up.
                Ok(_) | Err(Errno::AGAIN) => return,
                Err(Errno::INTR) => {},
                Err(err) => {
                    error!(%err, "failed to write to the wake pipe");
                    return;
                },
            }
        }
    }
}
