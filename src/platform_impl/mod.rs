use std::sync::Arc;

use crate::error::RunLoopError;
use crate::run_loop::Backend;
use crate::wait::{CondvarWaiter, Waiter};

#[cfg(pipe_backend)]
mod pipe;

#[cfg(pipe_backend)]
pub(crate) use self::pipe::PipeWaiter;

/// Create the wait primitive for a backend that [is supported][Backend::is_supported].
pub(crate) fn new_waiter(backend: Backend) -> Result<Arc<dyn Waiter>, RunLoopError> {
    match backend {
        Backend::Condvar => Ok(Arc::new(CondvarWaiter::new())),
        #[cfg(pipe_backend)]
        Backend::Pipe => Ok(Arc::new(PipeWaiter::new()?)),
        #[cfg(not(pipe_backend))]
        Backend::Pipe => {
            Err(crate::error::NotSupportedError::new("the pipe backend").into())
        },
    }
}
