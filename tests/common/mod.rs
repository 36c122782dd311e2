#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use runloop::run_loop::{Backend, RunLoop, RunLoopExt, RunLoopHandle};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One run loop per backend available on this platform.
pub fn run_loops() -> Vec<(Backend, RunLoop)> {
    init_tracing();
    [Backend::Condvar, Backend::Pipe]
        .into_iter()
        .filter(|backend| backend.is_supported())
        .map(|backend| (backend, RunLoop::builder().with_backend(backend).build().unwrap()))
        .collect()
}

/// Block until the run loop behind `handle` is waiting.
pub fn wait_until_waiting(handle: &RunLoopHandle) {
    let start = Instant::now();
    while !handle.is_waiting() {
        assert!(start.elapsed() < Duration::from_secs(10), "run loop never started waiting");
        thread::sleep(Duration::from_millis(1));
    }
}
