use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use runloop::event_source::EventSource;
use runloop::observer::{Activity, Observer};
use runloop::run_loop::ExitReason;
use runloop::timer::Timer;

mod common;

/// A timer far enough in the future that a test only finishes early if the loop was woken.
fn far_timer() -> Timer {
    Timer::after(Duration::from_secs(60), false, |_| panic!("far timer fired"))
}

#[test]
fn stop_from_other_thread() {
    for (backend, run_loop) in common::run_loops() {
        let timer = far_timer();
        run_loop.add_timer(&timer);

        let handle = run_loop.handle();
        let stopper = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            handle.stop();
        });

        assert_eq!(run_loop.run(), ExitReason::Stopped, "{backend:?}");
        assert!(!run_loop.is_waiting(), "{backend:?}");
        stopper.join().unwrap();
        run_loop.remove_timer(&timer);
    }
}

#[test]
fn earlier_timer_added_while_waiting() {
    for (backend, run_loop) in common::run_loops() {
        let far = far_timer();
        run_loop.add_timer(&far);

        let handle = run_loop.handle();
        let fired_at = Arc::new(std::sync::Mutex::new(None));
        let fired_at_clone = Arc::clone(&fired_at);
        let adder = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            let stop = handle.clone();
            let timer = Timer::after(Duration::from_millis(20), false, move |timer| {
                *fired_at_clone.lock().unwrap() = Some((Instant::now(), timer.next_fire_time()));
                stop.stop();
            });
            handle.add_timer(&timer);
        });

        assert_eq!(run_loop.run(), ExitReason::Stopped, "{backend:?}");
        adder.join().unwrap();

        let (fired, scheduled) = fired_at.lock().unwrap().unwrap();
        assert!(fired >= scheduled, "{backend:?}");
        assert!(fired - scheduled < Duration::from_secs(10), "{backend:?}");
        run_loop.remove_timer(&far);
    }
}

#[test]
fn reschedule_waited_timer_from_other_thread() {
    for (backend, run_loop) in common::run_loops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let timer = Timer::after(Duration::from_secs(60), false, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        run_loop.add_timer(&timer);

        let handle = run_loop.handle();
        let rescheduler = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            timer.set_next_fire_interval(Duration::from_millis(5));
        });

        let start = Instant::now();
        assert_eq!(run_loop.run(), ExitReason::Finished, "{backend:?}");
        assert!(start.elapsed() < Duration::from_secs(30), "{backend:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{backend:?}");
        rescheduler.join().unwrap();
    }
}

#[test]
fn cancel_waited_timer_from_other_thread() {
    for (backend, run_loop) in common::run_loops() {
        let timer = far_timer();
        run_loop.add_timer(&timer);

        let handle = run_loop.handle();
        let timer_clone = timer.clone();
        let canceller = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            timer_clone.cancel();
        });

        assert_eq!(run_loop.run(), ExitReason::Finished, "{backend:?}");
        assert!(!run_loop.contains_timer(&timer), "{backend:?}");
        canceller.join().unwrap();
    }
}

#[test]
fn signal_from_other_thread() {
    for (backend, run_loop) in common::run_loops() {
        let owner = thread::current().id();
        let source = EventSource::new(move |source| {
            assert_eq!(thread::current().id(), owner);
            source.cancel();
        });
        run_loop.add_event_source(&source);

        let handle = run_loop.handle();
        let source_clone = source.clone();
        let signaler = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            source_clone.signal();
        });

        assert_eq!(run_loop.run(), ExitReason::Finished, "{backend:?}");
        signaler.join().unwrap();
    }
}

#[test]
fn many_signals_from_many_threads() {
    for (backend, run_loop) in common::run_loops() {
        let handle = run_loop.handle();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let source = EventSource::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        run_loop.add_event_source(&source);

        let signalers: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        source.signal();
                    }
                })
            })
            .collect();
        for signaler in signalers {
            signaler.join().unwrap();
        }
        handle.perform({
            let handle = handle.clone();
            move || handle.stop()
        });

        assert_eq!(run_loop.run(), ExitReason::Stopped, "{backend:?}");
        let calls = calls.load(Ordering::SeqCst);
        assert!((1..=400).contains(&calls), "{backend:?}: {calls}");
        assert!(!source.is_signaled(), "{backend:?}");
        run_loop.remove_event_source(&source);
    }
}

#[test]
fn perform_from_other_thread() {
    for (backend, run_loop) in common::run_loops() {
        let timer = far_timer();
        run_loop.add_timer(&timer);

        let owner = thread::current().id();
        let handle = run_loop.handle();
        let performer = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            let stop = handle.clone();
            handle.perform(move || {
                assert_eq!(thread::current().id(), owner);
                stop.stop();
            });
        });

        assert_eq!(run_loop.run(), ExitReason::Stopped, "{backend:?}");
        performer.join().unwrap();
        run_loop.remove_timer(&timer);
    }
}

#[test]
fn wake_up_reevaluates_without_returning() {
    for (backend, run_loop) in common::run_loops() {
        let handle = run_loop.handle();
        let waker = thread::spawn(move || {
            common::wait_until_waiting(&handle);
            handle.wake_up();
        });

        let timer = Timer::after(Duration::from_secs(60), false, |_| {});
        run_loop.add_timer(&timer);
        let start = Instant::now();
        let reason = run_loop.run_for(Some(Duration::from_millis(100)), false);
        assert_eq!(reason, ExitReason::TimedOut, "{backend:?}");
        assert!(start.elapsed() >= Duration::from_millis(100), "{backend:?}");
        waker.join().unwrap();
        run_loop.remove_timer(&timer);
    }
}

#[test]
fn source_added_while_about_to_wait() {
    for (backend, run_loop) in common::run_loops() {
        let timer = far_timer();
        run_loop.add_timer(&timer);

        let stop = run_loop.handle();
        let source = EventSource::new(move |_| stop.stop());
        source.signal();

        // Register from another thread after the source scan, but before the loop blocks.
        let handle = run_loop.handle();
        let late = source.clone();
        let observer = Observer::new(Activity::BEFORE_WAITING, false, move |_, _| {
            let handle = handle.clone();
            let late = late.clone();
            thread::spawn(move || handle.add_event_source(&late)).join().unwrap();
        });
        run_loop.add_observer(&observer);

        let start = Instant::now();
        assert_eq!(run_loop.run(), ExitReason::Stopped, "{backend:?}");
        assert!(start.elapsed() < Duration::from_secs(30), "{backend:?}");
        run_loop.remove_timer(&timer);
        run_loop.remove_event_source(&source);
    }
}

#[test]
fn last_timer_removed_while_about_to_wait() {
    for (backend, run_loop) in common::run_loops() {
        let timer = far_timer();
        run_loop.add_timer(&timer);

        let handle = run_loop.handle();
        let observer = Observer::new(Activity::BEFORE_WAITING, false, move |_, _| {
            let handle = handle.clone();
            let timer = timer.clone();
            thread::spawn(move || handle.remove_timer(&timer)).join().unwrap();
        });
        run_loop.add_observer(&observer);

        let start = Instant::now();
        assert_eq!(run_loop.run(), ExitReason::Finished, "{backend:?}");
        assert!(start.elapsed() < Duration::from_secs(30), "{backend:?}");
    }
}
