use tracing::{enabled, error, trace, Level};

use crate::observer::{Activity, Observer};

/// Create a run loop observer that emits a TRACE-level event for every activity.
///
/// This is useful when debugging run loops, it makes it easier to see in which run loop activity
/// an event is triggered inside (if any). Each event carries the nesting `depth` of the run loop
/// invocation, which is greater than one when a callback runs the loop recursively.
///
/// Returns `None` if TRACE events are disabled for this module.
pub fn tracing_observer() -> Option<Observer> {
    // HINT: You can use something like the following to emit relevant events:
    //
    // ```
    // tracing_subscriber::fmt()
    //     .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    //     .init();
    // ```

    // Observers are invoked on every pass, so don't create one if nobody would listen.
    if !enabled!(Level::TRACE) {
        return None;
    }

    // Run loops can be run recursively.
    let mut depth = 0usize;

    Some(Observer::new(Activity::ALL, true, move |_, activity| {
        if activity == Activity::ENTRY {
            depth += 1;
        }

        let phase = match activity {
            Activity::ENTRY => "entered run loop",
            Activity::BEFORE_TIMERS => "processing timers",
            Activity::BEFORE_SOURCES => "processing sources",
            Activity::BEFORE_WAITING => "waiting",
            Activity::AFTER_WAITING => "woke up",
            Activity::EXIT => "exiting run loop",
            activity => unreachable!("unexpected activity: {activity:?}"),
        };
        trace!(depth, "{phase}");

        if activity == Activity::EXIT {
            match depth.checked_sub(1) {
                Some(outer) => depth = outer,
                None => error!("unbalanced observer invocations"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_subscriber() {
        // No subscriber is installed for this thread.
        assert!(tracing_observer().is_none());
    }

    #[test]
    fn enabled_with_trace_subscriber() {
        let subscriber = tracing_subscriber::fmt().with_max_level(Level::TRACE).finish();
        tracing::subscriber::with_default(subscriber, || {
            let observer = tracing_observer().unwrap();
            assert_eq!(observer.activities(), Activity::ALL);
            assert!(observer.repeats());
        });
    }
}
