#[allow(dead_code)]
fn needs_sync<T: Sync + ?Sized>() {}

#[test]
fn run_loop_handle_sync() {
    needs_sync::<runloop::run_loop::RunLoopHandle>();
}

#[test]
fn entities_sync() {
    needs_sync::<runloop::timer::Timer>();
    needs_sync::<runloop::event_source::EventSource>();
    needs_sync::<runloop::observer::Observer>();
}

#[test]
fn waiter_sync() {
    needs_sync::<dyn runloop::wait::Waiter>();
    needs_sync::<runloop::wait::CondvarWaiter>();
}
