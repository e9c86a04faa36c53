//! The concurrent-access guard: service calls issued from inside a callback
//! delivery are rejected instead of deadlocking or corrupting state.

use std::sync::{Arc, Mutex};

use fedra_federate::{DrainMode, EventSink, Federate};
use fedra_shared::{
    EventKind, FederateHandle, FederationError, GuardError, InteractionClassHandle, PendingEvent,
};
use fedra_test::Harness;

const ME: FederateHandle = FederateHandle::new(1);

#[test]
fn facade_is_shareable_with_the_transport_thread() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Federate>();
}

#[test]
fn admit_from_another_thread_wakes_a_blocking_drain() {
    let harness = Harness::joined(ME);
    let federate = harness.federate.clone();
    let transport_side = std::thread::spawn(move || {
        federate.admit(PendingEvent::receive_ordered(EventKind::Interaction {
            class: InteractionClassHandle::new(9),
        }));
    });

    let delivered = harness.federate.drain(DrainMode::Blocking).unwrap();
    assert_eq!(delivered, 1);
    transport_side.join().unwrap();
}

/// Sink that re-enters the facade from inside `on_event`.
struct ReentrantSink {
    federate: Arc<Federate>,
    results: Arc<Mutex<Vec<Result<(), FederationError>>>>,
}

impl EventSink for ReentrantSink {
    fn on_event(&mut self, _event: PendingEvent) {
        let result = self.federate.time_advance_request(1.0);
        self.results.lock().unwrap().push(result);
    }
}

#[test]
fn service_calls_from_inside_a_callback_are_rejected() {
    let harness = Harness::joined(ME);
    let results = Arc::new(Mutex::new(Vec::new()));
    harness.federate.set_event_sink(Box::new(ReentrantSink {
        federate: harness.federate.clone(),
        results: results.clone(),
    }));

    harness.federate.admit(PendingEvent::receive_ordered(
        EventKind::Interaction {
            class: InteractionClassHandle::new(9),
        },
    ));
    let delivered = harness.federate.drain(DrainMode::NonBlocking).unwrap();
    assert_eq!(delivered, 1);

    let results = results.lock().unwrap();
    assert_eq!(
        results.as_slice(),
        [Err(FederationError::Guard(
            GuardError::ConcurrentAccessAttempted
        ))]
    );
}

#[test]
fn events_enqueued_by_a_callback_wait_for_the_next_drain() {
    // a sink that admits a new event while one is being delivered would
    // recurse forever if the drain did not snapshot its budget
    struct FeedingSink {
        federate: Arc<Federate>,
        delivered: Arc<Mutex<usize>>,
    }

    impl EventSink for FeedingSink {
        fn on_event(&mut self, _event: PendingEvent) {
            *self.delivered.lock().unwrap() += 1;
            if *self.delivered.lock().unwrap() == 1 {
                self.federate.admit(PendingEvent::receive_ordered(
                    EventKind::Interaction {
                        class: InteractionClassHandle::new(9),
                    },
                ));
            }
        }
    }

    let harness = Harness::joined(ME);
    let delivered = Arc::new(Mutex::new(0));
    harness.federate.set_event_sink(Box::new(FeedingSink {
        federate: harness.federate.clone(),
        delivered: delivered.clone(),
    }));

    harness.federate.admit(PendingEvent::receive_ordered(
        EventKind::Interaction {
            class: InteractionClassHandle::new(9),
        },
    ));

    let first_pass = harness.federate.drain(DrainMode::NonBlocking).unwrap();
    assert_eq!(first_pass, 1);
    let second_pass = harness.federate.drain(DrainMode::NonBlocking).unwrap();
    assert_eq!(second_pass, 1);
    assert_eq!(*delivered.lock().unwrap(), 2);
}

#[test]
fn bounded_drain_respects_its_maximum() {
    let harness = Harness::joined(ME);
    for _ in 0..4 {
        harness.federate.admit(PendingEvent::receive_ordered(
            EventKind::Interaction {
                class: InteractionClassHandle::new(9),
            },
        ));
    }

    let delivered = harness
        .federate
        .drain(DrainMode::Bounded { min: 0, max: 3 })
        .unwrap();
    assert_eq!(delivered, 3);
    let rest = harness.federate.drain(DrainMode::NonBlocking).unwrap();
    assert_eq!(rest, 1);
}
