//! Full-facade time management flow: regulation/constrained enables, the
//! LBTS gate, and the ordering guarantee that a strict grant delivers every
//! in-window TSO event ahead of the grant notice.

use fedra_shared::{
    ErrorKind, EventKind, FederateHandle, FederationError, GuardError, InteractionClassHandle,
    LogicalTime, TimeError, TimeNotice,
};
use fedra_test::Harness;

const ME: FederateHandle = FederateHandle::new(1);
const PEER: FederateHandle = FederateHandle::new(2);

fn admit_time(harness: &Harness, notice: TimeNotice) {
    harness
        .federate
        .admit(fedra_shared::PendingEvent::receive_ordered(EventKind::Time(
            notice,
        )));
}

fn regulating_constrained(lookahead: f64) -> Harness {
    let harness = Harness::joined(ME);
    harness
        .federate
        .enable_time_regulation(0.0, lookahead)
        .unwrap();
    admit_time(&harness, TimeNotice::RegulationEnabled {
        time: LogicalTime::ZERO,
    });
    harness.federate.enable_time_constrained().unwrap();
    admit_time(&harness, TimeNotice::ConstrainedEnabled {
        time: LogicalTime::ZERO,
    });
    harness.drain();
    harness.take_requests();
    harness
}

#[test]
fn strict_advance_delivers_tso_before_grant_notice() {
    let _ = env_logger::builder().is_test(true).try_init();
    let harness = regulating_constrained(1.0);

    // a TSO interaction at t=2.0, inside the requested window
    harness.federate.admit(
        fedra_shared::PendingEvent::timestamped(
            EventKind::Interaction {
                class: InteractionClassHandle::new(9),
            },
            LogicalTime::new(2.0).unwrap(),
        )
        .with_origin(PEER),
    );

    // the peer only guarantees up to 2.5; the advance must wait
    harness
        .federate
        .publish_time_contribution(PEER, Some(LogicalTime::new(2.5).unwrap()));
    harness.federate.time_advance_request(3.0).unwrap();
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::ZERO
    );
    assert!(harness.drain().is_empty());

    // the peer advances past the request; the grant fires
    harness
        .federate
        .publish_time_contribution(PEER, Some(LogicalTime::new(4.0).unwrap()));
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::new(3.0).unwrap()
    );

    let delivered = harness.drain();
    let interaction_at = delivered
        .iter()
        .position(|event| matches!(event.kind, EventKind::Interaction { .. }))
        .expect("interaction delivered");
    let grant_at = delivered
        .iter()
        .position(|event| {
            matches!(
                event.kind,
                EventKind::Time(TimeNotice::AdvanceGrant { .. })
            )
        })
        .expect("grant notice delivered");
    assert!(interaction_at < grant_at);
}

#[test]
fn grant_waits_for_every_regulating_peer() {
    let harness = regulating_constrained(0.5);
    let other = FederateHandle::new(3);

    harness
        .federate
        .publish_time_contribution(PEER, Some(LogicalTime::new(10.0).unwrap()));
    harness
        .federate
        .publish_time_contribution(other, Some(LogicalTime::new(1.0).unwrap()));

    harness.federate.time_advance_request(2.0).unwrap();
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::ZERO
    );

    // the slow peer catches up
    harness
        .federate
        .publish_time_contribution(other, Some(LogicalTime::new(2.0).unwrap()));
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::new(2.0).unwrap()
    );
}

#[test]
fn second_advance_while_one_is_outstanding_is_rejected() {
    let harness = regulating_constrained(1.0);
    harness
        .federate
        .publish_time_contribution(PEER, Some(LogicalTime::new(1.0).unwrap()));

    harness.federate.time_advance_request(5.0).unwrap();
    let err = harness.federate.time_advance_request(6.0).unwrap_err();
    assert_eq!(
        err,
        FederationError::Guard(GuardError::TimeAdvanceAlreadyInProgress)
    );
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn time_never_moves_backwards() {
    let harness = Harness::joined(ME);

    // unconstrained: grants immediately
    harness.federate.time_advance_request(3.0).unwrap();
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::new(3.0).unwrap()
    );

    assert_eq!(
        harness.federate.time_advance_request(2.0).unwrap_err(),
        FederationError::Time(TimeError::FederationTimeAlreadyPassed {
            requested: 2.0,
            current: 3.0
        })
    );
}

#[test]
fn next_event_request_grants_at_the_queued_event() {
    let harness = Harness::joined(ME);

    harness.federate.admit(fedra_shared::PendingEvent::timestamped(
        EventKind::Interaction {
            class: InteractionClassHandle::new(9),
        },
        LogicalTime::new(2.0).unwrap(),
    ));

    harness.federate.next_event_request(5.0).unwrap();
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::new(2.0).unwrap()
    );
}

#[test]
fn flush_queue_ignores_the_lbts_gate() {
    let harness = regulating_constrained(0.0);
    harness
        .federate
        .publish_time_contribution(PEER, Some(LogicalTime::ZERO));

    harness.federate.admit(fedra_shared::PendingEvent::timestamped(
        EventKind::Interaction {
            class: InteractionClassHandle::new(9),
        },
        LogicalTime::new(4.0).unwrap(),
    ));

    harness.federate.flush_queue_request(6.0).unwrap();
    assert_eq!(
        harness.federate.query_federate_time().unwrap(),
        LogicalTime::new(6.0).unwrap()
    );
    let delivered = harness.drain();
    assert!(delivered
        .iter()
        .any(|event| matches!(event.kind, EventKind::Interaction { .. })));
}

#[test]
fn advance_is_rejected_while_an_enable_is_pending() {
    let harness = Harness::joined(ME);
    harness.federate.enable_time_regulation(0.0, 1.0).unwrap();

    // no confirmation admitted yet
    assert_eq!(
        harness.federate.time_advance_request(1.0).unwrap_err(),
        FederationError::Time(TimeError::EnableTimeRegulationPending)
    );

    admit_time(&harness, TimeNotice::RegulationEnabled {
        time: LogicalTime::ZERO,
    });
    assert!(harness.federate.time_advance_request(1.0).is_ok());
}

#[test]
fn timestamped_send_requires_regulation_and_respects_lookahead() {
    let harness = Harness::joined(ME);
    let class = InteractionClassHandle::new(9);

    assert!(matches!(
        harness
            .federate
            .send_interaction(class, Vec::new(), Some(1.0)),
        Err(FederationError::Messaging(
            fedra_shared::MessagingError::NotRegulating
        ))
    ));

    harness.federate.enable_time_regulation(0.0, 2.0).unwrap();
    admit_time(&harness, TimeNotice::RegulationEnabled {
        time: LogicalTime::ZERO,
    });

    // earliest legal send time is current (0.0) + lookahead (2.0)
    assert!(matches!(
        harness
            .federate
            .send_interaction(class, Vec::new(), Some(1.0)),
        Err(FederationError::Messaging(
            fedra_shared::MessagingError::TimestampBelowLookahead { .. }
        ))
    ));
    assert!(harness
        .federate
        .send_interaction(class, Vec::new(), Some(2.0))
        .is_ok());
}
