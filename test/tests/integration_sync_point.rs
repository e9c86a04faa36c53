//! Synchronization-point barrier across engines: announcement fan-out,
//! achievement counting, the single synchronized notice, and barrier
//! liveness when a participant resigns.

use fedra_federate::FederationRequest;
use fedra_shared::{
    EventKind, FederateHandle, FederationError, MembershipNotice, PendingEvent, SyncError,
    SyncNotice,
};
use fedra_test::Harness;

const F1: FederateHandle = FederateHandle::new(1);
const F2: FederateHandle = FederateHandle::new(2);

fn joined_pair() -> (Harness, Harness) {
    let a = Harness::joined(F1);
    let b = Harness::joined(F2);
    a.federate.admit(PendingEvent::receive_ordered(
        EventKind::Membership(MembershipNotice::Joined { federate: F2 }),
    ));
    b.federate.admit(PendingEvent::receive_ordered(
        EventKind::Membership(MembershipNotice::Joined { federate: F1 }),
    ));
    a.drain();
    b.drain();
    (a, b)
}

fn synchronized(delivered: &[PendingEvent], label: &str) -> bool {
    delivered.iter().any(|event| {
        matches!(
            &event.kind,
            EventKind::Sync(SyncNotice::FederationSynchronized { label: l }) if l == label
        )
    })
}

#[test]
fn barrier_fires_once_every_federate_achieves() {
    let (a, b) = joined_pair();

    a.federate.register_sync_point("ready", None).unwrap();
    let broadcasts = a.take_requests();
    let targets = broadcasts
        .iter()
        .find_map(|request| match request {
            FederationRequest::SyncAnnounce { targets, .. } => Some(targets.clone()),
            _ => None,
        })
        .expect("announcement broadcast");
    b.federate.admit(PendingEvent::receive_ordered(EventKind::Sync(
        SyncNotice::Announced {
            label: "ready".to_string(),
            targets,
        },
    )));

    a.federate.sync_point_achieved("ready").unwrap();
    assert!(!synchronized(&a.drain(), "ready"));

    b.federate.sync_point_achieved("ready").unwrap();
    b.federate.admit(PendingEvent::receive_ordered(EventKind::Sync(
        SyncNotice::Achieved {
            label: "ready".to_string(),
            federate: F1,
        },
    )));
    a.federate.admit(PendingEvent::receive_ordered(EventKind::Sync(
        SyncNotice::Achieved {
            label: "ready".to_string(),
            federate: F2,
        },
    )));

    assert!(synchronized(&a.drain(), "ready"));
    assert!(synchronized(&b.drain(), "ready"));
}

#[test]
fn duplicate_registration_is_rejected() {
    let (a, _b) = joined_pair();

    a.federate.register_sync_point("ready", None).unwrap();
    assert_eq!(
        a.federate.register_sync_point("ready", None).unwrap_err(),
        FederationError::Sync(SyncError::SynchronizationLabelAlreadyAnnounced {
            label: "ready".to_string()
        })
    );
}

#[test]
fn achieving_an_unannounced_label_is_rejected() {
    let (a, _b) = joined_pair();
    assert_eq!(
        a.federate.sync_point_achieved("ghost").unwrap_err(),
        FederationError::Sync(SyncError::SynchronizationLabelNotAnnounced {
            label: "ghost".to_string()
        })
    );
}

#[test]
fn a_resigning_federate_cannot_wedge_the_barrier() {
    let (a, _b) = joined_pair();

    a.federate.register_sync_point("ready", None).unwrap();
    a.federate.sync_point_achieved("ready").unwrap();
    assert!(!synchronized(&a.drain(), "ready"));

    // the peer resigns instead of achieving
    a.federate.admit(PendingEvent::receive_ordered(
        EventKind::Membership(MembershipNotice::Resigned { federate: F2 }),
    ));
    assert!(synchronized(&a.drain(), "ready"));
}

#[test]
fn targeted_point_excludes_federates_outside_the_set() {
    let (a, b) = joined_pair();

    a.federate
        .register_sync_point("pair", Some(vec![F2]))
        .unwrap();
    // the registering federate is not in the target set
    assert_eq!(
        a.federate.sync_point_achieved("pair").unwrap_err(),
        FederationError::Sync(SyncError::SynchronizationLabelNotAnnounced {
            label: "pair".to_string()
        })
    );

    b.federate.admit(PendingEvent::receive_ordered(EventKind::Sync(
        SyncNotice::Announced {
            label: "pair".to_string(),
            targets: vec![F2],
        },
    )));
    b.federate.sync_point_achieved("pair").unwrap();
    assert!(synchronized(&b.drain(), "pair"));
}
