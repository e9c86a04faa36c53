//! Two-engine attribute ownership negotiation, with the test routing the
//! recorded broadcasts between the engines by hand.

use fedra_federate::{FederationRequest, Owner};
use fedra_shared::{
    AttributeHandle, EventKind, FederateHandle, FederationError, MembershipNotice, ObjectHandle,
    OwnershipError, OwnershipNotice, PendingEvent,
};
use fedra_test::Harness;

const F1: FederateHandle = FederateHandle::new(1);
const F2: FederateHandle = FederateHandle::new(2);

fn object() -> ObjectHandle {
    ObjectHandle::new(10)
}

fn attribute() -> AttributeHandle {
    AttributeHandle::new(3)
}

/// Two joined engines that know about each other and share one object:
/// owned by F1, known as remote-owned at F2.
fn owner_and_requester() -> (Harness, Harness) {
    let owner = Harness::joined(F1);
    let requester = Harness::joined(F2);

    owner.federate.admit(PendingEvent::receive_ordered(
        EventKind::Membership(MembershipNotice::Joined { federate: F2 }),
    ));
    requester.federate.admit(PendingEvent::receive_ordered(
        EventKind::Membership(MembershipNotice::Joined { federate: F1 }),
    ));

    owner
        .federate
        .register_object(object(), &[attribute()])
        .unwrap();
    requester
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::Transferred {
                object: object(),
                attribute: attribute(),
                new_owner: Some(F1),
            },
        )));

    owner.drain();
    requester.drain();
    owner.take_requests();
    requester.take_requests();
    (owner, requester)
}

#[test]
fn acquisition_negotiates_through_the_owner() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (owner, requester) = owner_and_requester();

    requester.federate.acquire(object(), attribute()).unwrap();
    let broadcasts = requester.take_requests();
    assert!(broadcasts.iter().any(|request| matches!(
        request,
        FederationRequest::AcquireRequest { requester: federate, .. } if *federate == F2
    )));

    // the owner receives the request and sees a release-requested callback
    owner
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::ReleaseRequested {
                object: object(),
                attribute: attribute(),
                requester: F2,
            },
        )));
    let delivered = owner.drain();
    assert!(delivered.iter().any(|event| matches!(
        event.kind,
        EventKind::Ownership(OwnershipNotice::ReleaseRequested { requester, .. }) if requester == F2
    )));

    // the owner releases; ownership moves to the requester
    owner
        .federate
        .attribute_release_response(object(), attribute())
        .unwrap();
    assert_eq!(
        owner
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F2)
    );

    requester
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::Transferred {
                object: object(),
                attribute: attribute(),
                new_owner: Some(F2),
            },
        )));
    assert_eq!(
        requester
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F2)
    );
    let delivered = requester.drain();
    assert!(delivered.iter().any(|event| matches!(
        event.kind,
        EventKind::Ownership(OwnershipNotice::Granted { .. })
    )));
}

#[test]
fn unconditional_divest_drops_to_unowned_and_a_waiter_claims_it() {
    let (owner, requester) = owner_and_requester();

    requester.federate.acquire(object(), attribute()).unwrap();
    requester.take_requests();

    // the owner divests without waiting for any requester
    owner
        .federate
        .unconditional_divest(object(), attribute())
        .unwrap();
    assert_eq!(
        owner
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Unowned
    );

    // the requester hears the drop while its request is in flight and claims
    requester
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::Transferred {
                object: object(),
                attribute: attribute(),
                new_owner: None,
            },
        )));
    assert_eq!(
        requester
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F2)
    );
    let broadcasts = requester.take_requests();
    assert!(broadcasts.iter().any(|request| matches!(
        request,
        FederationRequest::ReleaseResponse { new_owner, .. } if *new_owner == F2
    )));
}

#[test]
fn negotiated_divest_waits_for_a_taker() {
    let (owner, _requester) = owner_and_requester();

    owner
        .federate
        .negotiated_divest(object(), attribute())
        .unwrap();
    assert_eq!(
        owner
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F1)
    );

    // an acquirer arrives while the divest is pending
    owner
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::ReleaseRequested {
                object: object(),
                attribute: attribute(),
                requester: F2,
            },
        )));
    owner
        .federate
        .attribute_release_response(object(), attribute())
        .unwrap();
    assert_eq!(
        owner
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F2)
    );
}

#[test]
fn cancel_divest_restores_the_record() {
    let (owner, _requester) = owner_and_requester();

    owner
        .federate
        .negotiated_divest(object(), attribute())
        .unwrap();
    owner.federate.cancel_divest(object(), attribute()).unwrap();

    assert_eq!(
        owner
            .federate
            .attribute_release_response(object(), attribute())
            .unwrap_err(),
        FederationError::Ownership(OwnershipError::AttributeDivestitureWasNotRequested)
    );
}

#[test]
fn cancelled_acquisition_does_not_transfer_ownership() {
    let (owner, requester) = owner_and_requester();

    requester.federate.acquire(object(), attribute()).unwrap();
    requester.take_requests();
    owner
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::ReleaseRequested {
                object: object(),
                attribute: attribute(),
                requester: F2,
            },
        )));

    // the requester changes its mind; the cancel goes out on the wire
    requester
        .federate
        .cancel_acquire(object(), attribute())
        .unwrap();
    let broadcasts = requester.take_requests();
    assert!(broadcasts.iter().any(|request| matches!(
        request,
        FederationRequest::CancelAcquire { requester: federate, .. } if *federate == F2
    )));

    // the owner hears the cancel before answering; a later release must not
    // hand the attribute to the withdrawn requester
    owner
        .federate
        .admit(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::AcquisitionCanceled {
                object: object(),
                attribute: attribute(),
                requester: F2,
            },
        )));
    assert_eq!(
        owner
            .federate
            .attribute_release_response(object(), attribute())
            .unwrap_err(),
        FederationError::Ownership(OwnershipError::AttributeDivestitureWasNotRequested)
    );
    assert_eq!(
        owner
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F1)
    );
}

#[test]
fn acquire_if_available_reports_unavailable_for_owned_attributes() {
    let (_owner, requester) = owner_and_requester();

    requester
        .federate
        .acquire_if_available(object(), attribute())
        .unwrap();
    assert_eq!(
        requester
            .federate
            .query_attribute_ownership(object(), attribute())
            .unwrap(),
        Owner::Federate(F1)
    );
    let delivered = requester.drain();
    assert!(delivered.iter().any(|event| matches!(
        event.kind,
        EventKind::Ownership(OwnershipNotice::Unavailable { .. })
    )));
}

#[test]
fn resign_releases_owned_attributes() {
    let (owner, _requester) = owner_and_requester();

    owner.federate.resign().unwrap();
    let broadcasts = owner.take_requests();
    assert!(broadcasts.iter().any(|request| matches!(
        request,
        FederationRequest::Divest { .. }
    )));
    assert!(broadcasts
        .iter()
        .any(|request| matches!(request, FederationRequest::Resign { federate } if *federate == F1)));
}
