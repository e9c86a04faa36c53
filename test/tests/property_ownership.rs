//! Property-based tests over the ownership state machine.
//!
//! Invariants:
//! 1. At most one federate owns an attribute at any instant.
//! 2. No operation sequence can panic or wedge a record: after any prefix
//!    the record still answers ownership queries.
//! 3. A resolved record is always back at rest (no dangling negotiation).

use proptest::prelude::*;

use fedra_federate::{EventQueue, NegotiationState, Owner, OwnershipManager};
use fedra_shared::{AttributeHandle, FederateHandle, ObjectHandle};

const ME: FederateHandle = FederateHandle::new(1);
const PEER: FederateHandle = FederateHandle::new(2);

fn object() -> ObjectHandle {
    ObjectHandle::new(10)
}

fn attribute() -> AttributeHandle {
    AttributeHandle::new(3)
}

#[derive(Clone, Copy, Debug)]
enum Op {
    UnconditionalDivest,
    NegotiatedDivest,
    CancelDivest,
    Acquire,
    AcquireIfAvailable,
    CancelAcquire,
    ReleaseResponse,
    PeerRequestsRelease,
    TransferredToPeer,
    TransferredToUnowned,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::UnconditionalDivest),
        Just(Op::NegotiatedDivest),
        Just(Op::CancelDivest),
        Just(Op::Acquire),
        Just(Op::AcquireIfAvailable),
        Just(Op::CancelAcquire),
        Just(Op::ReleaseResponse),
        Just(Op::PeerRequestsRelease),
        Just(Op::TransferredToPeer),
        Just(Op::TransferredToUnowned),
    ]
}

fn apply(manager: &mut OwnershipManager, queue: &mut EventQueue, op: Op) {
    let mut out = Vec::new();
    // every operation is allowed to fail; none may panic
    let _ = match op {
        Op::UnconditionalDivest => manager
            .divest_unconditional(ME, object(), attribute(), queue, &mut out)
            .map(|_| ()),
        Op::NegotiatedDivest => manager.divest_negotiated(ME, object(), attribute()),
        Op::CancelDivest => manager.cancel_divest(ME, object(), attribute()),
        Op::Acquire => manager
            .acquire(ME, object(), attribute(), queue, &mut out)
            .map(|_| ()),
        Op::AcquireIfAvailable => manager
            .acquire_if_available(ME, object(), attribute(), queue, &mut out)
            .map(|_| ()),
        Op::CancelAcquire => manager.cancel_acquire(ME, object(), attribute()),
        Op::ReleaseResponse => manager
            .release_response(ME, object(), attribute(), queue, &mut out)
            .map(|_| ()),
        Op::PeerRequestsRelease => {
            manager.on_acquisition_request(ME, object(), attribute(), PEER, queue);
            Ok(())
        }
        Op::TransferredToPeer => {
            manager.on_ownership_transferred(
                ME,
                object(),
                attribute(),
                Owner::Federate(PEER),
                queue,
                &mut out,
            );
            Ok(())
        }
        Op::TransferredToUnowned => {
            manager.on_ownership_transferred(
                ME,
                object(),
                attribute(),
                Owner::Unowned,
                queue,
                &mut out,
            );
            Ok(())
        }
    };
}

proptest! {
    /// No interleaving of divest/acquire/cancel/transfer ever produces two
    /// owners, and the record stays queryable throughout.
    #[test]
    fn prop_owner_cardinality_never_exceeds_one(
        ops in prop::collection::vec(op_strategy(), 1..40),
        start_owned in any::<bool>(),
    ) {
        let mut manager = OwnershipManager::new();
        let start = if start_owned { Owner::Federate(ME) } else { Owner::Unowned };
        manager.register_attribute(object(), attribute(), start);
        let mut queue = EventQueue::new();

        for op in ops {
            apply(&mut manager, &mut queue, op);
            prop_assert!(manager.owners(object(), attribute()) <= 1);
            prop_assert!(manager.query_ownership(object(), attribute()).is_ok());
        }
    }

    /// Divesting then cancelling is an identity on the record.
    #[test]
    fn prop_divest_cancel_roundtrip(prefix in prop::collection::vec(op_strategy(), 0..20)) {
        let mut manager = OwnershipManager::new();
        manager.register_attribute(object(), attribute(), Owner::Federate(ME));
        let mut queue = EventQueue::new();

        for op in prefix {
            apply(&mut manager, &mut queue, op);
        }

        let before = *manager.record(object(), attribute()).unwrap();
        if manager.divest_negotiated(ME, object(), attribute()).is_ok() {
            manager.cancel_divest(ME, object(), attribute()).unwrap();
            let after = *manager.record(object(), attribute()).unwrap();
            prop_assert_eq!(after.owner, before.owner);
            prop_assert_eq!(after.state, NegotiationState::Owned);
        }
    }

    /// An unconditional divest always ends this federate's ownership.
    #[test]
    fn prop_unconditional_divest_always_sheds_ownership(
        prefix in prop::collection::vec(op_strategy(), 0..20),
    ) {
        let mut manager = OwnershipManager::new();
        manager.register_attribute(object(), attribute(), Owner::Federate(ME));
        let mut queue = EventQueue::new();
        let mut out = Vec::new();

        for op in prefix {
            apply(&mut manager, &mut queue, op);
        }

        if manager
            .divest_unconditional(ME, object(), attribute(), &mut queue, &mut out)
            .is_ok()
        {
            prop_assert_ne!(
                manager.query_ownership(object(), attribute()).unwrap(),
                Owner::Federate(ME)
            );
        }
    }
}
