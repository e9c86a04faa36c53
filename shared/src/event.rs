use crate::{
    time::LogicalTime,
    types::{AttributeHandle, FederateHandle, InteractionClassHandle, ObjectHandle, SequenceNumber},
};

/// Which delivery discipline an inbound event was admitted under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryDiscipline {
    /// Held and released in ascending timestamp order, gated by the
    /// federate's granted logical time.
    TimestampOrder,
    /// FIFO by arrival, no time gating.
    ReceiveOrder,
}

/// Progress reported by one federate participating in a save or restore
/// session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantStatus {
    Pending,
    Begun,
    Complete,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OwnershipNotice {
    /// Another federate wants an attribute this federate owns; the owner
    /// is expected to answer with an attribute release response.
    ReleaseRequested {
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
    },
    /// A pending acquisition resolved in this federate's favor.
    Granted {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
    /// A negotiated divestiture completed; the attribute left this
    /// federate's ownership.
    Divested {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
    /// An acquire-if-available request found the attribute owned.
    Unavailable {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
    /// Ownership moved federation-wide; `new_owner` of None means the
    /// attribute dropped to unowned. Wire-level form consumed by the
    /// ownership coordinator, not delivered to user code directly.
    Transferred {
        object: ObjectHandle,
        attribute: AttributeHandle,
        new_owner: Option<FederateHandle>,
    },
    /// A requester withdrew a pending acquisition. Wire-level form consumed
    /// by the owner's coordinator, not delivered to user code directly.
    AcquisitionCanceled {
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyncNotice {
    /// A sync point was announced to this federate. An empty target list
    /// means every joined federate.
    Announced {
        label: String,
        targets: Vec<FederateHandle>,
    },
    /// A peer federate achieved the labeled point (bookkeeping, consumed
    /// by the barrier, not delivered to user code).
    Achieved {
        label: String,
        federate: FederateHandle,
    },
    /// Every announced federate achieved the point.
    FederationSynchronized { label: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaveRestoreNotice {
    /// Every joined federate has been told to save.
    SaveInstructed {
        label: String,
        time: Option<LogicalTime>,
    },
    /// A peer reported save progress (bookkeeping).
    SaveStatus {
        label: String,
        federate: FederateHandle,
        status: ParticipantStatus,
    },
    FederationSaved { label: String },
    FederationNotSaved { label: String },
    RestoreInstructed { label: String },
    /// A peer reported restore progress (bookkeeping).
    RestoreStatus {
        label: String,
        federate: FederateHandle,
        status: ParticipantStatus,
    },
    FederationRestored { label: String },
    FederationNotRestored { label: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimeNotice {
    /// A time advance request was granted at `time`.
    AdvanceGrant { time: LogicalTime },
    /// The federation confirmed this federate as regulating, effective at
    /// `time`.
    RegulationEnabled { time: LogicalTime },
    /// The federation confirmed this federate as constrained, effective at
    /// `time`.
    ConstrainedEnabled { time: LogicalTime },
}

#[derive(Clone, Debug, PartialEq)]
pub enum MembershipNotice {
    Joined { federate: FederateHandle },
    Resigned { federate: FederateHandle },
}

/// What an inbound event is, independent of its (opaque) payload bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// Reflected attribute values for a remote-owned attribute.
    AttributeUpdate {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
    /// A received interaction.
    Interaction { class: InteractionClassHandle },
    /// An object instance was deleted federation-wide.
    ObjectRemoved { object: ObjectHandle },
    Ownership(OwnershipNotice),
    Sync(SyncNotice),
    SaveRestore(SaveRestoreNotice),
    Time(TimeNotice),
    Membership(MembershipNotice),
}

/// An inbound reflection/interaction/notice awaiting delivery to the
/// federate's callback stream.
///
/// Created when a network notification arrives (or when a coordinator
/// produces a local notice); destroyed when delivered, or discarded on
/// resign.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    pub kind: EventKind,
    pub payload: Vec<u8>,
    pub timestamp: Option<LogicalTime>,
    pub discipline: DeliveryDiscipline,
    /// Arrival order at the origin; tie-break between equal timestamps.
    pub sequence: SequenceNumber,
    pub origin: Option<FederateHandle>,
}

impl PendingEvent {
    pub fn receive_ordered(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Vec::new(),
            timestamp: None,
            discipline: DeliveryDiscipline::ReceiveOrder,
            sequence: 0,
            origin: None,
        }
    }

    pub fn timestamped(kind: EventKind, timestamp: LogicalTime) -> Self {
        Self {
            kind,
            payload: Vec::new(),
            timestamp: Some(timestamp),
            discipline: DeliveryDiscipline::TimestampOrder,
            sequence: 0,
            origin: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceNumber) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_origin(mut self, origin: FederateHandle) -> Self {
        self.origin = Some(origin);
        self
    }
}
