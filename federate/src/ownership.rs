use std::collections::HashMap;

use log::warn;

use fedra_shared::{
    AttributeHandle, EventKind, FederateHandle, ObjectHandle, OwnershipError, OwnershipNotice,
    PendingEvent,
};

use crate::{collaborators::FederationRequest, event_queue::EventQueue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    Federate(FederateHandle),
    Unowned,
    Rti,
}

/// Transitional negotiation state for one (object, attribute) pair. At rest
/// the state is `Owned`; every transitional state carries the federate that
/// will receive the attribute when it resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    Owned,
    /// The owner offered the attribute up; `requester` is an acquirer that
    /// arrived while the divest was pending and is queued as the eventual
    /// recipient.
    DivestPending { requester: Option<FederateHandle> },
    AcquirePending { requester: FederateHandle },
    ReleasePending { requester: FederateHandle },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeOwnershipRecord {
    pub owner: Owner,
    pub state: NegotiationState,
}

impl AttributeOwnershipRecord {
    fn at_rest(owner: Owner) -> Self {
        Self {
            owner,
            state: NegotiationState::Owned,
        }
    }
}

type AttributeKey = (ObjectHandle, AttributeHandle);

/// The divestiture/acquisition state machine, per (object, attribute).
///
/// Independent of time; the facade applies the concurrent-access guard and
/// the save/restore lock before calls reach here. Publication checks against
/// the object model happen at the facade as well, so this state machine only
/// sees structurally valid requests.
pub struct OwnershipManager {
    records: HashMap<AttributeKey, AttributeOwnershipRecord>,
}

impl OwnershipManager {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Create the record for an attribute; lifecycle is tied to the object
    /// instance (registered at publication/discovery, removed at deletion).
    pub fn register_attribute(
        &mut self,
        object: ObjectHandle,
        attribute: AttributeHandle,
        owner: Owner,
    ) {
        self.records
            .entry((object, attribute))
            .or_insert_with(|| AttributeOwnershipRecord::at_rest(owner));
    }

    pub fn remove_object(&mut self, object: ObjectHandle) {
        self.records.retain(|(obj, _), _| *obj != object);
    }

    pub fn query_ownership(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<Owner, OwnershipError> {
        self.records
            .get(&(object, attribute))
            .map(|record| record.owner)
            .ok_or(OwnershipError::AttributeNotKnown)
    }

    pub fn record(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Option<&AttributeOwnershipRecord> {
        self.records.get(&(object, attribute))
    }

    fn record_mut(
        &mut self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<&mut AttributeOwnershipRecord, OwnershipError> {
        self.records
            .get_mut(&(object, attribute))
            .ok_or(OwnershipError::AttributeNotKnown)
    }

    /// `Owned(me) -> Unowned` immediately, no negotiation. A divest pending
    /// with a queued acquirer hands the attribute to that acquirer instead.
    pub fn divest_unconditional(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner != Owner::Federate(me) {
            return Err(OwnershipError::AttributeNotOwned);
        }

        let queued = match record.state {
            NegotiationState::DivestPending { requester } => requester,
            NegotiationState::ReleasePending { requester } => Some(requester),
            _ => None,
        };
        match queued {
            Some(requester) => {
                *record = AttributeOwnershipRecord::at_rest(Owner::Federate(requester));
                outbound.push(FederationRequest::ReleaseResponse {
                    object,
                    attribute,
                    new_owner: requester,
                });
            }
            None => {
                *record = AttributeOwnershipRecord::at_rest(Owner::Unowned);
                outbound.push(FederationRequest::Divest { object, attribute });
            }
        }
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::Divested { object, attribute },
        )));
        Ok(())
    }

    /// `Owned(me) -> DivestPending(me)`; resolved by a later release
    /// response, or undone by `cancel_divest`.
    pub fn divest_negotiated(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner != Owner::Federate(me) {
            return Err(OwnershipError::AttributeNotOwned);
        }
        match record.state {
            NegotiationState::DivestPending { .. } => {
                Err(OwnershipError::AttributeAlreadyBeingDivested)
            }
            _ => {
                record.state = NegotiationState::DivestPending { requester: None };
                Ok(())
            }
        }
    }

    pub fn cancel_divest(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner != Owner::Federate(me) {
            return Err(OwnershipError::AttributeNotOwned);
        }
        match record.state {
            NegotiationState::DivestPending { .. } => {
                record.state = NegotiationState::Owned;
                Ok(())
            }
            _ => Err(OwnershipError::AttributeDivestitureWasNotRequested),
        }
    }

    /// Request ownership for this federate. Unowned attributes resolve
    /// immediately; owned attributes move to `AcquirePending(me)` and the
    /// current owner is asked to release.
    pub fn acquire(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner == Owner::Federate(me) {
            return Err(OwnershipError::FederateOwnsAttributes);
        }
        if record.state == (NegotiationState::AcquirePending { requester: me }) {
            return Err(OwnershipError::AttributeAlreadyBeingAcquired);
        }

        match record.owner {
            Owner::Unowned => {
                *record = AttributeOwnershipRecord::at_rest(Owner::Federate(me));
                outbound.push(FederationRequest::ReleaseResponse {
                    object,
                    attribute,
                    new_owner: me,
                });
                queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                    OwnershipNotice::Granted { object, attribute },
                )));
            }
            Owner::Federate(_) | Owner::Rti => {
                record.state = NegotiationState::AcquirePending { requester: me };
                outbound.push(FederationRequest::AcquireRequest {
                    object,
                    attribute,
                    requester: me,
                });
            }
        }
        Ok(())
    }

    /// Acquire only if currently unowned; never displaces an owner. An owned
    /// attribute yields an `Unavailable` notice instead of an error.
    pub fn acquire_if_available(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner == Owner::Federate(me) {
            return Err(OwnershipError::FederateOwnsAttributes);
        }
        match record.owner {
            Owner::Unowned => {
                *record = AttributeOwnershipRecord::at_rest(Owner::Federate(me));
                outbound.push(FederationRequest::ReleaseResponse {
                    object,
                    attribute,
                    new_owner: me,
                });
                queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                    OwnershipNotice::Granted { object, attribute },
                )));
            }
            Owner::Federate(_) | Owner::Rti => {
                queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                    OwnershipNotice::Unavailable { object, attribute },
                )));
            }
        }
        Ok(())
    }

    pub fn cancel_acquire(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner == Owner::Federate(me) {
            // resolved in our favor before the cancel could apply
            return Err(OwnershipError::AttributeAlreadyOwned);
        }
        match record.state {
            NegotiationState::AcquirePending { requester } if requester == me => {
                record.state = NegotiationState::Owned;
                Ok(())
            }
            _ => Err(OwnershipError::AttributeAcquisitionWasNotRequested),
        }
    }

    /// The owner's answer to a release request or the completion of a
    /// negotiated divest: hand the attribute to the pending requester, or
    /// drop it to Unowned when the divest found no taker.
    pub fn release_response(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<Owner, OwnershipError> {
        let record = self.record_mut(object, attribute)?;
        if record.owner != Owner::Federate(me) {
            return Err(OwnershipError::AttributeNotOwned);
        }
        let new_owner = match record.state {
            NegotiationState::ReleasePending { requester } => Owner::Federate(requester),
            NegotiationState::DivestPending {
                requester: Some(requester),
            } => Owner::Federate(requester),
            NegotiationState::DivestPending { requester: None } => Owner::Unowned,
            _ => return Err(OwnershipError::AttributeDivestitureWasNotRequested),
        };

        *record = AttributeOwnershipRecord::at_rest(new_owner);
        match new_owner {
            Owner::Federate(requester) => outbound.push(FederationRequest::ReleaseResponse {
                object,
                attribute,
                new_owner: requester,
            }),
            _ => outbound.push(FederationRequest::Divest { object, attribute }),
        }
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
            OwnershipNotice::Divested { object, attribute },
        )));
        Ok(new_owner)
    }

    /// Inbound: a remote federate wants an attribute this federate owns.
    /// First requester wins; a request during a pending divest is queued as
    /// the eventual acquirer.
    pub fn on_acquisition_request(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
        queue: &mut EventQueue,
    ) {
        let Some(record) = self.records.get_mut(&(object, attribute)) else {
            warn!(
                "acquisition request for unknown attribute ({:?}, {:?})",
                object, attribute
            );
            return;
        };
        if record.owner != Owner::Federate(me) {
            return;
        }
        match record.state {
            NegotiationState::Owned => {
                record.state = NegotiationState::ReleasePending { requester };
                queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                    OwnershipNotice::ReleaseRequested {
                        object,
                        attribute,
                        requester,
                    },
                )));
            }
            NegotiationState::DivestPending { requester: None } => {
                record.state = NegotiationState::DivestPending {
                    requester: Some(requester),
                };
            }
            NegotiationState::DivestPending { requester: Some(_) }
            | NegotiationState::ReleasePending { .. } => {
                // first requester wins; later requesters retry once resolved
            }
            NegotiationState::AcquirePending { .. } => {}
        }
    }

    /// Inbound: a requester withdrew its acquisition before this owner
    /// answered. Reverts the release negotiation, or unqueues the requester
    /// from a pending divest; a cancel from anyone else is ignored.
    pub fn on_acquisition_canceled(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
    ) {
        let Some(record) = self.records.get_mut(&(object, attribute)) else {
            return;
        };
        if record.owner != Owner::Federate(me) {
            return;
        }
        match record.state {
            NegotiationState::ReleasePending { requester: pending } if pending == requester => {
                record.state = NegotiationState::Owned;
            }
            NegotiationState::DivestPending {
                requester: Some(pending),
            } if pending == requester => {
                record.state = NegotiationState::DivestPending { requester: None };
            }
            _ => {}
        }
    }

    /// Inbound: ownership of an attribute moved federation-wide.
    pub fn on_ownership_transferred(
        &mut self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
        new_owner: Owner,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) {
        let record = self
            .records
            .entry((object, attribute))
            .or_insert_with(|| AttributeOwnershipRecord::at_rest(new_owner));

        let was_pending_here =
            record.state == NegotiationState::AcquirePending { requester: me };

        *record = AttributeOwnershipRecord::at_rest(new_owner);

        if new_owner == Owner::Federate(me) {
            queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                OwnershipNotice::Granted { object, attribute },
            )));
        } else if new_owner == Owner::Unowned && was_pending_here {
            // the owner dropped the attribute while our request was in
            // flight; claim it
            *record = AttributeOwnershipRecord::at_rest(Owner::Federate(me));
            outbound.push(FederationRequest::ReleaseResponse {
                object,
                attribute,
                new_owner: me,
            });
            queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(
                OwnershipNotice::Granted { object, attribute },
            )));
        }
    }

    /// Resign: drop every attribute this federate owns back to Unowned.
    pub fn release_all(
        &mut self,
        me: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) {
        for ((object, attribute), record) in self.records.iter_mut() {
            if record.owner == Owner::Federate(me) {
                *record = AttributeOwnershipRecord::at_rest(Owner::Unowned);
                outbound.push(FederationRequest::Divest {
                    object: *object,
                    attribute: *attribute,
                });
            }
        }
    }

    /// Owner cardinality check: at most one federate owns an attribute at
    /// any instant, by construction of the record type. Exposed for tests
    /// and debugging assertions.
    pub fn owners(&self, object: ObjectHandle, attribute: AttributeHandle) -> usize {
        match self.records.get(&(object, attribute)) {
            Some(AttributeOwnershipRecord {
                owner: Owner::Federate(_),
                ..
            }) => 1,
            _ => 0,
        }
    }
}

impl Default for OwnershipManager {
    fn default() -> Self {
        Self::new()
    }
}
