use thiserror::Error;

use fedra_shared::{
    AttributeHandle, FederateHandle, InteractionClassHandle, LogicalTime, ObjectClassHandle,
    ObjectHandle, ParticipantStatus,
};

/// One outbound protocol message to the rest of the federation. The
/// transport owns framing, discovery and per-federate fan-out; replies come
/// back through `Federate::admit`.
#[derive(Clone, Debug, PartialEq)]
pub enum FederationRequest {
    /// This federate's LBTS contribution (federate time + lookahead), or a
    /// withdrawal when None.
    TimeContribution {
        federate: FederateHandle,
        value: Option<LogicalTime>,
    },
    EnableRegulation {
        federate: FederateHandle,
        contribution: LogicalTime,
    },
    EnableConstrained {
        federate: FederateHandle,
    },
    Join {
        federate: FederateHandle,
    },
    Resign {
        federate: FederateHandle,
    },
    SyncAnnounce {
        label: String,
        targets: Vec<FederateHandle>,
    },
    SyncAchieved {
        label: String,
        federate: FederateHandle,
    },
    SaveRequest {
        label: String,
        time: Option<LogicalTime>,
    },
    SaveStatus {
        label: String,
        federate: FederateHandle,
        status: ParticipantStatus,
    },
    RestoreRequest {
        label: String,
    },
    RestoreStatus {
        label: String,
        federate: FederateHandle,
        status: ParticipantStatus,
    },
    AcquireRequest {
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
    },
    CancelAcquire {
        object: ObjectHandle,
        attribute: AttributeHandle,
        requester: FederateHandle,
    },
    ReleaseResponse {
        object: ObjectHandle,
        attribute: AttributeHandle,
        new_owner: FederateHandle,
    },
    Divest {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
    DeleteObject {
        object: ObjectHandle,
    },
    Interaction {
        class: InteractionClassHandle,
        payload: Vec<u8>,
        timestamp: Option<LogicalTime>,
    },
    AttributeUpdate {
        object: ObjectHandle,
        attribute: AttributeHandle,
        payload: Vec<u8>,
        timestamp: Option<LogicalTime>,
    },
}

/// Synchronous read-only oracle over the federation object model; used only
/// to validate publish/subscribe/ownership requests. Shared between the
/// federate's thread and the transport's thread.
pub trait ObjectModel: Send + Sync {
    fn object_class(&self, object: ObjectHandle) -> Option<ObjectClassHandle>;

    fn publishes_class(&self, federate: FederateHandle, class: ObjectClassHandle) -> bool;

    fn publishes_attribute(
        &self,
        federate: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> bool;

    fn publishes_interaction(&self, federate: FederateHandle, class: InteractionClassHandle)
        -> bool;
}

/// Broadcast capability supplied by the transport; fire-and-forget, replies
/// arrive as admitted events. Shared between the federate's thread and the
/// transport's thread.
pub trait FederationTransport: Send + Sync {
    fn broadcast(&self, request: FederationRequest);
}

/// Errors reported by the persisted-state collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("Persisted state operation failed for label {label:?}: {reason}")]
    Failed { label: String, reason: String },
}

/// Serializes/deserializes the federate's own external state; invoked
/// exactly at the save-begun and restore boundaries, opaque to the engine.
pub trait PersistedState: Send {
    fn save_state(&mut self, label: &str) -> Result<(), PersistError>;

    fn restore_state(&mut self, label: &str) -> Result<(), PersistError>;

    /// Undo a locally completed save/restore after the federation announced
    /// "not complete".
    fn rollback_state(&mut self, label: &str);
}
