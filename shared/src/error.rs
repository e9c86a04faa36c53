use thiserror::Error;

use crate::time::LogicalTimeError;

/// The taxonomy kind behind every rejected operation.
///
/// The API-translation layer maps these to whatever external representation
/// its ecosystem prefers; inside the engine there is exactly one kind per
/// rejection, always paired with a human-readable reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not joined, wrong phase, already in the requested state. Synchronous,
    /// recoverable by retrying correctly.
    Precondition,
    /// Negative lookahead, past timestamp, null time where required.
    InvalidArgument,
    /// Re-entrant service call during callback delivery; a usage bug in the
    /// federate's own code.
    ConcurrencyViolation,
    /// Save vs. restore overlap, duplicate acquire/divest. Recoverable by
    /// waiting for the conflicting operation to resolve.
    ProtocolConflict,
}

/// Errors raised by the guard checks evaluated first for every service call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Service call issued from inside a callback delivery
    #[error("Concurrent access attempted: service calls are not permitted while a callback is being delivered")]
    ConcurrentAccessAttempted,

    /// A time advance is already outstanding
    #[error("Time advance already in progress; wait for the grant before requesting another advance")]
    TimeAdvanceAlreadyInProgress,

    /// The federate has not joined (or has resigned from) the federation
    #[error("Federate is not an execution member. Join the federation before issuing service calls")]
    FederateNotExecutionMember,

    /// The federate is already joined
    #[error("Federate is already an execution member and cannot join twice")]
    FederateAlreadyExecutionMember,

    /// A federation save session is active
    #[error("Save in progress for label {label:?}; only save-protocol operations are permitted")]
    SaveInProgress { label: String },

    /// A federation restore session is active
    #[error("Restore in progress for label {label:?}; only restore-protocol operations are permitted")]
    RestoreInProgress { label: String },
}

impl GuardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::ConcurrentAccessAttempted => ErrorKind::ConcurrencyViolation,
            GuardError::TimeAdvanceAlreadyInProgress => ErrorKind::Precondition,
            GuardError::FederateNotExecutionMember => ErrorKind::Precondition,
            GuardError::FederateAlreadyExecutionMember => ErrorKind::Precondition,
            GuardError::SaveInProgress { .. } => ErrorKind::ProtocolConflict,
            GuardError::RestoreInProgress { .. } => ErrorKind::ProtocolConflict,
        }
    }
}

/// Errors raised by the time advance coordinator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeError {
    /// Regulation enable requested while already regulating
    #[error("Time regulation is already enabled for this federate")]
    TimeRegulationAlreadyEnabled,

    /// Regulation disable requested while not regulating
    #[error("Time regulation was not enabled for this federate")]
    TimeRegulationWasNotEnabled,

    /// Constrained enable requested while already constrained
    #[error("Time constrained is already enabled for this federate")]
    TimeConstrainedAlreadyEnabled,

    /// Constrained disable requested while not constrained
    #[error("Time constrained was not enabled for this federate")]
    TimeConstrainedWasNotEnabled,

    /// A regulation enable is outstanding and has not yet been confirmed
    #[error("Enable time regulation is pending; wait for the regulation-enabled notice")]
    EnableTimeRegulationPending,

    /// A constrained enable is outstanding and has not yet been confirmed
    #[error("Enable time constrained is pending; wait for the constrained-enabled notice")]
    EnableTimeConstrainedPending,

    /// Lookahead was negative or non-finite
    #[error("Invalid lookahead {value}. Lookahead must be finite and >= 0")]
    InvalidLookahead { value: f64 },

    /// Supplied time was null or unparsable
    #[error("Invalid federation time: {reason}")]
    InvalidFederationTime { reason: String },

    /// Requested time is at or below the federate's current time
    #[error("Federation time {requested} already passed; current time is {current}")]
    FederationTimeAlreadyPassed { requested: f64, current: f64 },
}

impl TimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimeError::TimeRegulationAlreadyEnabled
            | TimeError::TimeRegulationWasNotEnabled
            | TimeError::TimeConstrainedAlreadyEnabled
            | TimeError::TimeConstrainedWasNotEnabled
            | TimeError::EnableTimeRegulationPending
            | TimeError::EnableTimeConstrainedPending => ErrorKind::Precondition,
            TimeError::InvalidLookahead { .. }
            | TimeError::InvalidFederationTime { .. }
            | TimeError::FederationTimeAlreadyPassed { .. } => ErrorKind::InvalidArgument,
        }
    }
}

impl From<LogicalTimeError> for TimeError {
    fn from(err: LogicalTimeError) -> Self {
        match err {
            LogicalTimeError::InvalidTime { value } => TimeError::InvalidFederationTime {
                reason: format!("value {value} is not a finite number"),
            },
            LogicalTimeError::InvalidInterval { value } => TimeError::InvalidLookahead { value },
        }
    }
}

/// Errors raised by the ownership coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// Caller does not own the attribute it tried to divest or release
    #[error("Attribute is not owned by this federate")]
    AttributeNotOwned,

    /// A negotiated divestiture is already pending for the attribute
    #[error("Attribute is already being divested; cancel or complete the pending divestiture first")]
    AttributeAlreadyBeingDivested,

    /// Divestiture cancel/complete without a pending divestiture
    #[error("Attribute divestiture was not requested")]
    AttributeDivestitureWasNotRequested,

    /// A duplicate acquisition request is already pending
    #[error("Attribute is already being acquired by this federate")]
    AttributeAlreadyBeingAcquired,

    /// Acquisition cancel without a pending acquisition
    #[error("Attribute acquisition was not requested")]
    AttributeAcquisitionWasNotRequested,

    /// Acquisition resolved before the cancel could apply
    #[error("Attribute is already owned; the acquisition resolved before cancellation")]
    AttributeAlreadyOwned,

    /// Requester already owns the attribute it asked for
    #[error("Federate already owns the attributes it attempted to acquire")]
    FederateOwnsAttributes,

    /// Requester does not publish the attribute
    #[error("Attribute is not published by this federate")]
    AttributeNotPublished,

    /// Requester does not publish the object class
    #[error("Object class is not published by this federate")]
    ObjectClassNotPublished,

    /// No ownership record exists for the (object, attribute) pair
    #[error("Attribute is not known to this federate; no ownership record exists")]
    AttributeNotKnown,
}

impl OwnershipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OwnershipError::AttributeAlreadyBeingDivested
            | OwnershipError::AttributeAlreadyBeingAcquired => ErrorKind::ProtocolConflict,
            _ => ErrorKind::Precondition,
        }
    }
}

/// Errors raised validating outbound data messages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessagingError {
    /// Sender does not publish the interaction class
    #[error("Interaction class is not published by this federate")]
    InteractionClassNotPublished,

    /// Sender does not publish the object class
    #[error("Object class is not published by this federate")]
    ObjectClassNotPublished,

    /// Timestamped sends require time regulation
    #[error("Timestamped sends require time regulation to be enabled")]
    NotRegulating,

    /// Outbound timestamp violates the lookahead guarantee
    #[error("Timestamp {timestamp} violates lookahead; earliest legal send time is {earliest}")]
    TimestampBelowLookahead { timestamp: f64, earliest: f64 },

    /// Outbound timestamp was null or unparsable
    #[error("Invalid message timestamp: {reason}")]
    InvalidTimestamp { reason: String },
}

impl MessagingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessagingError::InteractionClassNotPublished
            | MessagingError::ObjectClassNotPublished
            | MessagingError::NotRegulating => ErrorKind::Precondition,
            MessagingError::TimestampBelowLookahead { .. }
            | MessagingError::InvalidTimestamp { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// Errors raised by the synchronization barrier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Label registered twice within one federation
    #[error("Synchronization label {label:?} is already announced")]
    SynchronizationLabelAlreadyAnnounced { label: String },

    /// Achieved called for a label never announced to this federate
    #[error("Synchronization label {label:?} was not announced to this federate")]
    SynchronizationLabelNotAnnounced { label: String },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::SynchronizationLabelAlreadyAnnounced { .. } => ErrorKind::ProtocolConflict,
            SyncError::SynchronizationLabelNotAnnounced { .. } => ErrorKind::Precondition,
        }
    }
}

/// Errors raised by the save/restore coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveRestoreError {
    /// Save-protocol reply without an active save session
    #[error("Federation save was not requested; no save session is active")]
    SaveNotInitiated,

    /// Restore-protocol reply without an active restore session
    #[error("Federation restore was not requested; no restore session is active")]
    RestoreNotInitiated,

    /// Save-protocol reply before the session reached the instructed phase
    #[error("Save session {label:?} has not instructed federates yet")]
    SaveNotInstructed { label: String },

    /// Restore-protocol reply before the session reached the instructed phase
    #[error("Restore session {label:?} has not instructed federates yet")]
    RestoreNotInstructed { label: String },
}

impl SaveRestoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

/// Umbrella error for every engine operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FederationError {
    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    #[error("Ownership error: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Save/restore error: {0}")]
    SaveRestore(#[from] SaveRestoreError),
}

impl FederationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FederationError::Guard(e) => e.kind(),
            FederationError::Time(e) => e.kind(),
            FederationError::Ownership(e) => e.kind(),
            FederationError::Messaging(e) => e.kind(),
            FederationError::Sync(e) => e.kind(),
            FederationError::SaveRestore(e) => e.kind(),
        }
    }
}
