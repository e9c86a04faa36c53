//! # Fedra Shared
//! Common types shared between the fedra federate engine and transport crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod error;
mod event;
mod time;
mod types;

pub use error::{
    ErrorKind, FederationError, GuardError, MessagingError, OwnershipError, SaveRestoreError,
    SyncError, TimeError,
};
pub use event::{
    DeliveryDiscipline, EventKind, MembershipNotice, OwnershipNotice, ParticipantStatus,
    PendingEvent, SaveRestoreNotice, SyncNotice, TimeNotice,
};
pub use time::{FederationTimeView, LogicalTime, LogicalTimeError, LogicalTimeInterval};
pub use types::{
    AttributeHandle, FederateHandle, InteractionClassHandle, ObjectClassHandle, ObjectHandle,
    SequenceNumber,
};
