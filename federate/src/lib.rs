//! # Fedra Federate
//! A federation coordination engine: logical-time advancement, dual-discipline
//! event queueing, attribute ownership transfer, synchronization points and
//! federation-wide save/restore, behind a single guarded facade.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod shared {
    pub use fedra_shared::*;
}

mod collaborators;
mod event_queue;
mod federate;
mod ownership;
mod save_restore;
mod status;
mod sync_point;
mod time_manager;

pub use collaborators::{
    FederationRequest, FederationTransport, ObjectModel, PersistError, PersistedState,
};
pub use event_queue::{EventQueue, QueueError};
pub use federate::{DrainMode, EventSink, Federate};
pub use ownership::{AttributeOwnershipRecord, NegotiationState, Owner, OwnershipManager};
pub use save_restore::{
    SaveRestoreManager, SaveRestoreSession, SessionKind, SessionOutcome, SessionPhase,
};
pub use status::{AdvancingState, FederateStatus, MembershipState, RestoreState, SaveState};
pub use sync_point::{SyncPointManager, SyncPointRecord, SyncPointState};
pub use time_manager::TimeManager;
