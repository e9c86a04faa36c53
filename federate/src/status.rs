use std::collections::HashSet;

use fedra_shared::{FederateHandle, GuardError, LogicalTime, LogicalTimeInterval};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipState {
    Unjoined,
    Joined,
    Resigning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvancingState {
    Idle,
    /// Strict advance: every TSO event at or below the grant time is
    /// delivered before the grant notice.
    TimeAdvancing,
    /// Boundary-tolerant advance: events at exactly the grant time may be
    /// delivered after the grant notice.
    TimeAdvanceAvailable,
    NextEventPending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    None,
    Requested,
    InProgress,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreState {
    None,
    Requested,
    InProgress,
    Complete,
}

/// Per-federate membership, time status and the concurrent-access guard.
///
/// Created at join, torn down at resign; mutated exclusively by the
/// coordinators while the facade holds the engine lock.
#[derive(Clone, Debug)]
pub struct FederateStatus {
    pub membership: MembershipState,
    pub handle: Option<FederateHandle>,
    pub peers: HashSet<FederateHandle>,

    pub regulating: bool,
    pub regulation_pending: bool,
    pub constrained: bool,
    pub constrained_pending: bool,
    pub lookahead: LogicalTimeInterval,

    pub advancing: AdvancingState,
    pub current_time: LogicalTime,
    pub requested_time: Option<LogicalTime>,

    /// The concurrent-access guard: true only for the duration of one
    /// callback delivery; forbids re-entrant outbound calls.
    pub executing_callback: bool,

    pub save_state: SaveState,
    pub save_label: Option<String>,
    pub restore_state: RestoreState,
    pub restore_label: Option<String>,
}

impl FederateStatus {
    pub fn new() -> Self {
        Self {
            membership: MembershipState::Unjoined,
            handle: None,
            peers: HashSet::new(),
            regulating: false,
            regulation_pending: false,
            constrained: false,
            constrained_pending: false,
            lookahead: LogicalTimeInterval::ZERO,
            advancing: AdvancingState::Idle,
            current_time: LogicalTime::ZERO,
            requested_time: None,
            executing_callback: false,
            save_state: SaveState::None,
            save_label: None,
            restore_state: RestoreState::None,
            restore_label: None,
        }
    }

    /// Fails if the caller is the federate's own code re-entering the
    /// engine from inside a callback delivery.
    pub fn check_access(&self) -> Result<(), GuardError> {
        if self.executing_callback {
            return Err(GuardError::ConcurrentAccessAttempted);
        }
        Ok(())
    }

    pub fn check_joined(&self) -> Result<(), GuardError> {
        if self.membership != MembershipState::Joined {
            return Err(GuardError::FederateNotExecutionMember);
        }
        Ok(())
    }

    pub fn check_advancing(&self) -> Result<(), GuardError> {
        if self.advancing != AdvancingState::Idle {
            return Err(GuardError::TimeAdvanceAlreadyInProgress);
        }
        Ok(())
    }

    /// Fails while a save session is active and the requested operation is
    /// not itself part of the save protocol.
    pub fn check_save(&self) -> Result<(), GuardError> {
        if self.save_state != SaveState::None {
            return Err(GuardError::SaveInProgress {
                label: self.save_label.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Fails while a restore session is active and the requested operation
    /// is not itself part of the restore protocol.
    pub fn check_restore(&self) -> Result<(), GuardError> {
        if self.restore_state != RestoreState::None {
            return Err(GuardError::RestoreInProgress {
                label: self.restore_label.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub fn is_save_or_restore_active(&self) -> bool {
        self.save_state != SaveState::None || self.restore_state != RestoreState::None
    }
}

impl Default for FederateStatus {
    fn default() -> Self {
        Self::new()
    }
}
