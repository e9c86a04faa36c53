use std::collections::HashMap;

use log::{trace, warn};

use fedra_shared::{
    EventKind, FederateHandle, LogicalTime, ParticipantStatus, PendingEvent, SaveRestoreError,
    SaveRestoreNotice,
};

use crate::{
    collaborators::FederationRequest,
    event_queue::EventQueue,
    status::{FederateStatus, RestoreState, SaveState},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Save,
    Restore,
}

/// Lifecycle of the active session. A request instructs every federate in
/// the same step, so sessions start at `Instructed`; the record is destroyed
/// as soon as it reaches `Done` or `Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Instructed,
    Completing,
    Done,
    Aborted,
}

/// How an active session resolved; the facade rolls back its own persisted
/// state on the negative outcomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Saved { label: String },
    NotSaved { label: String },
    Restored { label: String },
    NotRestored { label: String },
}

/// The single federation-wide save-or-restore session slot.
#[derive(Clone, Debug)]
pub struct SaveRestoreSession {
    pub kind: SessionKind,
    pub label: String,
    pub time: Option<LogicalTime>,
    pub phase: SessionPhase,
    pub statuses: HashMap<FederateHandle, ParticipantStatus>,
}

/// Two-phase save/restore coordination.
///
/// Both protocols share one session slot; only one of save-or-restore may be
/// active federation-wide at a time (the facade's guard checks enforce the
/// mutual exclusion for new calls). Any participant reporting failure, or
/// resigning mid-session, aborts the whole session; there is no
/// partial-success outcome.
pub struct SaveRestoreManager {
    session: Option<SaveRestoreSession>,
}

impl SaveRestoreManager {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn session(&self) -> Option<&SaveRestoreSession> {
        self.session.as_ref()
    }

    fn all_participants(status: &FederateStatus) -> HashMap<FederateHandle, ParticipantStatus> {
        let mut statuses: HashMap<FederateHandle, ParticipantStatus> = status
            .peers
            .iter()
            .map(|peer| (*peer, ParticipantStatus::Pending))
            .collect();
        if let Some(me) = status.handle {
            statuses.insert(me, ParticipantStatus::Pending);
        }
        statuses
    }

    /// One federate asks for a federation save; every joined federate is
    /// told to save. The initiating engine instructs itself immediately and
    /// broadcasts; peers are instructed through `on_save_instructed`.
    pub fn request_save(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        time: Option<LogicalTime>,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) {
        self.session = Some(SaveRestoreSession {
            kind: SessionKind::Save,
            label: label.to_string(),
            time,
            phase: SessionPhase::Instructed,
            statuses: Self::all_participants(status),
        });
        status.save_state = SaveState::Requested;
        status.save_label = Some(label.to_string());
        outbound.push(FederationRequest::SaveRequest {
            label: label.to_string(),
            time,
        });
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::SaveRestore(
            SaveRestoreNotice::SaveInstructed {
                label: label.to_string(),
                time,
            },
        )));
    }

    /// Inbound: a peer requested a federation save.
    pub fn on_save_instructed(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        time: Option<LogicalTime>,
        queue: &mut EventQueue,
    ) {
        if self.session.is_some() {
            warn!("save instructed for {:?} while a session is active", label);
            return;
        }
        self.session = Some(SaveRestoreSession {
            kind: SessionKind::Save,
            label: label.to_string(),
            time,
            phase: SessionPhase::Instructed,
            statuses: Self::all_participants(status),
        });
        status.save_state = SaveState::Requested;
        status.save_label = Some(label.to_string());
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::SaveRestore(
            SaveRestoreNotice::SaveInstructed {
                label: label.to_string(),
                time,
            },
        )));
    }

    /// The local federate started writing its state. Returns the session
    /// label so the facade can invoke the persisted-state collaborator at
    /// exactly this boundary.
    pub fn save_begun(
        &mut self,
        status: &mut FederateStatus,
        me: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<String, SaveRestoreError> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Save => session,
            _ => return Err(SaveRestoreError::SaveNotInitiated),
        };
        if !matches!(
            session.phase,
            SessionPhase::Instructed | SessionPhase::Completing
        ) {
            return Err(SaveRestoreError::SaveNotInstructed {
                label: session.label.clone(),
            });
        }
        session.statuses.insert(me, ParticipantStatus::Begun);
        status.save_state = SaveState::InProgress;
        outbound.push(FederationRequest::SaveStatus {
            label: session.label.clone(),
            federate: me,
            status: ParticipantStatus::Begun,
        });
        Ok(session.label.clone())
    }

    /// The local federate finished (or failed) its part of the save.
    pub fn save_complete(
        &mut self,
        status: &mut FederateStatus,
        me: FederateHandle,
        success: bool,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<Option<SessionOutcome>, SaveRestoreError> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Save => session,
            _ => return Err(SaveRestoreError::SaveNotInitiated),
        };
        let reported = if success {
            ParticipantStatus::Complete
        } else {
            ParticipantStatus::Failed
        };
        session.statuses.insert(me, reported);
        session.phase = SessionPhase::Completing;
        status.save_state = if success {
            SaveState::Complete
        } else {
            SaveState::InProgress
        };
        outbound.push(FederationRequest::SaveStatus {
            label: session.label.clone(),
            federate: me,
            status: reported,
        });
        Ok(self.resolve(status, queue))
    }

    /// Inbound: a peer reported save progress.
    pub fn on_save_status(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        federate: FederateHandle,
        reported: ParticipantStatus,
        queue: &mut EventQueue,
    ) -> Option<SessionOutcome> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Save && session.label == label => session,
            _ => return None,
        };
        session.statuses.insert(federate, reported);
        if reported != ParticipantStatus::Begun {
            session.phase = SessionPhase::Completing;
        }
        self.resolve(status, queue)
    }

    pub fn request_restore(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) {
        self.session = Some(SaveRestoreSession {
            kind: SessionKind::Restore,
            label: label.to_string(),
            time: None,
            phase: SessionPhase::Instructed,
            statuses: Self::all_participants(status),
        });
        status.restore_state = RestoreState::Requested;
        status.restore_label = Some(label.to_string());
        outbound.push(FederationRequest::RestoreRequest {
            label: label.to_string(),
        });
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::SaveRestore(
            SaveRestoreNotice::RestoreInstructed {
                label: label.to_string(),
            },
        )));
    }

    pub fn on_restore_instructed(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        queue: &mut EventQueue,
    ) {
        if self.session.is_some() {
            warn!(
                "restore instructed for {:?} while a session is active",
                label
            );
            return;
        }
        self.session = Some(SaveRestoreSession {
            kind: SessionKind::Restore,
            label: label.to_string(),
            time: None,
            phase: SessionPhase::Instructed,
            statuses: Self::all_participants(status),
        });
        status.restore_state = RestoreState::Requested;
        status.restore_label = Some(label.to_string());
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::SaveRestore(
            SaveRestoreNotice::RestoreInstructed {
                label: label.to_string(),
            },
        )));
    }

    /// The local federate started reading back its state; the facade invokes
    /// the persisted-state collaborator at this boundary.
    pub fn restore_begun(
        &mut self,
        status: &mut FederateStatus,
        me: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<String, SaveRestoreError> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Restore => session,
            _ => return Err(SaveRestoreError::RestoreNotInitiated),
        };
        if !matches!(
            session.phase,
            SessionPhase::Instructed | SessionPhase::Completing
        ) {
            return Err(SaveRestoreError::RestoreNotInstructed {
                label: session.label.clone(),
            });
        }
        session.statuses.insert(me, ParticipantStatus::Begun);
        status.restore_state = RestoreState::InProgress;
        outbound.push(FederationRequest::RestoreStatus {
            label: session.label.clone(),
            federate: me,
            status: ParticipantStatus::Begun,
        });
        Ok(session.label.clone())
    }

    pub fn restore_complete(
        &mut self,
        status: &mut FederateStatus,
        me: FederateHandle,
        success: bool,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<Option<SessionOutcome>, SaveRestoreError> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Restore => session,
            _ => return Err(SaveRestoreError::RestoreNotInitiated),
        };
        let reported = if success {
            ParticipantStatus::Complete
        } else {
            ParticipantStatus::Failed
        };
        session.statuses.insert(me, reported);
        session.phase = SessionPhase::Completing;
        status.restore_state = if success {
            RestoreState::Complete
        } else {
            RestoreState::InProgress
        };
        outbound.push(FederationRequest::RestoreStatus {
            label: session.label.clone(),
            federate: me,
            status: reported,
        });
        Ok(self.resolve(status, queue))
    }

    pub fn on_restore_status(
        &mut self,
        status: &mut FederateStatus,
        label: &str,
        federate: FederateHandle,
        reported: ParticipantStatus,
        queue: &mut EventQueue,
    ) -> Option<SessionOutcome> {
        let session = match &mut self.session {
            Some(session) if session.kind == SessionKind::Restore && session.label == label => {
                session
            }
            _ => return None,
        };
        session.statuses.insert(federate, reported);
        if reported != ParticipantStatus::Begun {
            session.phase = SessionPhase::Completing;
        }
        self.resolve(status, queue)
    }

    /// A federate disconnected or resigned mid-session: counts as Failed.
    pub fn remove_federate(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        queue: &mut EventQueue,
    ) -> Option<SessionOutcome> {
        let session = self.session.as_mut()?;
        if session.statuses.contains_key(&federate) {
            session.statuses.insert(federate, ParticipantStatus::Failed);
            session.phase = SessionPhase::Completing;
        }
        self.resolve(status, queue)
    }

    fn resolve(
        &mut self,
        status: &mut FederateStatus,
        queue: &mut EventQueue,
    ) -> Option<SessionOutcome> {
        let session = self.session.as_mut()?;
        let any_failed = session
            .statuses
            .values()
            .any(|s| *s == ParticipantStatus::Failed);
        let all_complete = !session.statuses.is_empty()
            && session
                .statuses
                .values()
                .all(|s| *s == ParticipantStatus::Complete);
        if !any_failed && !all_complete {
            return None;
        }
        session.phase = if any_failed {
            SessionPhase::Aborted
        } else {
            SessionPhase::Done
        };

        let kind = session.kind;
        let label = session.label.clone();
        self.session = None;

        let (outcome, notice) = match (kind, any_failed) {
            (SessionKind::Save, false) => {
                trace!("federation saved: {:?}", label);
                (
                    SessionOutcome::Saved {
                        label: label.clone(),
                    },
                    SaveRestoreNotice::FederationSaved {
                        label: label.clone(),
                    },
                )
            }
            (SessionKind::Save, true) => (
                SessionOutcome::NotSaved {
                    label: label.clone(),
                },
                SaveRestoreNotice::FederationNotSaved {
                    label: label.clone(),
                },
            ),
            (SessionKind::Restore, false) => (
                SessionOutcome::Restored {
                    label: label.clone(),
                },
                SaveRestoreNotice::FederationRestored {
                    label: label.clone(),
                },
            ),
            (SessionKind::Restore, true) => (
                SessionOutcome::NotRestored {
                    label: label.clone(),
                },
                SaveRestoreNotice::FederationNotRestored { label },
            ),
        };

        match kind {
            SessionKind::Save => {
                status.save_state = SaveState::None;
                status.save_label = None;
            }
            SessionKind::Restore => {
                status.restore_state = RestoreState::None;
                status.restore_label = None;
            }
        }
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::SaveRestore(notice)));
        Some(outcome)
    }
}

impl Default for SaveRestoreManager {
    fn default() -> Self {
        Self::new()
    }
}
