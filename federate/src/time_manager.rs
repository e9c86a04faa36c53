use log::trace;

use fedra_shared::{
    EventKind, FederateHandle, FederationTimeView, LogicalTime, LogicalTimeInterval, PendingEvent,
    TimeError, TimeNotice,
};

use crate::{
    collaborators::FederationRequest,
    event_queue::EventQueue,
    status::{AdvancingState, FederateStatus},
};

/// Negotiates logical-time advancement for the local federate.
///
/// Owns the injected federation time view (updated by the transport through
/// `publish_time_contribution`) and the grant predicates for the four
/// advance primitives. Grants are re-evaluated reactively whenever the view
/// or the TSO queue changes; nothing here blocks on another federate.
pub struct TimeManager {
    view: FederationTimeView,
}

impl TimeManager {
    pub fn new() -> Self {
        Self {
            view: FederationTimeView::new(),
        }
    }

    pub fn set_contribution(&mut self, federate: FederateHandle, value: LogicalTime) {
        self.view.set_contribution(federate, value);
    }

    pub fn clear_contribution(&mut self, federate: FederateHandle) {
        self.view.clear_contribution(federate);
    }

    pub fn lbts(&self) -> Option<LogicalTime> {
        self.view.lbts()
    }

    /// Smallest timestamp that could still reach this federate: the minimum
    /// of the queued TSO front and the federation LBTS.
    pub fn min_next_event_time(&self, queue: &EventQueue) -> Option<LogicalTime> {
        match (queue.next_tso_timestamp(), self.view.lbts()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    fn check_no_pending_enable(status: &FederateStatus) -> Result<(), TimeError> {
        if status.regulation_pending {
            return Err(TimeError::EnableTimeRegulationPending);
        }
        if status.constrained_pending {
            return Err(TimeError::EnableTimeConstrainedPending);
        }
        Ok(())
    }

    pub fn enable_regulation(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        time: f64,
        lookahead: f64,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), TimeError> {
        if status.regulating {
            return Err(TimeError::TimeRegulationAlreadyEnabled);
        }
        if status.regulation_pending {
            return Err(TimeError::EnableTimeRegulationPending);
        }
        let time = LogicalTime::new(time)?;
        let lookahead = LogicalTimeInterval::new(lookahead)
            .map_err(|_| TimeError::InvalidLookahead { value: lookahead })?;

        status.lookahead = lookahead;
        status.regulation_pending = true;
        let basis = time.max(status.current_time);
        outbound.push(FederationRequest::EnableRegulation {
            federate,
            contribution: basis + lookahead,
        });
        Ok(())
    }

    /// Inbound confirmation that the federation accepted this federate as
    /// regulating, effective at `time`.
    pub fn confirm_regulation(
        &mut self,
        status: &mut FederateStatus,
        time: LogicalTime,
        queue: &mut EventQueue,
    ) {
        if !status.regulation_pending {
            return;
        }
        status.regulation_pending = false;
        status.regulating = true;
        status.current_time = status.current_time.max(time);
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Time(
            TimeNotice::RegulationEnabled { time },
        )));
    }

    pub fn disable_regulation(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), TimeError> {
        if !status.regulating {
            return Err(TimeError::TimeRegulationWasNotEnabled);
        }
        status.regulating = false;
        outbound.push(FederationRequest::TimeContribution {
            federate,
            value: None,
        });
        Ok(())
    }

    pub fn enable_constrained(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), TimeError> {
        if status.constrained {
            return Err(TimeError::TimeConstrainedAlreadyEnabled);
        }
        if status.constrained_pending {
            return Err(TimeError::EnableTimeConstrainedPending);
        }
        status.constrained_pending = true;
        outbound.push(FederationRequest::EnableConstrained { federate });
        Ok(())
    }

    pub fn confirm_constrained(
        &mut self,
        status: &mut FederateStatus,
        time: LogicalTime,
        queue: &mut EventQueue,
    ) {
        if !status.constrained_pending {
            return;
        }
        status.constrained_pending = false;
        status.constrained = true;
        status.current_time = status.current_time.max(time);
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Time(
            TimeNotice::ConstrainedEnabled { time },
        )));
    }

    pub fn disable_constrained(&mut self, status: &mut FederateStatus) -> Result<(), TimeError> {
        if !status.constrained {
            return Err(TimeError::TimeConstrainedWasNotEnabled);
        }
        status.constrained = false;
        Ok(())
    }

    /// Changing lookahead republishes this federate's contribution; it never
    /// retroactively invalidates an advance already granted.
    pub fn modify_lookahead(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        value: f64,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), TimeError> {
        let lookahead =
            LogicalTimeInterval::new(value).map_err(|_| TimeError::InvalidLookahead { value })?;
        status.lookahead = lookahead;
        if status.regulating {
            self.push_contribution(status, federate, outbound);
        }
        Ok(())
    }

    fn validate_advance(status: &FederateStatus, time: f64) -> Result<LogicalTime, TimeError> {
        Self::check_no_pending_enable(status)?;
        let time = LogicalTime::new(time)?;
        if time <= status.current_time {
            return Err(TimeError::FederationTimeAlreadyPassed {
                requested: time.value(),
                current: status.current_time.value(),
            });
        }
        Ok(time)
    }

    /// Strict advance: after the grant, every TSO event at or below the
    /// grant time has been delivered.
    pub fn time_advance_request(
        &mut self,
        status: &mut FederateStatus,
        time: f64,
    ) -> Result<(), TimeError> {
        let time = Self::validate_advance(status, time)?;
        status.requested_time = Some(time);
        status.advancing = AdvancingState::TimeAdvancing;
        Ok(())
    }

    /// Boundary-tolerant advance: "advance to t, deliver if ready"; events
    /// at exactly `t` may still arrive after the grant.
    pub fn time_advance_request_available(
        &mut self,
        status: &mut FederateStatus,
        time: f64,
    ) -> Result<(), TimeError> {
        let time = Self::validate_advance(status, time)?;
        status.requested_time = Some(time);
        status.advancing = AdvancingState::TimeAdvanceAvailable;
        Ok(())
    }

    /// Advance to the earlier of `time` and the next queued TSO timestamp.
    pub fn next_event_request(
        &mut self,
        status: &mut FederateStatus,
        time: f64,
    ) -> Result<(), TimeError> {
        let time = Self::validate_advance(status, time)?;
        status.requested_time = Some(time);
        status.advancing = AdvancingState::NextEventPending;
        Ok(())
    }

    /// Unconditional advance that delivers every queued TSO event at or
    /// below `time`, ignoring the LBTS gate. An explicit consistency-breaking
    /// escape for fast-forwarding.
    pub fn flush_queue_request(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        queue: &mut EventQueue,
        time: f64,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), TimeError> {
        let time = Self::validate_advance(status, time)?;
        queue.release_up_to(time);
        self.grant(status, federate, queue, time, outbound);
        Ok(())
    }

    /// Re-evaluate the outstanding advance against the current LBTS view and
    /// queue state. Returns true when a grant fired.
    pub fn evaluate_grant(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> bool {
        let Some(requested) = status.requested_time else {
            return false;
        };

        match status.advancing {
            AdvancingState::Idle => false,
            AdvancingState::TimeAdvancing => {
                if status.constrained && !self.view.permits(requested) {
                    return false;
                }
                queue.release_up_to(requested);
                self.grant(status, federate, queue, requested, outbound);
                true
            }
            AdvancingState::TimeAdvanceAvailable => {
                if status.constrained && !self.view.permits(requested) {
                    return false;
                }
                queue.release_before(requested);
                self.grant(status, federate, queue, requested, outbound);
                true
            }
            AdvancingState::NextEventPending => {
                let effective = match queue.next_tso_timestamp() {
                    Some(next) => next.min(requested),
                    None => requested,
                };
                if status.constrained && !self.view.permits(effective) {
                    return false;
                }
                queue.release_up_to(effective);
                self.grant(status, federate, queue, effective, outbound);
                true
            }
        }
    }

    fn grant(
        &mut self,
        status: &mut FederateStatus,
        federate: FederateHandle,
        queue: &mut EventQueue,
        time: LogicalTime,
        outbound: &mut Vec<FederationRequest>,
    ) {
        trace!("time advance granted at {}", time);
        status.current_time = time;
        status.requested_time = None;
        status.advancing = AdvancingState::Idle;
        queue.enqueue_released(PendingEvent::receive_ordered(EventKind::Time(
            TimeNotice::AdvanceGrant { time },
        )));
        if status.regulating {
            self.push_contribution(status, federate, outbound);
        }
    }

    fn push_contribution(
        &mut self,
        status: &FederateStatus,
        federate: FederateHandle,
        outbound: &mut Vec<FederationRequest>,
    ) {
        outbound.push(FederationRequest::TimeContribution {
            federate,
            value: Some(status.current_time + status.lookahead),
        });
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new()
    }
}
