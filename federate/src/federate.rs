use std::{
    collections::HashSet,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{trace, warn};

use fedra_shared::{
    AttributeHandle, EventKind, FederateHandle, FederationError, GuardError, InteractionClassHandle,
    LogicalTime, LogicalTimeInterval, MembershipNotice, MessagingError, ObjectHandle,
    OwnershipError, OwnershipNotice, PendingEvent, SaveRestoreNotice, SyncNotice, TimeNotice,
};

use crate::{
    collaborators::{FederationRequest, FederationTransport, ObjectModel, PersistedState},
    event_queue::EventQueue,
    ownership::{Owner, OwnershipManager},
    save_restore::{SaveRestoreManager, SessionOutcome},
    status::{FederateStatus, MembershipState, SaveState},
    sync_point::SyncPointManager,
    time_manager::TimeManager,
};

/// How a drain call waits for deliverable events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainMode {
    /// Wait until at least one event is deliverable, then deliver everything
    /// immediately deliverable.
    Blocking,
    /// Deliver everything immediately deliverable, possibly nothing.
    NonBlocking,
    /// Wait until at least `min` events are deliverable, deliver at most
    /// `max`.
    Bounded { min: usize, max: usize },
}

/// Receives queued callbacks synchronously on the draining thread.
pub trait EventSink: Send {
    fn on_event(&mut self, event: PendingEvent);
}

struct Engine {
    status: FederateStatus,
    queue: EventQueue,
    time: TimeManager,
    ownership: OwnershipManager,
    sync: SyncPointManager,
    save_restore: SaveRestoreManager,
}

impl Engine {
    fn new() -> Self {
        Self {
            status: FederateStatus::new(),
            queue: EventQueue::new(),
            time: TimeManager::new(),
            ownership: OwnershipManager::new(),
            sync: SyncPointManager::new(),
            save_restore: SaveRestoreManager::new(),
        }
    }

    fn me(&self) -> Result<FederateHandle, GuardError> {
        self.status
            .handle
            .ok_or(GuardError::FederateNotExecutionMember)
    }

    /// Guard sequence for ordinary service calls; evaluated before any
    /// state mutation.
    fn guard_service(&self) -> Result<FederateHandle, GuardError> {
        self.status.check_access()?;
        self.status.check_joined()?;
        self.status.check_save()?;
        self.status.check_restore()?;
        self.me()
    }

    fn evaluate_grant(&mut self, outbound: &mut Vec<FederationRequest>) {
        if let Some(me) = self.status.handle {
            self.time
                .evaluate_grant(&mut self.status, me, &mut self.queue, outbound);
        }
    }

    fn roster(&self) -> HashSet<FederateHandle> {
        let mut roster = self.status.peers.clone();
        if let Some(me) = self.status.handle {
            roster.insert(me);
        }
        roster
    }
}

/// The coordination facade: the single entry point every external service
/// call and every inbound network message passes through.
///
/// Owns one instance of each coordinator (no process-wide singletons),
/// applies the concurrent-access guard and the save/restore lock first, then
/// routes to the right sub-protocol. Service calls run on the federate's own
/// thread; `admit` and `publish_time_contribution` may run on the
/// transport's thread.
pub struct Federate {
    engine: Mutex<Engine>,
    wakeup: Condvar,
    sink: Mutex<Option<Box<dyn EventSink>>>,
    object_model: Box<dyn ObjectModel>,
    transport: Box<dyn FederationTransport>,
    persisted: Mutex<Box<dyn PersistedState>>,
}

impl Federate {
    pub fn new(
        object_model: Box<dyn ObjectModel>,
        transport: Box<dyn FederationTransport>,
        persisted: Box<dyn PersistedState>,
    ) -> Self {
        Self {
            engine: Mutex::new(Engine::new()),
            wakeup: Condvar::new(),
            sink: Mutex::new(None),
            object_model,
            transport,
            persisted: Mutex::new(persisted),
        }
    }

    pub fn set_event_sink(&self, sink: Box<dyn EventSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast collected requests and wake any blocked drain.
    fn finish(&self, outbound: Vec<FederationRequest>) {
        for request in outbound {
            self.transport.broadcast(request);
        }
        self.wakeup.notify_all();
    }

    // ---------- membership ----------

    pub fn join(&self, federate: FederateHandle) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            if engine.status.membership == MembershipState::Joined {
                return Err(GuardError::FederateAlreadyExecutionMember.into());
            }
            engine.status = FederateStatus::new();
            engine.status.membership = MembershipState::Joined;
            engine.status.handle = Some(federate);
            outbound.push(FederationRequest::Join { federate });
        }
        self.finish(outbound);
        Ok(())
    }

    /// Resign: discard undelivered events, withdraw the time contribution,
    /// release owned attributes, fail any active save/restore session and
    /// leave the federation.
    pub fn resign(&self) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            engine.status.check_joined()?;
            let me = engine.me()?;
            engine.status.membership = MembershipState::Resigning;

            engine.ownership.release_all(me, &mut outbound);
            if engine.status.regulating {
                outbound.push(FederationRequest::TimeContribution {
                    federate: me,
                    value: None,
                });
            }
            engine
                .save_restore
                .remove_federate(&mut engine.status, me, &mut engine.queue);
            engine.sync.remove_federate(me, &mut engine.queue);
            engine.queue.discard_all();
            outbound.push(FederationRequest::Resign { federate: me });

            engine.status = FederateStatus::new();
        }
        self.finish(outbound);
        Ok(())
    }

    // ---------- time management ----------

    pub fn enable_time_regulation(
        &self,
        time: f64,
        lookahead: f64,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.status.check_advancing()?;
            engine
                .time
                .enable_regulation(&mut engine.status, me, time, lookahead, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn disable_time_regulation(&self) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine
                .time
                .disable_regulation(&mut engine.status, me, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn enable_time_constrained(&self) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.status.check_advancing()?;
            engine
                .time
                .enable_constrained(&mut engine.status, me, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn disable_time_constrained(&self) -> Result<(), FederationError> {
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            engine.time.disable_constrained(&mut engine.status)?;
        }
        self.finish(Vec::new());
        Ok(())
    }

    pub fn modify_lookahead(&self, lookahead: f64) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine
                .time
                .modify_lookahead(&mut engine.status, me, lookahead, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn time_advance_request(&self, time: f64) -> Result<(), FederationError> {
        self.advance(time, |engine, time| {
            engine.time.time_advance_request(&mut engine.status, time)
        })
    }

    pub fn time_advance_request_available(&self, time: f64) -> Result<(), FederationError> {
        self.advance(time, |engine, time| {
            engine
                .time
                .time_advance_request_available(&mut engine.status, time)
        })
    }

    pub fn next_event_request(&self, time: f64) -> Result<(), FederationError> {
        self.advance(time, |engine, time| {
            engine.time.next_event_request(&mut engine.status, time)
        })
    }

    fn advance(
        &self,
        time: f64,
        request: impl FnOnce(&mut Engine, f64) -> Result<(), fedra_shared::TimeError>,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            engine.status.check_advancing()?;
            request(&mut *engine, time)?;
            // a grant may already be possible (unconstrained, or LBTS ahead)
            engine.evaluate_grant(&mut outbound);
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn flush_queue_request(&self, time: f64) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.status.check_advancing()?;
            engine.time.flush_queue_request(
                &mut engine.status,
                me,
                &mut engine.queue,
                time,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        Ok(())
    }

    // ---------- time queries ----------

    fn guard_query(engine: &Engine) -> Result<(), FederationError> {
        engine.status.check_joined()?;
        engine.status.check_save()?;
        engine.status.check_restore()?;
        Ok(())
    }

    pub fn query_federate_time(&self) -> Result<LogicalTime, FederationError> {
        let guard = self.engine();
        Self::guard_query(&guard)?;
        Ok(guard.status.current_time)
    }

    pub fn query_lookahead(&self) -> Result<LogicalTimeInterval, FederationError> {
        let guard = self.engine();
        Self::guard_query(&guard)?;
        Ok(guard.status.lookahead)
    }

    pub fn query_lbts(&self) -> Result<Option<LogicalTime>, FederationError> {
        let guard = self.engine();
        Self::guard_query(&guard)?;
        Ok(guard.time.lbts())
    }

    pub fn query_min_next_event_time(&self) -> Result<Option<LogicalTime>, FederationError> {
        let guard = self.engine();
        Self::guard_query(&guard)?;
        Ok(guard.time.min_next_event_time(&guard.queue))
    }

    // ---------- objects & messaging ----------

    /// Create the ownership records for a newly published object instance;
    /// this federate starts as owner of every listed attribute.
    pub fn register_object(
        &self,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), FederationError> {
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            let class = self
                .object_model
                .object_class(object)
                .ok_or(MessagingError::ObjectClassNotPublished)?;
            if !self.object_model.publishes_class(me, class) {
                return Err(MessagingError::ObjectClassNotPublished.into());
            }
            for attribute in attributes {
                engine
                    .ownership
                    .register_attribute(object, *attribute, Owner::Federate(me));
            }
        }
        self.finish(Vec::new());
        Ok(())
    }

    pub fn delete_object(&self, object: ObjectHandle) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            engine.ownership.remove_object(object);
            outbound.push(FederationRequest::DeleteObject { object });
        }
        self.finish(outbound);
        Ok(())
    }

    fn validate_send_time(
        engine: &Engine,
        timestamp: Option<f64>,
    ) -> Result<Option<LogicalTime>, FederationError> {
        let Some(timestamp) = timestamp else {
            return Ok(None);
        };
        if !engine.status.regulating {
            return Err(MessagingError::NotRegulating.into());
        }
        let time = LogicalTime::new(timestamp).map_err(|_| MessagingError::InvalidTimestamp {
            reason: format!("value {timestamp} is not a finite number"),
        })?;
        let earliest = engine.status.current_time + engine.status.lookahead;
        if time < earliest {
            return Err(MessagingError::TimestampBelowLookahead {
                timestamp,
                earliest: earliest.value(),
            }
            .into());
        }
        Ok(Some(time))
    }

    pub fn send_interaction(
        &self,
        class: InteractionClassHandle,
        payload: Vec<u8>,
        timestamp: Option<f64>,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            if !self.object_model.publishes_interaction(me, class) {
                return Err(MessagingError::InteractionClassNotPublished.into());
            }
            let timestamp = Self::validate_send_time(engine, timestamp)?;
            outbound.push(FederationRequest::Interaction {
                class,
                payload,
                timestamp,
            });
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn update_attribute_values(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
        payload: Vec<u8>,
        timestamp: Option<f64>,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            if engine.ownership.query_ownership(object, attribute)? != Owner::Federate(me) {
                return Err(OwnershipError::AttributeNotOwned.into());
            }
            let timestamp = Self::validate_send_time(engine, timestamp)?;
            outbound.push(FederationRequest::AttributeUpdate {
                object,
                attribute,
                payload,
                timestamp,
            });
        }
        self.finish(outbound);
        Ok(())
    }

    // ---------- ownership ----------

    fn check_acquire_publication(
        &self,
        me: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let class = self
            .object_model
            .object_class(object)
            .ok_or(OwnershipError::ObjectClassNotPublished)?;
        if !self.object_model.publishes_class(me, class) {
            return Err(OwnershipError::ObjectClassNotPublished.into());
        }
        if !self.object_model.publishes_attribute(me, object, attribute) {
            return Err(OwnershipError::AttributeNotPublished.into());
        }
        Ok(())
    }

    pub fn unconditional_divest(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.ownership.divest_unconditional(
                me,
                object,
                attribute,
                &mut engine.queue,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn negotiated_divest(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.ownership.divest_negotiated(me, object, attribute)?;
        }
        self.finish(Vec::new());
        Ok(())
    }

    pub fn cancel_divest(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.ownership.cancel_divest(me, object, attribute)?;
        }
        self.finish(Vec::new());
        Ok(())
    }

    pub fn acquire(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            self.check_acquire_publication(me, object, attribute)?;
            engine
                .ownership
                .acquire(me, object, attribute, &mut engine.queue, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn acquire_if_available(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            self.check_acquire_publication(me, object, attribute)?;
            engine.ownership.acquire_if_available(
                me,
                object,
                attribute,
                &mut engine.queue,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        Ok(())
    }

    /// Withdraw a pending acquisition. The current owner is told so its
    /// release negotiation unwinds instead of resolving toward a requester
    /// that no longer wants the attribute.
    pub fn cancel_acquire(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.ownership.cancel_acquire(me, object, attribute)?;
            outbound.push(FederationRequest::CancelAcquire {
                object,
                attribute,
                requester: me,
            });
        }
        self.finish(outbound);
        Ok(())
    }

    /// The owner's answer to a release request, or the completion of a
    /// negotiated divestiture.
    pub fn attribute_release_response(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine.ownership.release_response(
                me,
                object,
                attribute,
                &mut engine.queue,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        Ok(())
    }

    /// Synchronous read of the ownership record; no negotiation.
    pub fn query_attribute_ownership(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<Owner, FederationError> {
        let guard = self.engine();
        Self::guard_query(&guard)?;
        Ok(guard.ownership.query_ownership(object, attribute)?)
    }

    // ---------- synchronization points ----------

    pub fn register_sync_point(
        &self,
        label: &str,
        targets: Option<Vec<FederateHandle>>,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            let targets = targets.map(|t| t.into_iter().collect::<HashSet<_>>());
            let roster = engine.roster();
            engine
                .sync
                .register(label, targets, roster, &mut engine.queue, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    pub fn sync_point_achieved(&self, label: &str) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            let me = engine.guard_service()?;
            engine
                .sync
                .achieved(me, label, &mut engine.queue, &mut outbound)?;
        }
        self.finish(outbound);
        Ok(())
    }

    // ---------- save / restore ----------

    pub fn request_federation_save(
        &self,
        label: &str,
        time: Option<f64>,
    ) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            let time = match time {
                Some(value) => Some(LogicalTime::new(value).map_err(fedra_shared::TimeError::from)?),
                None => None,
            };
            engine
                .save_restore
                .request_save(&mut engine.status, label, time, &mut engine.queue, &mut outbound);
        }
        self.finish(outbound);
        Ok(())
    }

    /// Save-protocol call: permitted while the save session is active. The
    /// persisted-state collaborator runs at exactly this boundary; a persist
    /// failure is reported into the session rather than returned.
    pub fn federate_save_begun(&self) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        let label;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            engine.status.check_joined()?;
            engine.status.check_restore()?;
            let me = engine.me()?;
            label = engine
                .save_restore
                .save_begun(&mut engine.status, me, &mut outbound)?;
        }
        self.finish(outbound);

        let persist_result = self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save_state(&label);
        if let Err(err) = persist_result {
            warn!("federate save failed: {}", err);
            self.federate_save_complete(false)?;
        }
        Ok(())
    }

    pub fn federate_save_complete(&self, success: bool) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        let outcome;
        let was_complete;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            engine.status.check_joined()?;
            engine.status.check_restore()?;
            let me = engine.me()?;
            was_complete = success;
            outcome = engine.save_restore.save_complete(
                &mut engine.status,
                me,
                success,
                &mut engine.queue,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        self.apply_outcome(outcome, was_complete);
        Ok(())
    }

    pub fn request_federation_restore(&self, label: &str) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.guard_service()?;
            engine
                .save_restore
                .request_restore(&mut engine.status, label, &mut engine.queue, &mut outbound);
        }
        self.finish(outbound);
        Ok(())
    }

    /// Restore-protocol call; reads the snapshot back through the
    /// persisted-state collaborator at exactly this boundary.
    pub fn federate_restore_begun(&self) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        let label;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            engine.status.check_joined()?;
            engine.status.check_save()?;
            let me = engine.me()?;
            label = engine
                .save_restore
                .restore_begun(&mut engine.status, me, &mut outbound)?;
        }
        self.finish(outbound);

        let persist_result = self
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .restore_state(&label);
        if let Err(err) = persist_result {
            warn!("federate restore failed: {}", err);
            self.federate_restore_complete(false)?;
        }
        Ok(())
    }

    pub fn federate_restore_complete(&self, success: bool) -> Result<(), FederationError> {
        let mut outbound = Vec::new();
        let outcome;
        let was_complete;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            engine.status.check_access()?;
            engine.status.check_joined()?;
            engine.status.check_save()?;
            let me = engine.me()?;
            was_complete = success;
            outcome = engine.save_restore.restore_complete(
                &mut engine.status,
                me,
                success,
                &mut engine.queue,
                &mut outbound,
            )?;
        }
        self.finish(outbound);
        self.apply_outcome(outcome, was_complete);
        Ok(())
    }

    /// Roll the federate's own persisted part back when a session aborted
    /// after this federate had already completed locally.
    fn apply_outcome(&self, outcome: Option<SessionOutcome>, own_part_complete: bool) {
        let label = match outcome {
            Some(SessionOutcome::NotSaved { label }) if own_part_complete => label,
            Some(SessionOutcome::NotRestored { label }) if own_part_complete => label,
            _ => return,
        };
        self.persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rollback_state(&label);
    }

    // ---------- delivery configuration ----------

    pub fn enable_async_delivery(&self) -> Result<(), FederationError> {
        let mut guard = self.engine();
        guard.status.check_access()?;
        guard.status.check_joined()?;
        guard.queue.set_async_delivery(true);
        Ok(())
    }

    pub fn disable_async_delivery(&self) -> Result<(), FederationError> {
        let mut guard = self.engine();
        guard.status.check_access()?;
        guard.status.check_joined()?;
        guard.queue.set_async_delivery(false);
        Ok(())
    }

    // ---------- inbound (transport side) ----------

    /// Update one regulating federate's LBTS contribution (None withdraws
    /// it) and re-evaluate any outstanding advance.
    pub fn publish_time_contribution(
        &self,
        federate: FederateHandle,
        value: Option<LogicalTime>,
    ) {
        let mut outbound = Vec::new();
        let async_delivery;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            match value {
                Some(value) => engine.time.set_contribution(federate, value),
                None => engine.time.clear_contribution(federate),
            }
            engine.evaluate_grant(&mut outbound);
            async_delivery = engine.queue.async_delivery();
        }
        self.finish(outbound);
        if async_delivery {
            let _ = self.drain(DrainMode::NonBlocking);
        }
    }

    /// Feed one inbound network notification into the engine. Protocol
    /// notices are interpreted here; data events are queued for delivery.
    pub fn admit(&self, event: PendingEvent) {
        let mut outbound = Vec::new();
        let mut outcome = None;
        let was_complete;
        let async_delivery;
        {
            let mut guard = self.engine();
            let engine = &mut *guard;
            was_complete = engine.status.save_state == SaveState::Complete
                || engine.status.restore_state == crate::status::RestoreState::Complete;
            Self::handle_inbound(engine, event, &mut outbound, &mut outcome);
            engine.evaluate_grant(&mut outbound);
            async_delivery = engine.queue.async_delivery();
        }
        self.finish(outbound);
        self.apply_outcome(outcome, was_complete);
        if async_delivery {
            let _ = self.drain(DrainMode::NonBlocking);
        }
    }

    fn handle_inbound(
        engine: &mut Engine,
        event: PendingEvent,
        outbound: &mut Vec<FederationRequest>,
        outcome: &mut Option<SessionOutcome>,
    ) {
        match &event.kind {
            EventKind::AttributeUpdate { .. } | EventKind::Interaction { .. } => {
                let current = engine.status.current_time;
                if let Err(err) = engine.queue.admit(event, current) {
                    warn!("inbound event dropped: {}", err);
                }
            }
            EventKind::ObjectRemoved { object } => {
                let object = *object;
                engine.ownership.remove_object(object);
                let current = engine.status.current_time;
                if let Err(err) = engine.queue.admit(event, current) {
                    warn!("object removal dropped: {}", err);
                }
            }
            EventKind::Time(notice) => match notice.clone() {
                TimeNotice::RegulationEnabled { time } => {
                    engine
                        .time
                        .confirm_regulation(&mut engine.status, time, &mut engine.queue);
                    if let Some(me) = engine.status.handle {
                        outbound.push(FederationRequest::TimeContribution {
                            federate: me,
                            value: Some(engine.status.current_time + engine.status.lookahead),
                        });
                    }
                }
                TimeNotice::ConstrainedEnabled { time } => {
                    engine
                        .time
                        .confirm_constrained(&mut engine.status, time, &mut engine.queue);
                }
                TimeNotice::AdvanceGrant { .. } => {
                    warn!("ignoring inbound advance grant; grants are local decisions");
                }
            },
            EventKind::Membership(notice) => match notice.clone() {
                MembershipNotice::Joined { federate } => {
                    if engine.status.handle != Some(federate) {
                        engine.status.peers.insert(federate);
                        engine.queue.enqueue_local(PendingEvent::receive_ordered(
                            EventKind::Membership(MembershipNotice::Joined { federate }),
                        ));
                    }
                }
                MembershipNotice::Resigned { federate } => {
                    engine.status.peers.remove(&federate);
                    engine.time.clear_contribution(federate);
                    engine.sync.remove_federate(federate, &mut engine.queue);
                    *outcome = engine.save_restore.remove_federate(
                        &mut engine.status,
                        federate,
                        &mut engine.queue,
                    );
                    engine.queue.enqueue_local(PendingEvent::receive_ordered(
                        EventKind::Membership(MembershipNotice::Resigned { federate }),
                    ));
                }
            },
            EventKind::Ownership(notice) => match notice.clone() {
                OwnershipNotice::ReleaseRequested {
                    object,
                    attribute,
                    requester,
                } => {
                    if let Some(me) = engine.status.handle {
                        engine.ownership.on_acquisition_request(
                            me,
                            object,
                            attribute,
                            requester,
                            &mut engine.queue,
                        );
                    }
                }
                OwnershipNotice::Transferred {
                    object,
                    attribute,
                    new_owner,
                } => {
                    if let Some(me) = engine.status.handle {
                        let owner = match new_owner {
                            Some(federate) => Owner::Federate(federate),
                            None => Owner::Unowned,
                        };
                        engine.ownership.on_ownership_transferred(
                            me,
                            object,
                            attribute,
                            owner,
                            &mut engine.queue,
                            outbound,
                        );
                    }
                }
                OwnershipNotice::AcquisitionCanceled {
                    object,
                    attribute,
                    requester,
                } => {
                    if let Some(me) = engine.status.handle {
                        engine
                            .ownership
                            .on_acquisition_canceled(me, object, attribute, requester);
                    }
                }
                other => {
                    engine
                        .queue
                        .enqueue_local(PendingEvent::receive_ordered(EventKind::Ownership(other)));
                }
            },
            EventKind::Sync(notice) => match notice.clone() {
                SyncNotice::Announced { label, targets } => {
                    let set: HashSet<FederateHandle> = if targets.is_empty() {
                        engine.roster()
                    } else {
                        targets.into_iter().collect()
                    };
                    engine.sync.on_announced(&label, set, &mut engine.queue);
                }
                SyncNotice::Achieved { label, federate } => {
                    engine.sync.on_achieved(&label, federate, &mut engine.queue);
                }
                SyncNotice::FederationSynchronized { label } => {
                    trace!("ignoring inbound synchronized notice for {:?}", label);
                }
            },
            EventKind::SaveRestore(notice) => match notice.clone() {
                SaveRestoreNotice::SaveInstructed { label, time } => {
                    engine.save_restore.on_save_instructed(
                        &mut engine.status,
                        &label,
                        time,
                        &mut engine.queue,
                    );
                }
                SaveRestoreNotice::SaveStatus {
                    label,
                    federate,
                    status,
                } => {
                    *outcome = engine.save_restore.on_save_status(
                        &mut engine.status,
                        &label,
                        federate,
                        status,
                        &mut engine.queue,
                    );
                }
                SaveRestoreNotice::RestoreInstructed { label } => {
                    engine.save_restore.on_restore_instructed(
                        &mut engine.status,
                        &label,
                        &mut engine.queue,
                    );
                }
                SaveRestoreNotice::RestoreStatus {
                    label,
                    federate,
                    status,
                } => {
                    *outcome = engine.save_restore.on_restore_status(
                        &mut engine.status,
                        &label,
                        federate,
                        status,
                        &mut engine.queue,
                    );
                }
                SaveRestoreNotice::FederationSaved { .. }
                | SaveRestoreNotice::FederationNotSaved { .. }
                | SaveRestoreNotice::FederationRestored { .. }
                | SaveRestoreNotice::FederationNotRestored { .. } => {
                    // computed locally from participant statuses
                }
            },
        }
    }

    // ---------- drain ----------

    /// Pop and deliver deliverable events, in order, invoking the registered
    /// sink synchronously on the calling thread. The number of callbacks is
    /// bounded by what was deliverable when the drain began, so events
    /// enqueued by a callback wait for the next pass.
    pub fn drain(&self, mode: DrainMode) -> Result<usize, FederationError> {
        let (min, max) = match mode {
            DrainMode::Blocking => (1, usize::MAX),
            DrainMode::NonBlocking => (0, usize::MAX),
            DrainMode::Bounded { min, max } => (min, max),
        };

        // re-entrancy check before touching the sink lock: a drain issued
        // from inside a callback must fail, not block on its own delivery
        {
            let guard = self.engine();
            guard.status.check_access()?;
        }
        {
            let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
            if sink.is_none() {
                return Ok(0);
            }
        }

        let mut guard = self.engine();
        guard.status.check_access()?;
        while guard.queue.deliverable_len(guard.status.current_time) < min {
            guard = self
                .wakeup
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let budget = guard
            .queue
            .deliverable_len(guard.status.current_time)
            .min(max);
        let mut delivered = 0;
        while delivered < budget {
            let current = guard.status.current_time;
            let Some(event) = guard.queue.pop_deliverable(current) else {
                break;
            };
            guard.status.executing_callback = true;
            drop(guard);

            {
                let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(sink) = sink.as_mut() {
                    sink.on_event(event);
                }
            }

            guard = self.engine();
            guard.status.executing_callback = false;
            delivered += 1;
        }
        Ok(delivered)
    }
}
