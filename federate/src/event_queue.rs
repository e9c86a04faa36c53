use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, VecDeque},
};

use thiserror::Error;

use fedra_shared::{DeliveryDiscipline, LogicalTime, PendingEvent};

/// Errors that can occur admitting an inbound event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    /// TSO event arrived with a timestamp below the federate's current time
    #[error("TSO event timestamp {timestamp} already passed; federate time is {current}")]
    TimeAlreadyPassed { timestamp: f64, current: f64 },

    /// TSO event arrived without a timestamp
    #[error("TSO event admitted without a timestamp")]
    MissingTimestamp,
}

/// Heap entry ordered by (timestamp, sequence); sequence breaks ties so
/// equal-timestamp events deliver in arrival order at the origin.
#[derive(Debug)]
struct TsoEntry(PendingEvent);

impl TsoEntry {
    fn key(&self) -> (LogicalTime, u64) {
        // admit() guarantees the timestamp is present
        (self.0.timestamp.unwrap_or(LogicalTime::ZERO), self.0.sequence)
    }
}

impl PartialEq for TsoEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TsoEntry {}

impl PartialOrd for TsoEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TsoEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Dual-discipline buffer of inbound events awaiting delivery.
///
/// Receive-ordered events are FIFO by arrival with no time gating.
/// Timestamp-ordered events are held in ascending timestamp order and only
/// become deliverable once released by a time advance grant (or once the
/// federate's current time has reached their timestamp).
pub struct EventQueue {
    ro: VecDeque<PendingEvent>,
    tso: BinaryHeap<Reverse<TsoEntry>>,
    /// TSO events released by a grant, with the grant notice behind them;
    /// ahead of gated TSO events and every RO event.
    released: VecDeque<PendingEvent>,
    async_delivery: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            ro: VecDeque::new(),
            tso: BinaryHeap::new(),
            released: VecDeque::new(),
            async_delivery: false,
        }
    }

    /// Deliver-on-admit toggle; a configuration switch, not a separate
    /// delivery path.
    pub fn set_async_delivery(&mut self, enabled: bool) {
        self.async_delivery = enabled;
    }

    pub fn async_delivery(&self) -> bool {
        self.async_delivery
    }

    pub fn admit(
        &mut self,
        event: PendingEvent,
        current_time: LogicalTime,
    ) -> Result<(), QueueError> {
        match event.discipline {
            DeliveryDiscipline::ReceiveOrder => {
                self.ro.push_back(event);
                Ok(())
            }
            DeliveryDiscipline::TimestampOrder => {
                let Some(timestamp) = event.timestamp else {
                    return Err(QueueError::MissingTimestamp);
                };
                if timestamp < current_time {
                    return Err(QueueError::TimeAlreadyPassed {
                        timestamp: timestamp.value(),
                        current: current_time.value(),
                    });
                }
                self.tso.push(Reverse(TsoEntry(event)));
                Ok(())
            }
        }
    }

    /// Minimum timestamp currently queued or released, or None. This is the
    /// value a next-event-request needs to compute its effective grant time.
    pub fn next_tso_timestamp(&self) -> Option<LogicalTime> {
        let queued = self.tso.peek().and_then(|Reverse(entry)| entry.0.timestamp);
        // grant notices in the released lane carry no timestamp; skip them
        let released = self
            .released
            .iter()
            .filter_map(|event| event.timestamp)
            .min();
        match (queued, released) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    pub fn has_tso_before(&self, bound: LogicalTime) -> bool {
        match self.next_tso_timestamp() {
            Some(timestamp) => timestamp < bound,
            None => false,
        }
    }

    /// Release every queued TSO event with timestamp <= `bound` into the
    /// delivery stream, in ascending order. Used by strict grants, flushes
    /// and next-event grants.
    pub fn release_up_to(&mut self, bound: LogicalTime) {
        while let Some(Reverse(entry)) = self.tso.peek() {
            match entry.0.timestamp {
                Some(timestamp) if timestamp <= bound => {
                    if let Some(Reverse(entry)) = self.tso.pop() {
                        self.released.push_back(entry.0);
                    }
                }
                _ => break,
            }
        }
    }

    /// Release only events strictly below `bound`; the boundary-tolerant
    /// grant leaves events at exactly the grant time to later drains.
    pub fn release_before(&mut self, bound: LogicalTime) {
        while let Some(Reverse(entry)) = self.tso.peek() {
            match entry.0.timestamp {
                Some(timestamp) if timestamp < bound => {
                    if let Some(Reverse(entry)) = self.tso.pop() {
                        self.released.push_back(entry.0);
                    }
                }
                _ => break,
            }
        }
    }

    /// Number of events deliverable right now; drains snapshot this before
    /// delivering so that events enqueued *by* a callback wait for the next
    /// pass.
    pub fn deliverable_len(&self, current_time: LogicalTime) -> usize {
        let gated = self
            .tso
            .iter()
            .filter(|Reverse(entry)| {
                entry
                    .0
                    .timestamp
                    .map(|timestamp| timestamp <= current_time)
                    .unwrap_or(false)
            })
            .count();
        self.released.len() + gated + self.ro.len()
    }

    /// Pop the next deliverable event: released TSO first, then TSO at or
    /// below the federate's current time, then RO FIFO.
    pub fn pop_deliverable(&mut self, current_time: LogicalTime) -> Option<PendingEvent> {
        if let Some(event) = self.released.pop_front() {
            return Some(event);
        }
        if let Some(Reverse(entry)) = self.tso.peek() {
            if let Some(timestamp) = entry.0.timestamp {
                if timestamp <= current_time {
                    return self.tso.pop().map(|Reverse(entry)| entry.0);
                }
            }
        }
        self.ro.pop_front()
    }

    /// Append a locally produced receive-ordered notice; cannot fail, no
    /// time gate applies.
    pub fn enqueue_local(&mut self, event: PendingEvent) {
        self.ro.push_back(event);
    }

    /// Append a grant notice behind the TSO events the grant just released.
    /// The notice then delivers ahead of gated boundary events and RO
    /// traffic, so a boundary-tolerant grant is observed before any event at
    /// exactly the grant time.
    pub fn enqueue_released(&mut self, event: PendingEvent) {
        self.released.push_back(event);
    }

    pub fn is_empty(&self) -> bool {
        self.ro.is_empty() && self.tso.is_empty() && self.released.is_empty()
    }

    /// Drop everything undelivered; used at resign.
    pub fn discard_all(&mut self) {
        self.ro.clear();
        self.tso.clear();
        self.released.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
