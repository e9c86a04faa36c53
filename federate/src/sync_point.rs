use std::collections::{HashMap, HashSet};

use log::trace;

use fedra_shared::{EventKind, FederateHandle, PendingEvent, SyncError, SyncNotice};

use crate::{collaborators::FederationRequest, event_queue::EventQueue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPointState {
    Announced,
    Synchronized,
}

/// One announced federation-wide rendezvous point.
#[derive(Clone, Debug)]
pub struct SyncPointRecord {
    pub announced_to: HashSet<FederateHandle>,
    pub achieved_by: HashSet<FederateHandle>,
    pub state: SyncPointState,
}

/// Tracks announced sync points and which federates have achieved each one.
///
/// The barrier only counts: announcement/achievement causal ordering is the
/// transport's responsibility. The synchronized notice fires exactly once,
/// when the achieved set covers the announced set, after which the record is
/// destroyed.
pub struct SyncPointManager {
    points: HashMap<String, SyncPointRecord>,
}

impl SyncPointManager {
    pub fn new() -> Self {
        Self {
            points: HashMap::new(),
        }
    }

    pub fn record(&self, label: &str) -> Option<&SyncPointRecord> {
        self.points.get(label)
    }

    /// Announce a new point to `targets` (or every joined federate when
    /// unspecified) and notify them through the transport.
    pub fn register(
        &mut self,
        label: &str,
        targets: Option<HashSet<FederateHandle>>,
        all_joined: HashSet<FederateHandle>,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), SyncError> {
        if self.points.contains_key(label) {
            return Err(SyncError::SynchronizationLabelAlreadyAnnounced {
                label: label.to_string(),
            });
        }
        let announced_to = targets.unwrap_or(all_joined);
        let target_list: Vec<FederateHandle> = announced_to.iter().copied().collect();
        outbound.push(FederationRequest::SyncAnnounce {
            label: label.to_string(),
            targets: target_list.clone(),
        });
        self.points.insert(
            label.to_string(),
            SyncPointRecord {
                announced_to,
                achieved_by: HashSet::new(),
                state: SyncPointState::Announced,
            },
        );
        // the registering federate is announced to like everyone else
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Sync(
            SyncNotice::Announced {
                label: label.to_string(),
                targets: target_list,
            },
        )));
        Ok(())
    }

    /// Inbound announcement from a peer's registration.
    pub fn on_announced(
        &mut self,
        label: &str,
        targets: HashSet<FederateHandle>,
        queue: &mut EventQueue,
    ) {
        if self.points.contains_key(label) {
            return;
        }
        let target_list: Vec<FederateHandle> = targets.iter().copied().collect();
        self.points.insert(
            label.to_string(),
            SyncPointRecord {
                announced_to: targets,
                achieved_by: HashSet::new(),
                state: SyncPointState::Announced,
            },
        );
        queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Sync(
            SyncNotice::Announced {
                label: label.to_string(),
                targets: target_list,
            },
        )));
    }

    /// The local federate reached the point.
    pub fn achieved(
        &mut self,
        me: FederateHandle,
        label: &str,
        queue: &mut EventQueue,
        outbound: &mut Vec<FederationRequest>,
    ) -> Result<(), SyncError> {
        let Some(record) = self.points.get_mut(label) else {
            return Err(SyncError::SynchronizationLabelNotAnnounced {
                label: label.to_string(),
            });
        };
        if !record.announced_to.contains(&me) {
            return Err(SyncError::SynchronizationLabelNotAnnounced {
                label: label.to_string(),
            });
        }
        record.achieved_by.insert(me);
        outbound.push(FederationRequest::SyncAchieved {
            label: label.to_string(),
            federate: me,
        });
        self.check_synchronized(label, queue);
        Ok(())
    }

    /// Inbound: a peer reached the point.
    pub fn on_achieved(&mut self, label: &str, federate: FederateHandle, queue: &mut EventQueue) {
        if let Some(record) = self.points.get_mut(label) {
            record.achieved_by.insert(federate);
            self.check_synchronized(label, queue);
        }
    }

    /// A federate left the federation: shrink every announced set and
    /// re-check, so a resign cannot wedge the barrier.
    pub fn remove_federate(&mut self, federate: FederateHandle, queue: &mut EventQueue) {
        let labels: Vec<String> = self.points.keys().cloned().collect();
        for label in labels {
            if let Some(record) = self.points.get_mut(&label) {
                record.announced_to.remove(&federate);
                record.achieved_by.remove(&federate);
            }
            self.check_synchronized(&label, queue);
        }
    }

    fn check_synchronized(&mut self, label: &str, queue: &mut EventQueue) {
        let complete = match self.points.get(label) {
            Some(record) => {
                record.state == SyncPointState::Announced
                    && record.announced_to.is_subset(&record.achieved_by)
            }
            None => false,
        };
        if complete {
            trace!("sync point {:?} synchronized", label);
            self.points.remove(label);
            queue.enqueue_local(PendingEvent::receive_ordered(EventKind::Sync(
                SyncNotice::FederationSynchronized {
                    label: label.to_string(),
                },
            )));
        }
    }
}

impl Default for SyncPointManager {
    fn default() -> Self {
        Self::new()
    }
}
