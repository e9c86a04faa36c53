use std::{cmp::Ordering, collections::HashMap, fmt, ops::Add};

use thiserror::Error;

use crate::types::FederateHandle;

/// Errors that can occur constructing or combining logical time values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogicalTimeError {
    /// Supplied value was NaN or infinite
    #[error("Invalid federation time value {value}. Logical time must be a finite number")]
    InvalidTime { value: f64 },

    /// Supplied lookahead interval was negative or non-finite
    #[error("Invalid lookahead interval {value}. Lookahead must be finite and >= 0")]
    InvalidInterval { value: f64 },
}

/// A point on the federation's logical time axis.
///
/// Wraps a finite `f64`; construction rejects NaN and infinities so that
/// comparisons are total and strict (`<`, `<=`), with no epsilon tolerance.
/// "No time supplied" is modeled as `Option::<LogicalTime>::None`, never as
/// time zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogicalTime(f64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0.0);

    pub fn new(value: f64) -> Result<Self, LogicalTimeError> {
        if !value.is_finite() {
            return Err(LogicalTimeError::InvalidTime { value });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Eq for LogicalTime {}

impl PartialOrd for LogicalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        // Construction guarantees finite values, so partial_cmp cannot fail
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<LogicalTimeInterval> for LogicalTime {
    type Output = LogicalTime;

    fn add(self, rhs: LogicalTimeInterval) -> LogicalTime {
        LogicalTime(self.0 + rhs.0)
    }
}

/// A non-negative span of logical time, used for lookahead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogicalTimeInterval(f64);

impl LogicalTimeInterval {
    pub const ZERO: LogicalTimeInterval = LogicalTimeInterval(0.0);

    pub fn new(value: f64) -> Result<Self, LogicalTimeError> {
        if !value.is_finite() || value < 0.0 {
            return Err(LogicalTimeError::InvalidInterval { value });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Eq for LogicalTimeInterval {}

impl PartialOrd for LogicalTimeInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalTimeInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Read-only snapshot of every regulating federate's time contribution
/// (federate time + lookahead), fed by the transport via
/// `publish_time_contribution`.
///
/// The LBTS (Lower Bound on Timestamp) is the minimum over all
/// contributions; an empty view means no regulating peer can still send,
/// so advances are unbounded.
#[derive(Clone, Debug, Default)]
pub struct FederationTimeView {
    contributions: HashMap<FederateHandle, LogicalTime>,
}

impl FederationTimeView {
    pub fn new() -> Self {
        Self {
            contributions: HashMap::new(),
        }
    }

    pub fn set_contribution(&mut self, federate: FederateHandle, value: LogicalTime) {
        self.contributions.insert(federate, value);
    }

    pub fn clear_contribution(&mut self, federate: FederateHandle) {
        self.contributions.remove(&federate);
    }

    pub fn contribution(&self, federate: FederateHandle) -> Option<LogicalTime> {
        self.contributions.get(&federate).copied()
    }

    /// Minimum contribution across regulating federates, or None when the
    /// view is empty (no bound).
    pub fn lbts(&self) -> Option<LogicalTime> {
        self.contributions.values().min().copied()
    }

    /// True when `time` is at or below the current LBTS, i.e. a constrained
    /// advance to `time` cannot be invalidated by a later arrival.
    pub fn permits(&self, time: LogicalTime) -> bool {
        match self.lbts() {
            Some(lbts) => lbts >= time,
            None => true,
        }
    }
}
