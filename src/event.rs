//! Event definitions for the simulation framework.
//!
//! An event is the scheduled delivery of one pulse to one destination. Events
//! are totally ordered by `(time, seq)`, where `seq` is the creation sequence
//! number assigned by the [`EventQueue`](crate::queue::EventQueue).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{CellId, PortRef, SimTime, WireId};

/// What happens when an event is popped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTarget {
    /// Deliver a pulse travelling on `wire` to the input `port`.
    ///
    /// `record` is set on exactly one delivery per pulse (fan-out index 0) so
    /// that the trace holds one arrival per pulse regardless of fan-out.
    Deliver {
        wire: WireId,
        port: PortRef,
        record: bool,
    },

    /// A pulse on a wire without consumers; only recorded in the trace.
    Observe { wire: WireId },

    /// Invoke a coalescing functional cell with the arrivals gathered so far.
    Evaluate { cell: CellId },
}

impl EventTarget {
    /// Returns the wire this event travels on, if any.
    pub fn wire(&self) -> Option<WireId> {
        match self {
            EventTarget::Deliver { wire, .. } | EventTarget::Observe { wire } => Some(*wire),
            EventTarget::Evaluate { .. } => None,
        }
    }

    /// Returns true if popping this event records an arrival in the trace.
    pub fn records(&self) -> bool {
        match self {
            EventTarget::Deliver { record, .. } => *record,
            EventTarget::Observe { .. } => true,
            EventTarget::Evaluate { .. } => false,
        }
    }
}

/// A scheduled occurrence in the simulation.
///
/// Ordering ignores the target: two events compare by time, then by creation
/// sequence, so same-timestamp events are processed first-in first-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// The simulation time at which this event occurs
    pub time: SimTime,
    /// Creation sequence number, unique within a run
    pub seq: u64,
    /// What to do with the event
    pub target: EventTarget,
}

impl Event {
    /// Creates a new event.
    pub fn new(time: SimTime, seq: u64, target: EventTarget) -> Self {
        Self { time, seq, target }
    }

    /// The `(time, seq)` ordering key.
    #[inline]
    pub fn key(&self) -> (SimTime, u64) {
        (self.time, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(record: bool) -> EventTarget {
        EventTarget::Deliver {
            wire: WireId(1),
            port: PortRef::input(CellId(2), 0),
            record,
        }
    }

    #[test]
    fn test_event_ordering_by_time_then_seq() {
        let a = Event::new(10, 5, deliver(true));
        let b = Event::new(10, 6, deliver(false));
        let c = Event::new(9, 7, EventTarget::Observe { wire: WireId(0) });

        assert!(c < a);
        assert!(a < b);
    }

    #[test]
    fn test_target_wire_and_record() {
        assert_eq!(deliver(true).wire(), Some(WireId(1)));
        assert!(deliver(true).records());
        assert!(!deliver(false).records());
        assert!(EventTarget::Observe { wire: WireId(3) }.records());

        let eval = EventTarget::Evaluate { cell: CellId(4) };
        assert_eq!(eval.wire(), None);
        assert!(!eval.records());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(100, 1, deliver(true));
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(event.time, deserialized.time);
        assert_eq!(event.target, deserialized.target);
    }
}
