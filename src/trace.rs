//! Simulation traces.
//!
//! A [`Trace`] is the only artifact a run hands back: per-wire ordered pulse
//! timelines, per-cell diagnostics, optional state histories, the run outcome
//! and statistics. Its serialized form is identical across repeated runs of
//! the same circuit and schedule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CellFault, SimError};
use crate::stats::RunStats;
use crate::types::{CellId, SimTime, WireId};

/// The recorded timeline of one wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTrace {
    pub wire: WireId,
    pub name: String,
    /// Pulse times in non-decreasing order
    pub arrivals: Vec<SimTime>,
}

/// A per-cell fault recorded during the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub cell: CellId,
    pub cell_name: String,
    pub time: SimTime,
    pub fault: CellFault,
}

/// One transition taken by a transitional cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub time: SimTime,
    pub from: String,
    pub to: String,
    pub transition: String,
}

/// State history of one transitional cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistory {
    pub initial: String,
    pub changes: Vec<StateChange>,
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The horizon was reached, or the queue ran dry (`quiescent`).
    Completed { quiescent: bool },
    /// A run-fatal error stopped the loop; the trace holds what happened before.
    Aborted { error: SimError },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn is_quiescent(&self) -> bool {
        matches!(self, RunOutcome::Completed { quiescent: true })
    }
}

/// The result of one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// One entry per circuit wire, indexed by wire id
    pub wires: Vec<WireTrace>,
    pub diagnostics: BTreeMap<CellId, Vec<Diagnostic>>,
    pub states: BTreeMap<CellId, StateHistory>,
    pub outcome: RunOutcome,
    pub stats: RunStats,
}

impl Trace {
    /// Arrival times on a wire; empty for unknown wires.
    pub fn arrivals(&self, wire: WireId) -> &[SimTime] {
        self.wires
            .get(wire.index())
            .map(|w| w.arrivals.as_slice())
            .unwrap_or(&[])
    }

    /// Arrival times on the wire with the given name.
    pub fn arrivals_by_name(&self, name: &str) -> Option<&[SimTime]> {
        self.wires
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.arrivals.as_slice())
    }

    /// All timelines keyed by wire name.
    pub fn named_arrivals(&self) -> BTreeMap<String, Vec<SimTime>> {
        self.wires
            .iter()
            .map(|w| (w.name.clone(), w.arrivals.clone()))
            .collect()
    }

    /// Diagnostics raised by one cell.
    pub fn diagnostics_for(&self, cell: CellId) -> &[Diagnostic] {
        self.diagnostics.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All diagnostics ordered by cell.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.values().flatten()
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// True when the cell faulted and stopped responding.
    pub fn is_inert(&self, cell: CellId) -> bool {
        self.diagnostics.contains_key(&cell)
    }

    /// Transitions taken by a cell (empty when state recording is off).
    pub fn state_changes(&self, cell: CellId) -> &[StateChange] {
        self.states
            .get(&cell)
            .map(|h| h.changes.as_slice())
            .unwrap_or(&[])
    }

    /// Visited states of a cell, starting with its initial state.
    pub fn state_sequence(&self, cell: CellId) -> Vec<&str> {
        match self.states.get(&cell) {
            Some(h) => std::iter::once(h.initial.as_str())
                .chain(h.changes.iter().map(|c| c.to.as_str()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Total number of recorded pulses.
    pub fn pulse_count(&self) -> usize {
        self.wires.iter().map(|w| w.arrivals.len()).sum()
    }

    /// Serializes the trace to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
