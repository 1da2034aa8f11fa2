//! Error types for circuit construction, validation and simulation.
//!
//! Construction and validation failures are returned as [`SimError`] and abort
//! the operation that raised them. Per-cell run-time failures are not errors
//! of the run: they are recorded as [`CellFault`] diagnostics in the trace and
//! the offending cell goes inert.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CellId, Direction, PortRef, SimTime, WireId};

/// Errors that abort circuit construction, validation or a simulation run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimError {
    /// Malformed cell definition or circuit (ambiguous transitions, bad ports, ...).
    #[error("configuration error in {context}: {message}")]
    Configuration { context: String, message: String },

    /// The destination input is already connected to a wire.
    #[error("{port} is already driven by {wire}")]
    PortAlreadyDriven { port: PortRef, wire: WireId },

    /// A connection was attempted with the wrong port directions.
    #[error("port kind mismatch: expected {expected} port, got {port}")]
    PortKind { port: PortRef, expected: Direction },

    /// A port name does not exist on the given cell.
    #[error("{cell} ('{cell_name}') has no port named '{port}'")]
    UnknownPort {
        cell: CellId,
        cell_name: String,
        port: String,
    },

    /// A cell identity or name is not registered in the circuit.
    #[error("unknown cell '{0}'")]
    UnknownCell(String),

    /// A required input port has no driving wire.
    #[error("{cell} ('{cell_name}') input '{port}' is not connected")]
    Unconnected {
        cell: CellId,
        cell_name: String,
        port: String,
    },

    /// A loop of cells with zero propagation delay cannot be scheduled.
    #[error("zero-delay cycle through cells {}", format_cells(.cells))]
    ZeroDelayCycle { cells: Vec<CellId> },

    /// A netlist references a cell kind the library does not provide.
    #[error("unknown cell kind '{kind}' for cell '{cell}'")]
    UnknownCellKind { kind: String, cell: String },

    /// A cell parameter could not be interpreted.
    #[error("invalid parameter '{key}' = '{value}' for cell '{cell}': {reason}")]
    InvalidParam {
        cell: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A cell tried to schedule an output before the current simulation time.
    #[error("{cell} scheduled output '{port}' at t={requested} before current time t={now}")]
    Causality {
        cell: CellId,
        port: String,
        requested: SimTime,
        now: SimTime,
    },

    /// The configured event budget was exhausted.
    #[error("event limit of {limit} reached at t={time}")]
    EventLimit { limit: u64, time: SimTime },
}

impl SimError {
    /// Shorthand for a [`SimError::Configuration`] error.
    pub fn config(context: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::Configuration {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that abort a run after it started.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, SimError::Causality { .. } | SimError::EventLimit { .. })
    }
}

fn format_cells(cells: &[CellId]) -> String {
    cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// A per-cell fault raised while delivering a pulse.
///
/// Faults are non-fatal to the run. They are attached to the trace as
/// diagnostics, and the faulting cell stops producing output.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellFault {
    /// No transition is declared for the input in the current state.
    #[error("no transition from state '{state}' on input '{port}'")]
    UnhandledInput { state: String, port: String },

    /// The timing guard of the matching transition was violated.
    #[error("guard violated in state '{state}' on input '{port}': {detail}")]
    GuardFailure {
        state: String,
        port: String,
        detail: String,
    },

    /// The cell took a transition declared as erroneous.
    #[error("erroneous transition '{transition}' taken from state '{state}' on input '{port}'")]
    ErrorTransition {
        transition: String,
        state: String,
        port: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_port_already_driven() {
        let e = SimError::PortAlreadyDriven {
            port: PortRef::input(CellId(2), 0),
            wire: WireId(4),
        };
        assert_eq!(e.to_string(), "cell#2.input[0] is already driven by wire#4");
    }

    #[test]
    fn test_error_display_cycle() {
        let e = SimError::ZeroDelayCycle {
            cells: vec![CellId(1), CellId(3), CellId(1)],
        };
        assert_eq!(e.to_string(), "zero-delay cycle through cells cell#1 -> cell#3 -> cell#1");
    }

    #[test]
    fn test_run_fatal_classification() {
        let causality = SimError::Causality {
            cell: CellId(0),
            port: "q".into(),
            requested: 1,
            now: 5,
        };
        assert!(causality.is_run_fatal());
        assert!(!SimError::UnknownCell("x".into()).is_run_fatal());
    }

    #[test]
    fn test_fault_serialization() {
        let fault = CellFault::UnhandledInput {
            state: "idle".into(),
            port: "a".into(),
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "unhandled_input");
        assert_eq!(json["state"], "idle");
    }
}
