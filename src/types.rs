//! Core type definitions for the simulation framework.
//!
//! This module defines the identities shared by the circuit graph, the
//! simulator and the trace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation time unit.
///
/// Time is an abstract integer unit so that event ordering is a strict total
/// order and traces are bit-identical across runs. The built-in cell library
/// expresses its timings in tenths of a picosecond.
pub type SimTime = u64;

/// Unique identifier for a cell in a circuit.
///
/// Cells live in an arena owned by the [`Circuit`](crate::circuit::Circuit);
/// the identifier is the arena index and stays stable for the circuit's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub usize);

impl CellId {
    /// Returns the raw arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Unique identifier for a wire in a circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireId(pub usize);

impl WireId {
    /// Returns the raw arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire#{}", self.0)
    }
}

/// Direction of a cell port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Consumes pulses.
    Input,
    /// Produces pulses.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Addresses one port of one cell.
///
/// A `PortRef` is what a wire connects to. It is obtained by name through
/// [`Circuit::input`](crate::circuit::Circuit::input) or
/// [`Circuit::output`](crate::circuit::Circuit::output), so the index is
/// always valid for the cell it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// The owning cell
    pub cell: CellId,
    /// Whether this is an input or an output of the cell
    pub direction: Direction,
    /// Position of the port in the cell's input or output list
    pub index: usize,
}

impl PortRef {
    /// Creates a reference to an input port.
    pub fn input(cell: CellId, index: usize) -> Self {
        Self {
            cell,
            direction: Direction::Input,
            index,
        }
    }

    /// Creates a reference to an output port.
    pub fn output(cell: CellId, index: usize) -> Self {
        Self {
            cell,
            direction: Direction::Output,
            index,
        }
    }

    /// Returns true if this references an input port.
    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    /// Returns true if this references an output port.
    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.cell, self.direction, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(CellId(3).to_string(), "cell#3");
        assert_eq!(WireId(7).to_string(), "wire#7");
        assert_eq!(PortRef::output(CellId(1), 0).to_string(), "cell#1.output[0]");
    }

    #[test]
    fn test_port_ref_direction() {
        let p = PortRef::input(CellId(2), 1);
        assert!(p.is_input());
        assert!(!p.is_output());
        assert_eq!(p.index, 1);
    }

    #[test]
    fn test_ids_order_by_index() {
        assert!(CellId(1) < CellId(2));
        assert!(WireId(0) < WireId(10));
    }

    #[test]
    fn test_id_serialization() {
        let json = serde_json::to_string(&CellId(42)).unwrap();
        assert_eq!(json, "42");
        let back: WireId = serde_json::from_str("5").unwrap();
        assert_eq!(back, WireId(5));
    }
}
