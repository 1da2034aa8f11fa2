//! Pulse sources, observation sinks and stimulus helpers.

use crate::cell::Cell;
use crate::types::SimTime;

/// A source cell; its pulse times are given when it is marked.
pub fn source(name: &str) -> Cell {
    Cell::source(name)
}

/// A sink cell.
pub fn sink(name: &str) -> Cell {
    Cell::sink(name)
}

/// `n` pulse times starting at `start`, `period` apart.
pub fn periodic(start: SimTime, period: SimTime, n: usize) -> Vec<SimTime> {
    (0..n as u64).map(|i| start + i * period).collect()
}
