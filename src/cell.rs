//! Cell definitions.
//!
//! A cell is the unit of behaviour in a circuit. Its behaviour is a closed
//! variant: either an explicit automaton ([`Behavior::Transitional`]) or a host
//! function ([`Behavior::Functional`]). Ports are named and ordered; a
//! [`PortRef`](crate::types::PortRef) addresses them by position.

use serde::{Deserialize, Serialize};

use crate::automaton::Automaton;
use crate::functional::FunctionalCell;
use crate::types::{Direction, SimTime};

/// The behaviour of a cell.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Finite-state cell with a statically checked transition table.
    Transitional(Automaton),
    /// Host computation.
    Functional(FunctionalCell),
}

/// A cell instance placed in a circuit.
#[derive(Clone, Debug)]
pub struct Cell {
    name: String,
    kind: String,
    behavior: Behavior,
}

/// A named port, as listed by [`Cell::ports`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    pub index: usize,
}

impl Cell {
    /// Creates a transitional cell. The kind defaults to the automaton name.
    pub fn transitional(name: impl Into<String>, automaton: Automaton) -> Self {
        Self {
            name: name.into(),
            kind: automaton.name().to_string(),
            behavior: Behavior::Transitional(automaton),
        }
    }

    /// Creates a functional cell. The kind defaults to the function's name.
    pub fn functional(name: impl Into<String>, cell: FunctionalCell) -> Self {
        Self {
            name: name.into(),
            kind: cell.name().to_string(),
            behavior: Behavior::Functional(cell),
        }
    }

    /// A pulse source: no inputs, one output `q`.
    ///
    /// The source never computes anything; its pulses come from the schedule
    /// recorded with [`Circuit::mark_source`](crate::circuit::Circuit::mark_source).
    pub fn source(name: impl Into<String>) -> Self {
        let f = FunctionalCell::new("SOURCE", Vec::<String>::new(), ["q"], |_| Vec::new());
        Self::functional(name, f)
    }

    /// An observation sink: one input `a`, no outputs.
    pub fn sink(name: impl Into<String>) -> Self {
        let f = FunctionalCell::new("SINK", ["a"], Vec::<String>::new(), |_| Vec::new());
        Self::functional(name, f)
    }

    /// Overrides the kind label (used by the cell library).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// The automaton of a transitional cell.
    pub fn automaton(&self) -> Option<&Automaton> {
        match &self.behavior {
            Behavior::Transitional(a) => Some(a),
            Behavior::Functional(_) => None,
        }
    }

    pub fn inputs(&self) -> &[String] {
        match &self.behavior {
            Behavior::Transitional(a) => a.inputs(),
            Behavior::Functional(f) => f.inputs(),
        }
    }

    pub fn outputs(&self) -> &[String] {
        match &self.behavior {
            Behavior::Transitional(a) => a.outputs(),
            Behavior::Functional(f) => f.outputs(),
        }
    }

    pub fn input_index(&self, port: &str) -> Option<usize> {
        self.inputs().iter().position(|p| p == port)
    }

    pub fn output_index(&self, port: &str) -> Option<usize> {
        self.outputs().iter().position(|p| p == port)
    }

    /// Name of the port at `index` in the given direction.
    pub fn port_name(&self, direction: Direction, index: usize) -> Option<&str> {
        let ports = match direction {
            Direction::Input => self.inputs(),
            Direction::Output => self.outputs(),
        };
        ports.get(index).map(String::as_str)
    }

    /// All ports, inputs first.
    pub fn ports(&self) -> Vec<Port> {
        let inputs = self.inputs().iter().enumerate().map(|(index, name)| Port {
            name: name.clone(),
            direction: Direction::Input,
            index,
        });
        let outputs = self.outputs().iter().enumerate().map(|(index, name)| Port {
            name: name.clone(),
            direction: Direction::Output,
            index,
        });
        inputs.chain(outputs).collect()
    }

    /// True for cells shaped like a source (no inputs, one output).
    pub fn is_source_shaped(&self) -> bool {
        self.inputs().is_empty() && self.outputs().len() == 1
    }

    /// True for cells shaped like a sink (one input, no outputs).
    pub fn is_sink_shaped(&self) -> bool {
        self.inputs().len() == 1 && self.outputs().is_empty()
    }

    /// Smallest delay with which each output can fire; `None` if it never fires.
    ///
    /// Functional cells report their declared minimum delay for every output.
    pub fn min_output_delays(&self) -> Vec<Option<SimTime>> {
        match &self.behavior {
            Behavior::Transitional(a) => a.min_output_delays(),
            Behavior::Functional(f) => vec![Some(f.min_delay()); f.outputs().len()],
        }
    }
}
