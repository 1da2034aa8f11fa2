//! The circuit graph: cells, wires, sources and sinks.
//!
//! Cells and wires live in arenas owned by the [`Circuit`]; they are addressed
//! by [`CellId`] and [`WireId`], so feedback loops are plain data. Each driven
//! output port owns exactly one wire, and each input port is driven by at most
//! one wire. The circuit is validated before every run.
//!
//! # Example
//!
//! ```
//! use pulsim::cell::Cell;
//! use pulsim::circuit::Circuit;
//! use pulsim::registry::{create_default_library, CellParams};
//!
//! let library = create_default_library();
//! let mut circuit = Circuit::new();
//!
//! let src = circuit.add_source("in", vec![0, 100]).unwrap();
//! let jtl = library.instantiate(&mut circuit, "JTL", "j0", &CellParams::new()).unwrap();
//! let out = circuit.add_sink("out").unwrap();
//!
//! circuit.connect(circuit.output(src, "q").unwrap(), circuit.input(jtl, "a").unwrap()).unwrap();
//! circuit.connect(circuit.output(jtl, "q").unwrap(), circuit.input(out, "a").unwrap()).unwrap();
//!
//! assert!(circuit.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::automaton::AutomatonDesc;
use crate::cell::Cell;
use crate::error::{SimError, SimResult};
use crate::types::{CellId, Direction, PortRef, SimTime, WireId};

/// A routing identity from one output port to an ordered list of input ports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    name: String,
    source: PortRef,
    fanout: Vec<PortRef>,
}

impl Wire {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The producing port.
    pub fn source(&self) -> PortRef {
        self.source
    }

    /// Destination ports in connection order.
    pub fn fanout(&self) -> &[PortRef] {
        &self.fanout
    }
}

/// Pulse times for source cells, overriding the schedules stored in a circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchedule {
    entries: Vec<(CellId, Vec<SimTime>)>,
}

impl SourceSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the pulse times of one source. Times are sorted.
    pub fn with(mut self, cell: CellId, mut times: Vec<SimTime>) -> Self {
        times.sort_unstable();
        match self.entries.iter_mut().find(|(c, _)| *c == cell) {
            Some((_, existing)) => *existing = times,
            None => self.entries.push((cell, times)),
        }
        self
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[(CellId, Vec<SimTime>)] {
        &self.entries
    }

    pub fn times(&self, cell: CellId) -> Option<&[SimTime]> {
        self.entries
            .iter()
            .find(|(c, _)| *c == cell)
            .map(|(_, t)| t.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The connectivity graph of cells and wires.
#[derive(Clone, Debug, Default)]
pub struct Circuit {
    cells: Vec<Cell>,
    wires: Vec<Wire>,
    cell_names: HashMap<String, CellId>,
    wire_names: HashMap<String, WireId>,
    driven_by: HashMap<PortRef, WireId>,
    output_wires: HashMap<PortRef, WireId>,
    sources: SourceSchedule,
    sinks: Vec<CellId>,
}

impl Circuit {
    /// Creates an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cell. Cell names are unique within a circuit.
    pub fn add_cell(&mut self, cell: Cell) -> SimResult<CellId> {
        if cell.name().is_empty() {
            return Err(SimError::config("circuit", "cell name must not be empty"));
        }
        if self.cell_names.contains_key(cell.name()) {
            return Err(SimError::config(
                "circuit",
                format!("duplicate cell name '{}'", cell.name()),
            ));
        }
        let id = CellId(self.cells.len());
        self.cell_names.insert(cell.name().to_string(), id);
        self.cells.push(cell);
        Ok(id)
    }

    /// Returns `"{prefix}_{n}"` for the smallest `n` not used as a cell name.
    pub fn unique_name(&self, prefix: &str) -> String {
        (self.cells.len()..)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|name| !self.cell_names.contains_key(name))
            .unwrap_or_else(|| prefix.to_string())
    }

    pub fn cell(&self, id: CellId) -> SimResult<&Cell> {
        self.cells
            .get(id.index())
            .ok_or_else(|| SimError::UnknownCell(id.to_string()))
    }

    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cell_names.get(name).copied()
    }

    /// Cells with their ids, in registration order.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate().map(|(i, c)| (CellId(i), c))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn wire(&self, id: WireId) -> SimResult<&Wire> {
        self.wires
            .get(id.index())
            .ok_or_else(|| SimError::config("circuit", format!("unknown wire {}", id)))
    }

    pub fn wire_by_name(&self, name: &str) -> Option<WireId> {
        self.wire_names.get(name).copied()
    }

    /// Wires with their ids, in creation order.
    pub fn wires(&self) -> impl Iterator<Item = (WireId, &Wire)> {
        self.wires.iter().enumerate().map(|(i, w)| (WireId(i), w))
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    fn named_port(&self, cell: CellId, port: &str, direction: Direction) -> SimResult<PortRef> {
        let c = self.cell(cell)?;
        let index = match direction {
            Direction::Input => c.input_index(port),
            Direction::Output => c.output_index(port),
        };
        index
            .map(|index| PortRef {
                cell,
                direction,
                index,
            })
            .ok_or_else(|| SimError::UnknownPort {
                cell,
                cell_name: c.name().to_string(),
                port: port.to_string(),
            })
    }

    /// Looks up an input port by name.
    pub fn input(&self, cell: CellId, port: &str) -> SimResult<PortRef> {
        self.named_port(cell, port, Direction::Input)
    }

    /// Looks up an output port by name.
    pub fn output(&self, cell: CellId, port: &str) -> SimResult<PortRef> {
        self.named_port(cell, port, Direction::Output)
    }

    /// Looks up a port by name, inputs first.
    pub fn port(&self, cell: CellId, port: &str) -> SimResult<PortRef> {
        self.input(cell, port).or_else(|_| self.output(cell, port))
    }

    /// Human-readable `cell.port` label.
    pub fn port_label(&self, port: PortRef) -> String {
        match self.cell(port.cell) {
            Ok(c) => format!(
                "{}.{}",
                c.name(),
                c.port_name(port.direction, port.index).unwrap_or("?")
            ),
            Err(_) => port.to_string(),
        }
    }

    fn check_port(&self, port: PortRef, expected: Direction) -> SimResult<()> {
        if port.direction != expected {
            return Err(SimError::PortKind { port, expected });
        }
        let cell = self.cell(port.cell)?;
        if cell.port_name(port.direction, port.index).is_none() {
            return Err(SimError::UnknownPort {
                cell: port.cell,
                cell_name: cell.name().to_string(),
                port: port.to_string(),
            });
        }
        Ok(())
    }

    fn fresh_wire_name(&self) -> String {
        (self.wires.len()..)
            .map(|n| format!("_{}", n))
            .find(|name| !self.wire_names.contains_key(name))
            .unwrap_or_default()
    }

    /// Creates the wire driven by `source`, or returns the existing one.
    ///
    /// When `name` is given the wire is (re)named.
    pub fn add_wire(&mut self, source: PortRef, name: Option<&str>) -> SimResult<WireId> {
        self.check_port(source, Direction::Output)?;
        let id = match self.output_wires.get(&source) {
            Some(&id) => id,
            None => {
                let id = WireId(self.wires.len());
                let generated = self.fresh_wire_name();
                self.wire_names.insert(generated.clone(), id);
                self.wires.push(Wire {
                    name: generated,
                    source,
                    fanout: Vec::new(),
                });
                self.output_wires.insert(source, id);
                id
            }
        };
        if let Some(name) = name {
            self.name_wire(id, name)?;
        }
        Ok(id)
    }

    /// Renames a wire. Wire names are unique within a circuit.
    pub fn name_wire(&mut self, wire: WireId, name: &str) -> SimResult<()> {
        let current = self.wire(wire)?.name.clone();
        if current == name {
            return Ok(());
        }
        if name.is_empty() {
            return Err(SimError::config("circuit", "wire name must not be empty"));
        }
        if let Some(other) = self.wire_names.get(name) {
            return Err(SimError::config(
                "circuit",
                format!("wire name '{}' is already used by {}", name, other),
            ));
        }
        self.wire_names.remove(&current);
        self.wire_names.insert(name.to_string(), wire);
        self.wires[wire.index()].name = name.to_string();
        Ok(())
    }

    /// Labels a wire for the trace.
    pub fn observe(&mut self, wire: WireId, label: &str) -> SimResult<()> {
        self.name_wire(wire, label)
    }

    /// Connects an output port to an input port.
    ///
    /// The first connection from an output creates its wire; later ones append
    /// to its fan-out, in call order.
    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> SimResult<WireId> {
        self.check_port(source, Direction::Output)?;
        self.check_port(dest, Direction::Input)?;
        if let Some(&wire) = self.driven_by.get(&dest) {
            return Err(SimError::PortAlreadyDriven { port: dest, wire });
        }
        let wire = self.add_wire(source, None)?;
        self.wires[wire.index()].fanout.push(dest);
        self.driven_by.insert(dest, wire);
        Ok(wire)
    }

    /// Destination ports of a wire, in connection order.
    pub fn fanout(&self, wire: WireId) -> SimResult<&[PortRef]> {
        Ok(self.wire(wire)?.fanout())
    }

    /// The wire driving an input port.
    pub fn driver(&self, input: PortRef) -> Option<WireId> {
        self.driven_by.get(&input).copied()
    }

    /// The wire driven by an output port.
    pub fn output_wire(&self, output: PortRef) -> Option<WireId> {
        self.output_wires.get(&output).copied()
    }

    /// Designates a source cell and records its pulse times.
    ///
    /// Returns the wire driven by the source, creating it when the source is
    /// not connected yet.
    pub fn mark_source(&mut self, cell: CellId, times: Vec<SimTime>) -> SimResult<WireId> {
        let c = self.cell(cell)?;
        if !c.is_source_shaped() {
            return Err(SimError::config(
                format!("cell '{}'", c.name()),
                "a source must have no inputs and exactly one output",
            ));
        }
        let schedule = std::mem::take(&mut self.sources);
        self.sources = schedule.with(cell, times);
        self.add_wire(PortRef::output(cell, 0), None)
    }

    /// Adds a source cell with the given pulse times.
    pub fn add_source(&mut self, name: &str, times: Vec<SimTime>) -> SimResult<CellId> {
        let id = self.add_cell(Cell::source(name))?;
        self.mark_source(id, times)?;
        Ok(id)
    }

    /// Adds a sink cell. Call [`Circuit::mark_sink`] after wiring to get its wire.
    pub fn add_sink(&mut self, name: &str) -> SimResult<CellId> {
        let id = self.add_cell(Cell::sink(name))?;
        self.sinks.push(id);
        Ok(id)
    }

    /// Designates a sink cell and returns the wire it observes.
    pub fn mark_sink(&mut self, cell: CellId) -> SimResult<WireId> {
        let c = self.cell(cell)?;
        if !c.is_sink_shaped() {
            return Err(SimError::config(
                format!("cell '{}'", c.name()),
                "a sink must have exactly one input and no outputs",
            ));
        }
        let wire = self.driver(PortRef::input(cell, 0)).ok_or_else(|| SimError::Unconnected {
            cell,
            cell_name: c.name().to_string(),
            port: c.inputs()[0].clone(),
        })?;
        if !self.sinks.contains(&cell) {
            self.sinks.push(cell);
        }
        Ok(wire)
    }

    /// Recorded source schedules, in marking order.
    pub fn sources(&self) -> &SourceSchedule {
        &self.sources
    }

    pub fn sinks(&self) -> &[CellId] {
        &self.sinks
    }

    /// Structural descriptions of every transitional cell.
    pub fn describe_cells(&self) -> Vec<(CellId, String, AutomatonDesc)> {
        self.cells()
            .filter_map(|(id, c)| c.automaton().map(|a| (id, c.name().to_string(), a.describe())))
            .collect()
    }

    /// Checks that the circuit can be simulated.
    ///
    /// Every input port must be driven, and no loop of cells may be closed
    /// entirely by zero-delay outputs.
    pub fn validate(&self) -> SimResult<()> {
        for (id, cell) in self.cells() {
            for (index, port) in cell.inputs().iter().enumerate() {
                if self.driver(PortRef::input(id, index)).is_none() {
                    return Err(SimError::Unconnected {
                        cell: id,
                        cell_name: cell.name().to_string(),
                        port: port.clone(),
                    });
                }
            }
        }
        for (cell, _) in self.sources.entries() {
            if !self.cell(*cell)?.is_source_shaped() {
                return Err(SimError::config("circuit", format!("{} is not a valid source", cell)));
            }
        }
        if let Some(cycle) = self.zero_delay_cycle() {
            return Err(SimError::ZeroDelayCycle { cells: cycle });
        }
        tracing::debug!(
            cells = self.cells.len(),
            wires = self.wires.len(),
            "Circuit validated"
        );
        Ok(())
    }

    /// Successor lists of the graph whose edges are zero-delay outputs.
    fn zero_delay_edges(&self) -> Vec<Vec<usize>> {
        let mut succ = vec![Vec::new(); self.cells.len()];
        for wire in &self.wires {
            let src = wire.source;
            let delays = self.cells[src.cell.index()].min_output_delays();
            if delays.get(src.index).copied().flatten() == Some(0) {
                for dst in &wire.fanout {
                    succ[src.cell.index()].push(dst.cell.index());
                }
            }
        }
        succ
    }

    /// Finds a zero-delay loop, returned as a closed path of cells.
    fn zero_delay_cycle(&self) -> Option<Vec<CellId>> {
        let n = self.cells.len();
        let succ = self.zero_delay_edges();

        // Kahn's algorithm; whatever cannot be ordered lies on or behind a cycle
        let mut in_degree = vec![0usize; n];
        let mut pred = vec![Vec::new(); n];
        for (u, targets) in succ.iter().enumerate() {
            for &v in targets {
                in_degree[v] += 1;
                pred[v].push(u);
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut ordered = vec![false; n];
        while let Some(u) = queue.pop_front() {
            ordered[u] = true;
            for &v in &succ[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        let start = (0..n).find(|&i| !ordered[i])?;

        // every unordered cell has an unordered predecessor: walk back until a repeat
        let mut path = vec![start];
        let mut seen = vec![None; n];
        seen[start] = Some(0);
        let mut current = start;
        loop {
            let prev = pred[current].iter().copied().find(|&p| !ordered[p])?;
            if let Some(pos) = seen[prev] {
                let mut cycle: Vec<CellId> = path[pos..].iter().rev().map(|&i| CellId(i)).collect();
                cycle.push(cycle[0]);
                return Some(cycle);
            }
            seen[prev] = Some(path.len());
            path.push(prev);
            current = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{Automaton, TransitionSpec};

    fn buffer(name: &str, delay: SimTime) -> Cell {
        let a = Automaton::builder("BUF")
            .inputs(["a"])
            .outputs(["q"])
            .firing_delay(delay)
            .transition(TransitionSpec::new("idle", "a", "idle").fire("q"))
            .build()
            .unwrap();
        Cell::transitional(name, a)
    }

    fn splitter(name: &str) -> Cell {
        let a = Automaton::builder("SPLIT")
            .inputs(["a"])
            .outputs(["l", "r"])
            .firing_delay(1)
            .transition(TransitionSpec::new("idle", "a", "idle").fire_all(["l", "r"]))
            .build()
            .unwrap();
        Cell::transitional(name, a)
    }

    #[test]
    fn test_connect_creates_one_wire_per_output() {
        let mut c = Circuit::new();
        let src = c.add_source("in", vec![0]).unwrap();
        let b1 = c.add_cell(buffer("b1", 1)).unwrap();
        let b2 = c.add_cell(buffer("b2", 1)).unwrap();

        let q = c.output(src, "q").unwrap();
        let w1 = c.connect(q, c.input(b1, "a").unwrap()).unwrap();
        let w2 = c.connect(q, c.input(b2, "a").unwrap()).unwrap();

        assert_eq!(w1, w2);
        assert_eq!(
            c.fanout(w1).unwrap(),
            &[PortRef::input(b1, 0), PortRef::input(b2, 0)]
        );
        assert_eq!(c.wire(w1).unwrap().source(), q);
    }

    #[test]
    fn test_port_already_driven() {
        let mut c = Circuit::new();
        let s1 = c.add_source("s1", vec![]).unwrap();
        let s2 = c.add_source("s2", vec![]).unwrap();
        let b = c.add_cell(buffer("b", 1)).unwrap();
        let a = c.input(b, "a").unwrap();

        let w = c.connect(c.output(s1, "q").unwrap(), a).unwrap();
        let err = c.connect(c.output(s2, "q").unwrap(), a).unwrap_err();
        assert_eq!(err, SimError::PortAlreadyDriven { port: a, wire: w });
    }

    #[test]
    fn test_port_kind_mismatch() {
        let mut c = Circuit::new();
        let b1 = c.add_cell(buffer("b1", 1)).unwrap();
        let b2 = c.add_cell(buffer("b2", 1)).unwrap();
        let a1 = c.input(b1, "a").unwrap();
        let a2 = c.input(b2, "a").unwrap();

        let err = c.connect(a1, a2).unwrap_err();
        assert_eq!(
            err,
            SimError::PortKind {
                port: a1,
                expected: Direction::Output
            }
        );
    }

    #[test]
    fn test_unknown_port_and_duplicate_cell() {
        let mut c = Circuit::new();
        let b = c.add_cell(buffer("b", 1)).unwrap();
        assert!(matches!(c.input(b, "zz"), Err(SimError::UnknownPort { .. })));
        assert_eq!(c.port(b, "q").unwrap(), PortRef::output(b, 0));
        assert!(c.add_cell(buffer("b", 1)).is_err());
        assert_eq!(c.unique_name("b"), "b_1");
    }

    #[test]
    fn test_validate_unconnected_input() {
        let mut c = Circuit::new();
        let b = c.add_cell(buffer("b", 1)).unwrap();
        let err = c.validate().unwrap_err();
        assert_eq!(
            err,
            SimError::Unconnected {
                cell: b,
                cell_name: "b".into(),
                port: "a".into()
            }
        );
    }

    #[test]
    fn test_zero_delay_cycle_rejected() {
        let mut c = Circuit::new();
        let b1 = c.add_cell(buffer("b1", 0)).unwrap();
        let b2 = c.add_cell(buffer("b2", 0)).unwrap();
        c.connect(c.output(b1, "q").unwrap(), c.input(b2, "a").unwrap()).unwrap();
        c.connect(c.output(b2, "q").unwrap(), c.input(b1, "a").unwrap()).unwrap();

        match c.validate().unwrap_err() {
            SimError::ZeroDelayCycle { cells } => {
                assert_eq!(cells.first(), cells.last());
                assert_eq!(cells.len(), 3);
                assert!(cells.contains(&b1) && cells.contains(&b2));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_positive_delay_cycle_accepted() {
        let mut c = Circuit::new();
        let b1 = c.add_cell(buffer("b1", 0)).unwrap();
        let b2 = c.add_cell(buffer("b2", 2)).unwrap();
        c.connect(c.output(b1, "q").unwrap(), c.input(b2, "a").unwrap()).unwrap();
        c.connect(c.output(b2, "q").unwrap(), c.input(b1, "a").unwrap()).unwrap();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_sources_and_sinks() {
        let mut c = Circuit::new();
        let src = c.add_source("in", vec![12, 0, 5]).unwrap();
        let split = c.add_cell(splitter("s")).unwrap();
        let out = c.add_sink("out").unwrap();

        assert!(matches!(c.mark_sink(out), Err(SimError::Unconnected { .. })));
        assert!(c.mark_source(split, vec![1]).is_err());

        c.connect(c.output(src, "q").unwrap(), c.input(split, "a").unwrap()).unwrap();
        let w = c.connect(c.output(split, "l").unwrap(), c.input(out, "a").unwrap()).unwrap();
        assert_eq!(c.mark_sink(out).unwrap(), w);
        assert_eq!(c.sinks(), &[out]);
        assert_eq!(c.sources().times(src), Some(&[0, 5, 12][..]));
    }

    #[test]
    fn test_wire_naming() {
        let mut c = Circuit::new();
        let s = c.add_source("in", vec![]).unwrap();
        let w = c.output_wire(c.output(s, "q").unwrap()).unwrap();
        assert_eq!(c.wire(w).unwrap().name(), "_0");

        c.observe(w, "clk").unwrap();
        assert_eq!(c.wire_by_name("clk"), Some(w));
        assert_eq!(c.wire_by_name("_0"), None);

        let s2 = c.add_source("in2", vec![]).unwrap();
        let w2 = c.output_wire(c.output(s2, "q").unwrap()).unwrap();
        assert!(c.name_wire(w2, "clk").is_err());
    }

    #[test]
    fn test_describe_cells_skips_functional() {
        let mut c = Circuit::new();
        c.add_source("in", vec![]).unwrap();
        let b = c.add_cell(buffer("b", 3)).unwrap();
        let described = c.describe_cells();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].0, b);
        assert_eq!(described[0].2.name, "BUF");
    }
}
