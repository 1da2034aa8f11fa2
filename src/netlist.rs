//! Netlist import.
//!
//! A netlist is an externally normalized list of cells and connections. It is
//! plain serde data, so it can be read from YAML or JSON, and
//! [`Netlist::build`] turns it into a [`Circuit`] using a [`CellLibrary`].
//!
//! # Format
//!
//! ```yaml
//! cells:
//!   - name: in
//!     kind: SOURCE
//!   - name: j0
//!     kind: JTL
//!     params:
//!       firing_delay: 60
//!   - name: out
//!     kind: SINK
//!
//! connections:
//!   - from: in.q
//!     to: j0.a
//!   - from: j0.q
//!     to: [out.a]
//!     name: result
//!
//! sources:
//!   - cell: in
//!     times: [0, 100, 200]
//!
//! sinks: [out]
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::circuit::Circuit;
use crate::error::{SimError, SimResult};
use crate::registry::{CellLibrary, CellParams};
use crate::types::{CellId, SimTime};

/// One cell instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDecl {
    pub name: String,
    pub kind: String,
    #[serde(default, deserialize_with = "scalar_params")]
    pub params: CellParams,
}

/// One wire: an output endpoint and the inputs it drives, as `"cell.port"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Pulse times of one source cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDecl {
    pub cell: String,
    pub times: Vec<SimTime>,
}

/// A circuit description in netlist form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netlist {
    #[serde(default)]
    pub cells: Vec<CellDecl>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub sources: Vec<SourceDecl>,
    #[serde(default)]
    pub sinks: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

fn scalar_params<'de, D>(deserializer: D) -> Result<CellParams, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.into_string())).collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Splits `"cell.port"` at the last dot.
fn endpoint(text: &str) -> SimResult<(&str, &str)> {
    match text.rsplit_once('.') {
        Some((cell, port)) if !cell.is_empty() && !port.is_empty() => Ok((cell, port)),
        _ => Err(SimError::config(
            "netlist",
            format!("malformed endpoint '{}', expected 'cell.port'", text),
        )),
    }
}

impl Netlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell without parameters.
    pub fn cell(self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.cell_with(name, kind, CellParams::new())
    }

    /// Adds a cell with parameters.
    pub fn cell_with(mut self, name: impl Into<String>, kind: impl Into<String>, params: CellParams) -> Self {
        self.cells.push(CellDecl {
            name: name.into(),
            kind: kind.into(),
            params,
        });
        self
    }

    /// Adds a connection from one output to one or more inputs.
    pub fn connect<I, S>(mut self, from: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connections.push(Connection {
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
            name: None,
        });
        self
    }

    /// Names the wire of the most recently added connection.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let Some(last) = self.connections.last_mut() {
            last.name = Some(name.into());
        }
        self
    }

    pub fn source(mut self, cell: impl Into<String>, times: Vec<SimTime>) -> Self {
        self.sources.push(SourceDecl {
            cell: cell.into(),
            times,
        });
        self
    }

    pub fn sink(mut self, cell: impl Into<String>) -> Self {
        self.sinks.push(cell.into());
        self
    }

    /// Structural checks that need no cell library.
    pub fn validate(&self) -> SimResult<()> {
        let mut names = HashSet::new();
        for decl in &self.cells {
            if !names.insert(decl.name.as_str()) {
                return Err(SimError::config(
                    "netlist",
                    format!("duplicate cell name '{}'", decl.name),
                ));
            }
        }

        let known = |cell: &str| {
            if names.contains(cell) {
                Ok(())
            } else {
                Err(SimError::UnknownCell(cell.to_string()))
            }
        };

        for conn in &self.connections {
            known(endpoint(&conn.from)?.0)?;
            if conn.to.is_empty() {
                return Err(SimError::config(
                    "netlist",
                    format!("connection from '{}' has no destination", conn.from),
                ));
            }
            for to in &conn.to {
                known(endpoint(to)?.0)?;
            }
        }
        for src in &self.sources {
            known(&src.cell)?;
        }
        for sink in &self.sinks {
            known(sink)?;
        }
        Ok(())
    }

    /// Builds a circuit.
    ///
    /// Unknown cell kinds are reported before any cell is created or wired.
    pub fn build(&self, library: &CellLibrary) -> SimResult<Circuit> {
        if let Some(decl) = self.cells.iter().find(|d| !library.contains(&d.kind)) {
            return Err(SimError::UnknownCellKind {
                kind: decl.kind.clone(),
                cell: decl.name.clone(),
            });
        }
        self.validate()?;

        let mut circuit = Circuit::new();
        for decl in &self.cells {
            library.instantiate(&mut circuit, &decl.kind, &decl.name, &decl.params)?;
        }

        let lookup = |circuit: &Circuit, name: &str| -> SimResult<CellId> {
            circuit
                .cell_by_name(name)
                .ok_or_else(|| SimError::UnknownCell(name.to_string()))
        };

        for conn in &self.connections {
            let (cell, port) = endpoint(&conn.from)?;
            let source = circuit.output(lookup(&circuit, cell)?, port)?;
            let wire = circuit.add_wire(source, conn.name.as_deref())?;
            for to in &conn.to {
                let (cell, port) = endpoint(to)?;
                let dest = circuit.input(lookup(&circuit, cell)?, port)?;
                circuit.connect(source, dest)?;
            }
            tracing::trace!(wire = %wire, from = %conn.from, fanout = conn.to.len(), "Wired connection");
        }

        for src in &self.sources {
            let cell = lookup(&circuit, &src.cell)?;
            circuit.mark_source(cell, src.times.clone())?;
        }
        for sink in &self.sinks {
            let cell = lookup(&circuit, sink)?;
            circuit.mark_sink(cell)?;
        }

        tracing::debug!(
            cells = circuit.cell_count(),
            wires = circuit.wire_count(),
            "Netlist imported"
        );
        Ok(circuit)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_library;

    const YAML: &str = r#"
cells:
  - name: in
    kind: SOURCE
  - name: j0
    kind: JTL
    params:
      firing_delay: 60
  - name: out
    kind: SINK
connections:
  - from: in.q
    to: j0.a
  - from: j0.q
    to: [out.a]
    name: result
sources:
  - cell: in
    times: [0, 100]
sinks: [out]
"#;

    #[test]
    fn test_yaml_parsing() {
        let netlist = Netlist::from_yaml(YAML).unwrap();
        assert_eq!(netlist.cells.len(), 3);
        assert_eq!(netlist.cells[1].params["firing_delay"], "60");
        assert_eq!(netlist.connections[0].to, vec!["j0.a"]);
        assert_eq!(netlist.connections[1].name.as_deref(), Some("result"));
    }

    #[test]
    fn test_build_circuit() {
        let circuit = Netlist::from_yaml(YAML)
            .unwrap()
            .build(&create_default_library())
            .unwrap();
        assert_eq!(circuit.cell_count(), 3);
        assert!(circuit.wire_by_name("result").is_some());
        assert_eq!(circuit.sinks().len(), 1);
        assert!(circuit.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_reported_first() {
        let netlist = Netlist::new()
            .cell("x", "XORQ")
            .connect("nowhere.q", ["also.a"]);
        let err = netlist.build(&create_default_library()).unwrap_err();
        assert!(matches!(err, SimError::UnknownCellKind { ref kind, .. } if kind == "XORQ"));
    }

    #[test]
    fn test_structural_errors() {
        let library = create_default_library();

        let dup = Netlist::new().cell("a", "JTL").cell("a", "JTL");
        assert!(matches!(dup.build(&library), Err(SimError::Configuration { .. })));

        let malformed = Netlist::new().cell("a", "JTL").connect("a", ["a.a"]);
        assert!(malformed.validate().unwrap_err().to_string().contains("malformed endpoint"));

        let missing = Netlist::new().cell("a", "JTL").connect("a.q", ["b.a"]);
        assert_eq!(missing.validate().unwrap_err(), SimError::UnknownCell("b".into()));

        let bad_port = Netlist::new().cell("a", "JTL").cell("b", "JTL").connect("a.q", ["b.zz"]);
        assert!(matches!(bad_port.build(&library), Err(SimError::UnknownPort { .. })));
    }

    #[test]
    fn test_json_parsing() {
        let json = serde_json::json!({
            "cells": [
                {"name": "in", "kind": "SOURCE"},
                {"name": "s", "kind": "S", "params": {"jjs": 4}},
                {"name": "l", "kind": "SINK"},
                {"name": "r", "kind": "SINK"}
            ],
            "connections": [
                {"from": "in.q", "to": "s.a"},
                {"from": "s.l", "to": ["l.a"]},
                {"from": "s.r", "to": ["r.a"]}
            ],
            "sources": [{"cell": "in", "times": [10]}],
            "sinks": ["l", "r"]
        });
        let netlist = Netlist::from_json(&json.to_string()).unwrap();
        assert_eq!(netlist.cells[1].params["jjs"], "4");
        let circuit = netlist.build(&create_default_library()).unwrap();
        assert_eq!(circuit.wire_count(), 3);
    }
}
