//! Cell factory registry for netlist-driven circuit construction.
//!
//! The library maps a kind name (e.g. `"JTL"`) to a factory that builds a
//! [`Cell`] from an instance name and a parameter set.
//!
//! # Example
//!
//! ```
//! use pulsim::registry::{create_default_library, CellParams};
//!
//! let library = create_default_library();
//! let cell = library.create("DRO", "ff0", &CellParams::new()).unwrap();
//! assert_eq!(cell.kind(), "DRO");
//! assert!(library.create("XORQ", "x0", &CellParams::new()).is_err());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::automaton::Automaton;
use crate::cell::Cell;
use crate::cells::{dual_rail, io, sfq, Overrides};
use crate::circuit::Circuit;
use crate::error::{SimError, SimResult};
use crate::types::CellId;

/// Instance parameters, as written in a netlist.
pub type CellParams = BTreeMap<String, String>;

/// Type alias for cell factory functions.
pub type CellFactory = Arc<dyn Fn(&str, &CellParams) -> SimResult<Cell> + Send + Sync>;

/// A registry of cell factories keyed by kind name.
#[derive(Default, Clone)]
pub struct CellLibrary {
    factories: HashMap<String, CellFactory>,
}

impl CellLibrary {
    /// Creates a new empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &CellParams) -> SimResult<Cell> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Builds a cell of the given kind.
    pub fn create(&self, kind: &str, name: &str, params: &CellParams) -> SimResult<Cell> {
        let factory = self.factories.get(kind).ok_or_else(|| SimError::UnknownCellKind {
            kind: kind.to_string(),
            cell: name.to_string(),
        })?;
        Ok(factory(name, params)?.with_kind(kind))
    }

    /// Builds a cell and adds it to `circuit`.
    pub fn instantiate(
        &self,
        circuit: &mut Circuit,
        kind: &str,
        name: &str,
        params: &CellParams,
    ) -> SimResult<CellId> {
        circuit.add_cell(self.create(kind, name, params)?)
    }

    /// Returns true if a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Returns the number of registered kinds.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Unregisters a kind.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.factories.remove(kind).is_some()
    }
}

impl std::fmt::Debug for CellLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellLibrary")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn no_params(kind: &str, name: &str, params: &CellParams) -> SimResult<()> {
    match params.iter().next() {
        Some((key, value)) => Err(SimError::InvalidParam {
            cell: name.to_string(),
            key: key.clone(),
            value: value.clone(),
            reason: format!("{} cells take no parameters", kind),
        }),
        None => Ok(()),
    }
}

fn transitional(
    library: &mut CellLibrary,
    kind: &str,
    build: fn(&Overrides) -> SimResult<Automaton>,
) {
    library.register(kind, move |name: &str, params: &CellParams| {
        let overrides = Overrides::from_params(name, params)?;
        Ok(Cell::transitional(name, build(&overrides)?))
    });
}

/// Creates a library with the built-in cell kinds.
///
/// Includes:
/// - `JTL`, `S`, `M`, `C`, `C_INV`, `DRO`, `TFF` - single-flux-quantum gates
/// - `TWOBYTWOJOIN` - dual-rail 2x2 join
/// - `SOURCE`, `SINK` - stimulus and observation points
pub fn create_default_library() -> CellLibrary {
    let mut library = CellLibrary::new();

    transitional(&mut library, "JTL", sfq::jtl);
    transitional(&mut library, "S", sfq::splitter);
    transitional(&mut library, "M", sfq::merger);
    transitional(&mut library, "C", sfq::coincidence);
    transitional(&mut library, "C_INV", sfq::inverted_coincidence);
    transitional(&mut library, "DRO", sfq::dro);
    transitional(&mut library, "TFF", sfq::tff);
    transitional(&mut library, "TWOBYTWOJOIN", dual_rail::two_by_two_join);

    library.register("SOURCE", |name: &str, params: &CellParams| {
        no_params("SOURCE", name, params)?;
        Ok(io::source(name))
    });
    library.register("SINK", |name: &str, params: &CellParams| {
        no_params("SINK", name, params)?;
        Ok(io::sink(name))
    });

    library
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basic() {
        let mut library = CellLibrary::new();
        assert!(library.is_empty());

        library.register("SRC", |name: &str, _: &CellParams| Ok(Cell::source(name)));
        assert_eq!(library.len(), 1);
        assert!(library.contains("SRC"));

        let cell = library.create("SRC", "in", &CellParams::new()).unwrap();
        assert_eq!(cell.kind(), "SRC");
        assert_eq!(cell.name(), "in");
    }

    #[test]
    fn test_unknown_kind() {
        let library = create_default_library();
        let err = library.create("XORQ", "x0", &CellParams::new()).unwrap_err();
        assert_eq!(
            err,
            SimError::UnknownCellKind {
                kind: "XORQ".into(),
                cell: "x0".into()
            }
        );
    }

    #[test]
    fn test_default_library() {
        let library = create_default_library();
        assert_eq!(
            library.kinds(),
            vec!["C", "C_INV", "DRO", "JTL", "M", "S", "SINK", "SOURCE", "TFF", "TWOBYTWOJOIN"]
        );
        for kind in library.kinds() {
            assert!(library.create(kind, "x", &CellParams::new()).is_ok(), "{}", kind);
        }
    }

    #[test]
    fn test_params_reach_factory() {
        let library = create_default_library();
        let mut params = CellParams::new();
        params.insert("firing_delay".into(), "10".into());
        params.insert("jjs".into(), "9".into());

        let cell = library.create("JTL", "j", &params).unwrap();
        let desc = cell.automaton().unwrap().describe();
        assert_eq!(desc.transitions[0].firing[0].delay, 10);
        assert_eq!(desc.jjs, Some(9));

        assert!(library.create("SINK", "out", &params).is_err());
    }

    #[test]
    fn test_instantiate_and_unregister() {
        let mut library = create_default_library();
        let mut circuit = Circuit::new();
        let id = library
            .instantiate(&mut circuit, "S", "split0", &CellParams::new())
            .unwrap();
        assert_eq!(circuit.cell(id).unwrap().outputs(), &["l", "r"]);

        assert!(library.unregister("S"));
        assert!(!library.unregister("S"));
        assert!(library.create("S", "split1", &CellParams::new()).is_err());
    }
}
