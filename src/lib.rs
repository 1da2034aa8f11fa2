//! # Pulsim
//!
//! An event-driven simulation core for Pulse-Transfer-Level circuits:
//! superconducting single-flux-quantum logic where information travels as
//! discrete, timestamped pulses rather than voltage levels.
//!
//! ## Design Principles
//!
//! - **Cells are data**: Transitional cells are finite automata declared as
//!   transition tables with guards, firing delays and settle windows. Every
//!   table is checked when it is built.
//! - **Circuits are graphs**: Cells live in an arena; wires connect one output
//!   port to an ordered fan-out of input ports.
//! - **Deterministic time**: Integer timestamps and a `(time, seq)` ordered
//!   queue make every trace bit-identical across runs.
//! - **Faults are data**: A misbehaving cell becomes a diagnostic in the trace
//!   and goes inert; the rest of the circuit keeps simulating.
//! - **Seeded variation**: Optional firing-delay jitter draws from a seeded
//!   stream, so varied runs are as reproducible as nominal ones.
//!
//! ## Features
//!
//! - `parallel` - Run batches of independent simulations on rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use pulsim::registry::{create_default_library, CellParams};
//! use pulsim::{Circuit, Simulator};
//!
//! let library = create_default_library();
//! let mut circuit = Circuit::new();
//!
//! let src = circuit.add_source("in", vec![0, 100, 200, 300]).unwrap();
//! let tff = library.instantiate(&mut circuit, "TFF", "t0", &CellParams::new()).unwrap();
//! let out = circuit.add_sink("out").unwrap();
//! circuit.connect(circuit.output(src, "q").unwrap(), circuit.input(tff, "a").unwrap()).unwrap();
//! circuit.connect(circuit.output(tff, "q").unwrap(), circuit.input(out, "a").unwrap()).unwrap();
//! let observed = circuit.mark_sink(out).unwrap();
//!
//! let trace = Simulator::new(&circuit).run(None).unwrap();
//! // the toggle emits on every second input, 60 units later
//! assert_eq!(trace.arrivals(observed), &[160, 360]);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use pulsim::config::SimConfig;
//!
//! let config = SimConfig::from_yaml_file("circuit.yaml")?;
//! let circuit = config.build_circuit(&pulsim::create_default_library())?;
//! let trace = pulsim::Simulator::new(&circuit)
//!     .with_params(config.simulation.clone())
//!     .run_configured()?;
//! println!("{}", trace.stats.summary());
//! ```

pub mod types;
pub mod error;
pub mod event;
pub mod queue;
pub mod automaton;
pub mod functional;
pub mod cell;
pub mod circuit;
pub mod trace;
pub mod stats;
pub mod simulator;
pub mod variability;
pub mod registry;
pub mod cells;
pub mod netlist;
pub mod config;
pub mod parallel;

// Re-export commonly used types
pub use types::{CellId, Direction, PortRef, SimTime, WireId};
pub use error::{CellFault, SimError, SimResult};
pub use event::{Event, EventTarget};
pub use queue::EventQueue;
pub use automaton::{Automaton, AutomatonDesc, Guard, TransitionKind, TransitionSpec};
pub use functional::{Arrival, Emission, FunctionalCell, Invocation};
pub use cell::{Behavior, Cell};
pub use circuit::{Circuit, SourceSchedule, Wire};
pub use trace::{Diagnostic, RunOutcome, Trace};
pub use stats::{RunStats, Timer};
pub use simulator::{simulate, SimState, Simulator};
pub use variability::{DelayFn, Variability};
pub use registry::{create_default_library, CellLibrary, CellParams};
pub use netlist::Netlist;
pub use config::{ConfigError, SimConfig, SimConfigBuilder, SimulationParams};
pub use parallel::run_batch;

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// pulsim::init_logging("debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
