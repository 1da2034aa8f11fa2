//! The discrete-event simulator.
//!
//! A run validates the circuit, seeds the event queue from the source
//! schedules and then pops events in `(time, seq)` order until the queue is
//! empty or the horizon is passed. Each event is handled to completion before
//! the next is popped; there is no concurrency inside a run.
//!
//! Per-cell faults are isolated: the cell is recorded in the trace's
//! diagnostics and goes inert while the rest of the circuit keeps running.
//! Causality violations and an exhausted event budget abort the run, but the
//! partial trace is still returned.
//!
//! # Example
//!
//! ```
//! use pulsim::automaton::{Automaton, TransitionSpec};
//! use pulsim::cell::Cell;
//! use pulsim::circuit::Circuit;
//! use pulsim::simulator::Simulator;
//!
//! let toggle = Automaton::builder("TOGGLE")
//!     .inputs(["a"])
//!     .outputs(["q"])
//!     .initial("0")
//!     .firing_delay(3)
//!     .transition(TransitionSpec::new("0", "a", "1").fire("q"))
//!     .transition(TransitionSpec::new("1", "a", "0").fire("q"))
//!     .build()
//!     .unwrap();
//!
//! let mut circuit = Circuit::new();
//! let src = circuit.add_source("in", vec![0, 5, 12]).unwrap();
//! let t = circuit.add_cell(Cell::transitional("t", toggle)).unwrap();
//! let out = circuit.add_sink("out").unwrap();
//! circuit.connect(circuit.output(src, "q").unwrap(), circuit.input(t, "a").unwrap()).unwrap();
//! circuit.connect(circuit.output(t, "q").unwrap(), circuit.input(out, "a").unwrap()).unwrap();
//! let observed = circuit.mark_sink(out).unwrap();
//!
//! let trace = Simulator::new(&circuit).run(None).unwrap();
//! assert_eq!(trace.arrivals(observed), &[3, 8, 15]);
//! assert_eq!(trace.state_sequence(t), vec!["0", "1", "0", "1"]);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::automaton::AutomatonState;
use crate::cell::{Behavior, Cell};
use crate::circuit::{Circuit, SourceSchedule};
use crate::config::SimulationParams;
use crate::error::{CellFault, SimError, SimResult};
use crate::event::EventTarget;
use crate::functional::{Arrival, Invocation};
use crate::queue::EventQueue;
use crate::stats::{RunStats, Timer};
use crate::trace::{Diagnostic, RunOutcome, StateChange, StateHistory, Trace, WireTrace};
use crate::types::{CellId, PortRef, SimTime};
use crate::variability::{DelayFn, DelayModel};

/// Lifecycle of a simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimState {
    /// No run started yet
    Idle,
    /// A run is in progress
    Running,
    /// The last run completed
    Completed,
    /// The last run was aborted by a run-fatal error
    Aborted,
}

/// Runs simulations of a borrowed, read-only circuit.
pub struct Simulator<'c> {
    circuit: &'c Circuit,
    params: SimulationParams,
    delay_fn: Option<DelayFn>,
    state: SimState,
}

impl fmt::Debug for Simulator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("params", &self.params)
            .field("delay_fn", &self.delay_fn.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl<'c> Simulator<'c> {
    /// Creates a simulator with default parameters.
    pub fn new(circuit: &'c Circuit) -> Self {
        Self {
            circuit,
            params: SimulationParams::default(),
            delay_fn: None,
            state: SimState::Idle,
        }
    }

    /// Replaces the run parameters.
    pub fn with_params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    /// Replaces every firing delay with `f(nominal, cell)`.
    ///
    /// Takes precedence over the seeded variability in the parameters. A
    /// positive nominal delay is never reduced below one.
    pub fn with_delay_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(SimTime, &Cell) -> SimTime + Send + Sync + 'static,
    {
        self.delay_fn = Some(Arc::new(f));
        self
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    /// Runs with the source schedules recorded in the circuit.
    pub fn run(&mut self, horizon: Option<SimTime>) -> SimResult<Trace> {
        self.run_with_schedule(&SourceSchedule::new(), horizon)
    }

    /// Runs with the horizon from the parameters.
    pub fn run_configured(&mut self) -> SimResult<Trace> {
        let horizon = self.params.horizon;
        self.run(horizon)
    }

    /// Runs with `schedule` overriding the recorded times of the sources it names.
    ///
    /// Sources keep their recorded order; sources only present in `schedule`
    /// are seeded after them, in schedule order.
    pub fn run_with_schedule(&mut self, schedule: &SourceSchedule, horizon: Option<SimTime>) -> SimResult<Trace> {
        self.circuit.validate()?;
        let seeds = self.merge_schedule(schedule)?;

        self.state = SimState::Running;
        let timer = Timer::start();
        info!(
            cells = self.circuit.cell_count(),
            wires = self.circuit.wire_count(),
            sources = seeds.entries().len(),
            horizon = ?horizon,
            "Starting simulation"
        );

        let delays = DelayModel::new(self.params.variability.as_ref(), self.delay_fn.as_ref());
        if !delays.is_nominal() {
            debug!(
                custom = self.delay_fn.is_some(),
                variability = ?self.params.variability,
                "Firing delays are perturbed"
            );
        }
        let mut run = Run::new(self.circuit, &self.params, delays);
        let outcome = match run.seed(&seeds).and_then(|_| run.event_loop(horizon)) {
            Ok(quiescent) => RunOutcome::Completed { quiescent },
            Err(error) => {
                warn!(%error, time = run.now, "Simulation aborted");
                RunOutcome::Aborted { error }
            }
        };

        self.state = match outcome {
            RunOutcome::Completed { .. } => SimState::Completed,
            RunOutcome::Aborted { .. } => SimState::Aborted,
        };
        let trace = run.finish(outcome, timer.elapsed_ms());
        info!(
            events = trace.stats.events_processed,
            pulses = trace.stats.pulses_recorded,
            diagnostics = trace.stats.diagnostics,
            final_time = trace.stats.final_time,
            outcome = ?self.state,
            "Simulation finished"
        );
        Ok(trace)
    }

    fn merge_schedule(&self, overrides: &SourceSchedule) -> SimResult<SourceSchedule> {
        let mut merged = SourceSchedule::new();
        for (cell, times) in self.circuit.sources().entries() {
            let times = overrides.times(*cell).unwrap_or(times);
            merged = merged.with(*cell, times.to_vec());
        }
        for (cell, times) in overrides.entries() {
            if merged.times(*cell).is_some() {
                continue;
            }
            let c = self.circuit.cell(*cell)?;
            if !c.is_source_shaped() {
                return Err(SimError::config(
                    "source schedule",
                    format!("{} ('{}') is not a source", cell, c.name()),
                ));
            }
            merged = merged.with(*cell, times.clone());
        }
        Ok(merged)
    }
}

/// Runs `circuit` once with its recorded source schedules.
pub fn simulate(circuit: &Circuit, horizon: Option<SimTime>) -> SimResult<Trace> {
    Simulator::new(circuit).run(horizon)
}

/// Mutable per-cell state for one run.
enum CellRuntime {
    Transitional(AutomatonState),
    Functional {
        pending: Vec<Arrival>,
        history: Vec<Arrival>,
        evaluation_queued: bool,
    },
}

/// Everything one run owns: the queue, per-cell state and the trace being built.
struct Run<'c> {
    circuit: &'c Circuit,
    max_events: Option<u64>,
    record_states: bool,
    delays: DelayModel,
    queue: EventQueue,
    now: SimTime,
    cells: Vec<CellRuntime>,
    inert: Vec<bool>,
    arrivals: Vec<Vec<SimTime>>,
    diagnostics: BTreeMap<CellId, Vec<Diagnostic>>,
    histories: BTreeMap<CellId, StateHistory>,
    events_processed: u64,
    pulses_recorded: u64,
}

impl<'c> Run<'c> {
    fn new(circuit: &'c Circuit, params: &SimulationParams, delays: DelayModel) -> Self {
        let mut histories = BTreeMap::new();
        let cells = circuit
            .cells()
            .map(|(id, cell)| match cell.behavior() {
                Behavior::Transitional(a) => {
                    if params.record_states {
                        histories.insert(
                            id,
                            StateHistory {
                                initial: a.initial_state().to_string(),
                                changes: Vec::new(),
                            },
                        );
                    }
                    CellRuntime::Transitional(a.start())
                }
                Behavior::Functional(_) => CellRuntime::Functional {
                    pending: Vec::new(),
                    history: Vec::new(),
                    evaluation_queued: false,
                },
            })
            .collect();

        Self {
            circuit,
            max_events: params.max_events,
            record_states: params.record_states,
            delays,
            queue: EventQueue::new(),
            now: 0,
            cells,
            inert: vec![false; circuit.cell_count()],
            arrivals: vec![Vec::new(); circuit.wire_count()],
            diagnostics: BTreeMap::new(),
            histories,
            events_processed: 0,
            pulses_recorded: 0,
        }
    }

    /// Seeds source pulses in schedule order.
    fn seed(&mut self, seeds: &SourceSchedule) -> SimResult<()> {
        for (cell, times) in seeds.entries() {
            debug!(cell = %cell, pulses = times.len(), "Seeding source");
            for &t in times {
                self.emit(PortRef::output(*cell, 0), t)?;
            }
        }
        Ok(())
    }

    /// Schedules one pulse leaving `output` at `time`, one event per destination.
    fn emit(&mut self, output: PortRef, time: SimTime) -> SimResult<()> {
        if time < self.now {
            let port = self
                .circuit
                .cell(output.cell)?
                .port_name(output.direction, output.index)
                .unwrap_or("?")
                .to_string();
            return Err(SimError::Causality {
                cell: output.cell,
                port,
                requested: time,
                now: self.now,
            });
        }

        let Some(wire) = self.circuit.output_wire(output) else {
            trace!(port = %self.circuit.port_label(output), time, "Pulse on unconnected output dropped");
            return Ok(());
        };

        let fanout = self.circuit.fanout(wire)?;
        if fanout.is_empty() {
            self.queue.schedule(time, EventTarget::Observe { wire });
        } else {
            for (i, &port) in fanout.iter().enumerate() {
                self.queue.schedule(
                    time,
                    EventTarget::Deliver {
                        wire,
                        port,
                        record: i == 0,
                    },
                );
            }
        }
        Ok(())
    }

    /// Processes events; returns whether the queue ran dry.
    fn event_loop(&mut self, horizon: Option<SimTime>) -> SimResult<bool> {
        while let Some(next) = self.queue.peek() {
            if horizon.is_some_and(|h| next.time > h) {
                debug!(horizon = ?horizon, pending = self.queue.len(), "Horizon reached");
                return Ok(false);
            }
            if let Some(limit) = self.max_events {
                if self.events_processed >= limit {
                    return Err(SimError::EventLimit { limit, time: self.now });
                }
            }

            let Some(event) = self.queue.pop() else {
                break;
            };
            self.now = event.time;
            self.events_processed += 1;

            if event.target.records() {
                if let Some(wire) = event.target.wire() {
                    self.arrivals[wire.index()].push(self.now);
                    self.pulses_recorded += 1;
                }
            }
            trace!(time = event.time, seq = event.seq, target = ?event.target, "Processing event");

            match event.target {
                EventTarget::Deliver { port, .. } => self.deliver(port)?,
                EventTarget::Observe { .. } => {}
                EventTarget::Evaluate { cell } => self.evaluate(cell)?,
            }
        }
        Ok(true)
    }

    fn deliver(&mut self, port: PortRef) -> SimResult<()> {
        let cell_id = port.cell;
        if self.inert[cell_id.index()] {
            trace!(cell = %cell_id, "Delivery to inert cell ignored");
            return Ok(());
        }
        let circuit = self.circuit;
        let cell = circuit.cell(cell_id)?;
        let now = self.now;

        match (cell.behavior(), &mut self.cells[cell_id.index()]) {
            (Behavior::Transitional(automaton), CellRuntime::Transitional(state)) => {
                match automaton.step(state, port.index, now) {
                    Ok(step) => {
                        if let (true, Some((from, to, id))) = (self.record_states, step.transition) {
                            if let Some(history) = self.histories.get_mut(&cell_id) {
                                history.changes.push(StateChange {
                                    time: now,
                                    from: automaton.state_name(from).to_string(),
                                    to: automaton.state_name(to).to_string(),
                                    transition: id,
                                });
                            }
                        }
                        for (output, delay) in step.firing {
                            let delay = self.delays.apply(delay, cell);
                            self.emit(PortRef::output(cell_id, output), now.saturating_add(delay))?;
                        }
                    }
                    Err(fault) => self.fault(cell_id, fault),
                }
            }
            (
                Behavior::Functional(f),
                CellRuntime::Functional {
                    pending,
                    history,
                    evaluation_queued,
                },
            ) => {
                let arrival = Arrival {
                    port: port.index,
                    time: now,
                };
                pending.push(arrival);
                history.push(arrival);
                if f.is_coalesced() {
                    if !*evaluation_queued {
                        *evaluation_queued = true;
                        self.queue.schedule(now, EventTarget::Evaluate { cell: cell_id });
                    }
                } else {
                    self.evaluate(cell_id)?;
                }
            }
            _ => {
                return Err(SimError::config(
                    format!("cell '{}'", cell.name()),
                    "run-time state does not match cell behaviour",
                ))
            }
        }
        Ok(())
    }

    /// Invokes a functional cell with the arrivals gathered since its last invocation.
    fn evaluate(&mut self, cell_id: CellId) -> SimResult<()> {
        if self.inert[cell_id.index()] {
            return Ok(());
        }
        let circuit = self.circuit;
        let Behavior::Functional(f) = circuit.cell(cell_id)?.behavior() else {
            return Ok(());
        };
        let now = self.now;

        let emissions = match &mut self.cells[cell_id.index()] {
            CellRuntime::Functional {
                pending,
                history,
                evaluation_queued,
            } => {
                *evaluation_queued = false;
                let new = std::mem::take(pending);
                f.invoke(&Invocation {
                    now,
                    new: &new,
                    history,
                })
            }
            CellRuntime::Transitional(_) => return Ok(()),
        };

        for emission in emissions {
            let (output, time) = f.resolve(cell_id, emission, now)?;
            self.emit(PortRef::output(cell_id, output), time)?;
        }
        Ok(())
    }

    fn fault(&mut self, cell: CellId, fault: CellFault) {
        let cell_name = self
            .circuit
            .cell(cell)
            .map(|c| c.name().to_string())
            .unwrap_or_default();
        warn!(cell = %cell, name = %cell_name, time = self.now, %fault, "Cell faulted and is now inert");
        self.inert[cell.index()] = true;
        self.diagnostics.entry(cell).or_default().push(Diagnostic {
            cell,
            cell_name,
            time: self.now,
            fault,
        });
    }

    fn finish(self, outcome: RunOutcome, wall_time_ms: f64) -> Trace {
        let diagnostics = self.diagnostics.values().map(Vec::len).sum();
        let stats = RunStats {
            cells: self.circuit.cell_count(),
            wires: self.circuit.wire_count(),
            events_processed: self.events_processed,
            events_scheduled: self.queue.scheduled(),
            pulses_recorded: self.pulses_recorded,
            peak_queue_len: self.queue.peak_len(),
            final_time: self.now,
            diagnostics,
            wall_time_ms,
        };

        let wires = self
            .circuit
            .wires()
            .zip(self.arrivals)
            .map(|((wire, w), arrivals)| WireTrace {
                wire,
                name: w.name().to_string(),
                arrivals,
            })
            .collect();

        Trace {
            wires,
            diagnostics: self.diagnostics,
            states: self.histories,
            outcome,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{Automaton, TransitionSpec};
    use crate::cell::Cell;
    use crate::functional::{Emission, FunctionalCell};
    use crate::types::WireId;

    fn buffer(delay: SimTime) -> Automaton {
        Automaton::builder("BUF")
            .inputs(["a"])
            .outputs(["q"])
            .firing_delay(delay)
            .transition(TransitionSpec::new("idle", "a", "idle").fire("q"))
            .build()
            .unwrap()
    }

    /// source -> cell -> sink; returns (circuit, cell, sink wire)
    fn chain(cell: Cell, times: Vec<SimTime>) -> (Circuit, CellId, WireId) {
        let mut c = Circuit::new();
        let src = c.add_source("in", times).unwrap();
        let id = c.add_cell(cell).unwrap();
        let out = c.add_sink("out").unwrap();
        let input = c.cell(id).unwrap().inputs()[0].clone();
        let output = c.cell(id).unwrap().outputs()[0].clone();
        c.connect(c.output(src, "q").unwrap(), c.input(id, &input).unwrap()).unwrap();
        c.connect(c.output(id, &output).unwrap(), c.input(out, "a").unwrap()).unwrap();
        let wire = c.mark_sink(out).unwrap();
        (c, id, wire)
    }

    #[test]
    fn test_state_transitions() {
        let (c, _, _) = chain(Cell::transitional("b", buffer(1)), vec![]);
        let mut sim = Simulator::new(&c);
        assert_eq!(sim.state(), SimState::Idle);
        let trace = sim.run(None).unwrap();
        assert_eq!(sim.state(), SimState::Completed);
        assert!(trace.outcome.is_quiescent());
        assert_eq!(trace.stats.events_processed, 0);
    }

    #[test]
    fn test_buffer_delay() {
        let (c, _, out) = chain(Cell::transitional("b", buffer(7)), vec![0, 10]);
        let trace = simulate(&c, None).unwrap();
        assert_eq!(trace.arrivals(out), &[7, 17]);
        assert_eq!(trace.arrivals_by_name("_0"), Some(&[0, 10][..]));
    }

    #[test]
    fn test_horizon_truncates() {
        let (c, _, out) = chain(Cell::transitional("b", buffer(7)), vec![0, 10, 20]);
        let trace = simulate(&c, Some(17)).unwrap();
        assert_eq!(trace.arrivals(out), &[7, 17]);
        assert_eq!(trace.outcome, RunOutcome::Completed { quiescent: false });
    }

    #[test]
    fn test_run_with_schedule_overrides_sources() {
        let (c, _, out) = chain(Cell::transitional("b", buffer(2)), vec![0]);
        let src = c.cell_by_name("in").unwrap();
        let schedule = SourceSchedule::new().with(src, vec![30, 10]);
        let trace = Simulator::new(&c).run_with_schedule(&schedule, None).unwrap();
        assert_eq!(trace.arrivals(out), &[12, 32]);

        let not_a_source = SourceSchedule::new().with(c.cell_by_name("b").unwrap(), vec![1]);
        assert!(Simulator::new(&c).run_with_schedule(&not_a_source, None).is_err());
    }

    #[test]
    fn test_event_limit_aborts_with_partial_trace() {
        let (c, _, _) = chain(Cell::transitional("b", buffer(1)), vec![0, 1, 2, 3]);
        let params = SimulationParams {
            max_events: Some(3),
            ..SimulationParams::default()
        };
        let mut sim = Simulator::new(&c).with_params(params);
        let trace = sim.run(None).unwrap();
        assert_eq!(sim.state(), SimState::Aborted);
        assert!(matches!(
            trace.outcome,
            RunOutcome::Aborted {
                error: SimError::EventLimit { limit: 3, .. }
            }
        ));
        assert_eq!(trace.stats.events_processed, 3);
    }

    #[test]
    fn test_functional_causality_aborts() {
        let back_in_time = FunctionalCell::new("BACK", ["a"], ["q"], |inv: &Invocation<'_>| {
            vec![Emission::at(0, inv.now.saturating_sub(1))]
        });
        let (c, id, _) = chain(Cell::functional("f", back_in_time), vec![5]);
        let trace = simulate(&c, None).unwrap();
        match trace.outcome {
            RunOutcome::Aborted {
                error: SimError::Causality { cell, requested, now, .. },
            } => {
                assert_eq!(cell, id);
                assert_eq!((requested, now), (4, 5));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_fault_makes_cell_inert() {
        let once = Automaton::builder("ONCE")
            .inputs(["a"])
            .outputs(["q"])
            .firing_delay(1)
            .transition(TransitionSpec::new("idle", "a", "done").fire("q"))
            .build()
            .unwrap();
        let (c, id, out) = chain(Cell::transitional("once", once), vec![0, 5, 9]);
        let trace = simulate(&c, None).unwrap();

        assert_eq!(trace.arrivals(out), &[1]);
        assert!(trace.is_inert(id));
        assert_eq!(trace.diagnostics_for(id).len(), 1);
        assert_eq!(trace.diagnostics_for(id)[0].time, 5);
        // deliveries to the inert cell are still recorded on its input wire
        assert_eq!(trace.arrivals(WireId(0)), &[0, 5, 9]);
        assert!(trace.outcome.is_completed());
    }

    #[test]
    fn test_record_states_off() {
        let (c, id, _) = chain(Cell::transitional("b", buffer(1)), vec![0]);
        let params = SimulationParams {
            record_states: false,
            ..SimulationParams::default()
        };
        let trace = Simulator::new(&c).with_params(params).run(None).unwrap();
        assert!(trace.state_sequence(id).is_empty());
    }

    #[test]
    fn test_validation_failure_returns_err() {
        let mut c = Circuit::new();
        c.add_cell(Cell::transitional("b", buffer(1))).unwrap();
        let mut sim = Simulator::new(&c);
        assert!(matches!(sim.run(None), Err(SimError::Unconnected { .. })));
        assert_eq!(sim.state(), SimState::Idle);
    }
}
