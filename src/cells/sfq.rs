//! Single-flux-quantum gates.
//!
//! Inputs arriving at the same instant are handled in event-queue order, so
//! every table spells out what happens for each (state, input) pair.

use crate::automaton::{Automaton, TransitionSpec};
use crate::cell::Cell;
use crate::circuit::Circuit;
use crate::error::{SimError, SimResult};
use crate::types::PortRef;

use super::Overrides;

/// Josephson transmission line: repeats every input pulse.
pub fn jtl(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("JTL")
        .inputs(["a"])
        .outputs(["q"])
        .firing_delay(57)
        .transition(TransitionSpec::new("idle", "a", "idle").fire("q"));
    o.finish(builder, 2)
}

/// Splitter: one input pulse becomes one pulse on each of `l` and `r`.
pub fn splitter(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("S")
        .inputs(["a"])
        .outputs(["l", "r"])
        .firing_delay(43)
        .transition(TransitionSpec::new("idle", "a", "idle").fire_all(["l", "r"]));
    o.finish(builder, 3)
}

/// Merger: a pulse on either input produces a pulse on `q`.
pub fn merger(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("M")
        .inputs(["a", "b"])
        .outputs(["q"])
        .firing_delay(40)
        .transition(TransitionSpec::new("idle", "a", "idle").fire("q").settle_default())
        .transition(TransitionSpec::new("idle", "b", "idle").fire("q").settle_default());
    o.finish(builder, 5)
}

/// Coincidence junction: fires once both inputs have arrived.
pub fn coincidence(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("C")
        .inputs(["a", "b"])
        .outputs(["q"])
        .firing_delay(80)
        .transition(TransitionSpec::new("idle", "a", "a_arrived").id("0"))
        .transition(TransitionSpec::new("idle", "b", "b_arrived").id("1"))
        .transition(TransitionSpec::new("a_arrived", "a", "a_arrived").id("2"))
        .transition(TransitionSpec::new("a_arrived", "b", "idle").id("3").fire("q").settle(80))
        .transition(TransitionSpec::new("b_arrived", "b", "b_arrived").id("4"))
        .transition(TransitionSpec::new("b_arrived", "a", "idle").id("5").fire("q").settle(80));
    o.finish(builder, 5)
}

/// Inverted coincidence junction: fires on the first input, resets on the second.
pub fn inverted_coincidence(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("C_INV")
        .inputs(["a", "b"])
        .outputs(["q"])
        .firing_delay(90)
        .transition(TransitionSpec::new("idle", "a", "a_arrived").id("0").fire("q"))
        .transition(TransitionSpec::new("idle", "b", "b_arrived").id("1").fire("q"))
        .transition(TransitionSpec::new("a_arrived", "a", "a_arrived").id("2"))
        .transition(TransitionSpec::new("a_arrived", "b", "idle").id("3").settle(90))
        .transition(TransitionSpec::new("b_arrived", "b", "b_arrived").id("4"))
        .transition(TransitionSpec::new("b_arrived", "a", "idle").id("5").settle(90));
    o.finish(builder, 3)
}

/// Destructive read-out flip-flop: stores `a`, emits it on the next `clk`.
pub fn dro(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("DRO")
        .inputs(["a", "clk"])
        .outputs(["q"])
        .firing_delay(51)
        .transition(TransitionSpec::new("idle", "a", "a_arrived").id("0").settle(23))
        .transition(TransitionSpec::new("idle", "clk", "idle").id("1").settle(51))
        .transition(TransitionSpec::new("a_arrived", "a", "a_arrived").id("2"))
        .transition(TransitionSpec::new("a_arrived", "clk", "idle").id("3").fire("q").settle(51));
    o.finish(builder, 6)
}

/// Toggle flip-flop: emits one pulse for every two input pulses.
pub fn tff(o: &Overrides) -> SimResult<Automaton> {
    let builder = Automaton::builder("TFF")
        .inputs(["a"])
        .outputs(["q"])
        .initial("0")
        .firing_delay(60)
        .transition(TransitionSpec::new("0", "a", "1"))
        .transition(TransitionSpec::new("1", "a", "0").fire("q"));
    o.finish(builder, 4)
}

/// Builds a balanced splitter tree fed by `source`.
///
/// Returns `n` output ports, left to right. One output needs no splitter and
/// returns `source` itself.
pub fn split(circuit: &mut Circuit, source: PortRef, n: usize) -> SimResult<Vec<PortRef>> {
    if n == 0 {
        return Err(SimError::config("split", "cannot split into zero outputs"));
    }
    if n == 1 {
        return Ok(vec![source]);
    }

    let name = circuit.unique_name("s");
    let cell = circuit.add_cell(Cell::transitional(name, splitter(&Overrides::default())?))?;
    circuit.connect(source, circuit.input(cell, "a")?)?;

    let left = n / 2;
    let mut outputs = split(circuit, circuit.output(cell, "l")?, left)?;
    outputs.extend(split(circuit, circuit.output(cell, "r")?, n - left)?);
    Ok(outputs)
}

/// Appends a chain of `n` JTLs to `source` and returns the last output.
pub fn jtl_chain(circuit: &mut Circuit, source: PortRef, n: usize) -> SimResult<PortRef> {
    let mut port = source;
    for _ in 0..n {
        let name = circuit.unique_name("jtl");
        let cell = circuit.add_cell(Cell::transitional(name, jtl(&Overrides::default())?))?;
        circuit.connect(port, circuit.input(cell, "a")?)?;
        port = circuit.output(cell, "q")?;
    }
    Ok(port)
}
