//! Functional cells: host computations bridged into the pulse network.
//!
//! A functional cell has a fixed port arity and a pure function that maps the
//! arrivals seen since its previous invocation to a list of emissions. The
//! function never touches the circuit; the simulator turns emissions into
//! events and enforces causality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{SimError, SimResult};
use crate::types::{CellId, SimTime};

/// One pulse seen by a functional cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    /// Index of the input port
    pub port: usize,
    /// Arrival time
    pub time: SimTime,
}

/// When an emitted pulse leaves the cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitAt {
    /// Relative to the invocation time.
    After(SimTime),
    /// At an absolute simulation time.
    At(SimTime),
}

/// An output pulse requested by a functional cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    pub port: usize,
    pub at: EmitAt,
}

impl Emission {
    pub fn after(port: usize, delay: SimTime) -> Self {
        Self {
            port,
            at: EmitAt::After(delay),
        }
    }

    pub fn at(port: usize, time: SimTime) -> Self {
        Self {
            port,
            at: EmitAt::At(time),
        }
    }
}

/// Arguments of one functional-cell invocation.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    /// Current simulation time
    pub now: SimTime,
    /// Arrivals since the previous invocation, in delivery order
    pub new: &'a [Arrival],
    /// Every arrival seen by this cell during the run, `new` included
    pub history: &'a [Arrival],
}

/// The host function of a functional cell.
pub type CellFn = Arc<dyn Fn(&Invocation<'_>) -> Vec<Emission> + Send + Sync>;

/// A cell whose behaviour is a host function.
#[derive(Clone)]
pub struct FunctionalCell {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    min_delay: SimTime,
    coalesced: bool,
    f: CellFn,
}

impl FunctionalCell {
    /// Creates a cell invoked once per input pulse.
    pub fn new<I, O, S, T, F>(name: impl Into<String>, inputs: I, outputs: O, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
        F: Fn(&Invocation<'_>) -> Vec<Emission> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            min_delay: 0,
            coalesced: false,
            f: Arc::new(f),
        }
    }

    /// Declares a lower bound on relative emissions.
    ///
    /// A positive bound lets the cell sit on a feedback loop.
    pub fn with_min_delay(mut self, delay: SimTime) -> Self {
        self.min_delay = delay;
        self
    }

    /// Invokes the function once per instant with every arrival of that instant.
    pub fn coalesced(mut self) -> Self {
        self.coalesced = true;
        self
    }

    /// Wraps a truth-level function.
    ///
    /// At each instant with arrivals, `f` receives one level per input (high
    /// when a pulse arrived on it at that instant) and the current time; every
    /// output whose returned level is high fires after `delay`.
    pub fn from_levels<I, O, S, T, F>(
        name: impl Into<String>,
        inputs: I,
        outputs: O,
        delay: SimTime,
        f: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
        F: Fn(&[bool], SimTime) -> Vec<bool> + Send + Sync + 'static,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        let width = inputs.len();
        Self::new(name, inputs, outputs, move |inv: &Invocation<'_>| {
            let mut levels = vec![false; width];
            for a in inv.new {
                if let Some(level) = levels.get_mut(a.port) {
                    *level = true;
                }
            }
            f(&levels, inv.now)
                .into_iter()
                .enumerate()
                .filter(|(_, high)| *high)
                .map(|(port, _)| Emission::after(port, delay))
                .collect()
        })
        .with_min_delay(delay)
        .coalesced()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn min_delay(&self) -> SimTime {
        self.min_delay
    }

    pub fn is_coalesced(&self) -> bool {
        self.coalesced
    }

    /// Runs the host function.
    pub fn invoke(&self, invocation: &Invocation<'_>) -> Vec<Emission> {
        (self.f)(invocation)
    }

    /// Resolves an emission to `(output index, absolute time)`.
    ///
    /// Any emission earlier than `now` plus the declared minimum delay is a
    /// causality error, whether it was given as a delay or an absolute time.
    pub fn resolve(&self, cell: CellId, emission: Emission, now: SimTime) -> SimResult<(usize, SimTime)> {
        let port = self.outputs.get(emission.port).ok_or_else(|| {
            SimError::config(
                format!("functional cell '{}'", self.name),
                format!("emission on output {} but the cell has {} outputs", emission.port, self.outputs.len()),
            )
        })?;
        let earliest = now.saturating_add(self.min_delay);
        let time = match emission.at {
            EmitAt::After(d) => now.saturating_add(d),
            EmitAt::At(t) => t,
        };
        if time < earliest {
            return Err(SimError::Causality {
                cell,
                port: port.clone(),
                requested: time,
                now: earliest,
            });
        }
        Ok((emission.port, time))
    }
}

impl fmt::Debug for FunctionalCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalCell")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("min_delay", &self.min_delay)
            .field("coalesced", &self.coalesced)
            .finish()
    }
}
