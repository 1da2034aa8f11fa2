//! Finite-state automata for Transitional cells.
//!
//! A cell's behaviour is data: a set of states, an initial state and a table
//! of transitions keyed by `(state, trigger input)`. The table is declared with
//! [`TransitionSpec`] values, checked once by [`AutomatonBuilder::build`] and
//! compiled into index form. Determinism is a build-time property: two
//! transitions that could both match the same input at the same instant are
//! rejected before any simulation happens.
//!
//! # Example
//!
//! ```
//! use pulsim::automaton::{Automaton, TransitionSpec};
//!
//! // A toggle that fires on every input.
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
//! assert_eq!(toggle.states(), &["0".to_string(), "1".to_string()]);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{CellFault, SimError, SimResult};
use crate::types::SimTime;

/// The event a guard measures elapsed time from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardRef {
    /// The last transition the cell took.
    LastTransition,
    /// The last pulse that arrived on the named input (e.g. a clock or reset).
    LastArrival(String),
    /// The last pulse that arrived on any input.
    LastAnyArrival,
}

/// Where control goes when a guard is violated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardFail {
    /// Raise a guard-failure diagnostic; the cell goes inert.
    Error,
    /// Take the named fallback transition instead.
    Goto(String),
}

/// A timing guard on a transition.
///
/// The guard passes when the elapsed time since `reference` lies within the
/// inclusive window `[min, max]`. A reference event that never happened counts
/// as infinitely long ago: a lower bound passes and an upper bound fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub reference: GuardRef,
    #[serde(default)]
    pub min: Option<SimTime>,
    #[serde(default)]
    pub max: Option<SimTime>,
    #[serde(default = "default_guard_fail")]
    pub on_fail: GuardFail,
}

fn default_guard_fail() -> GuardFail {
    GuardFail::Error
}

impl Guard {
    /// Passes when at least `min` has elapsed since `reference`.
    pub fn min_since(reference: GuardRef, min: SimTime) -> Self {
        Self::window(reference, Some(min), None)
    }

    /// Passes when at most `max` has elapsed since `reference`.
    pub fn max_since(reference: GuardRef, max: SimTime) -> Self {
        Self::window(reference, None, Some(max))
    }

    /// Passes when the elapsed time lies in `[min, max]`.
    pub fn window(reference: GuardRef, min: Option<SimTime>, max: Option<SimTime>) -> Self {
        Self {
            reference,
            min,
            max,
            on_fail: GuardFail::Error,
        }
    }

    /// Routes guard failures to a fallback transition.
    pub fn or_goto(mut self, transition: impl Into<String>) -> Self {
        self.on_fail = GuardFail::Goto(transition.into());
        self
    }

    fn bounds(&self) -> (SimTime, SimTime) {
        (self.min.unwrap_or(0), self.max.unwrap_or(SimTime::MAX))
    }

    /// Two guards are disjoint when no single instant can satisfy both.
    fn disjoint_from(&self, other: &Guard) -> bool {
        if self.reference != other.reference {
            return false;
        }
        let (lo_a, hi_a) = self.bounds();
        let (lo_b, hi_b) = other.bounds();
        hi_a < lo_b || hi_b < lo_a
    }
}

/// How a transition behaves when taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Update the state and fire the declared outputs.
    #[default]
    Normal,
    /// Consume the input without any effect.
    Ignore,
    /// Taking this transition is a modeling error; the cell goes inert.
    Error,
    /// Only reachable as the failure target of a guard.
    Fallback,
}

/// What a cell does with inputs that match no transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Raise an unhandled-input diagnostic.
    #[default]
    Strict,
    /// Consume the input and stay in the current state.
    Ignore,
}

/// Declarative description of one transition, as written by a cell author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub triggers: Vec<String>,
    pub next: String,
    #[serde(default)]
    pub firing: Vec<String>,
    #[serde(default)]
    pub delay: Option<SimTime>,
    #[serde(default)]
    pub delay_overrides: Vec<(String, SimTime)>,
    #[serde(default)]
    pub guard: Option<Guard>,
    #[serde(default)]
    pub settle_time: Option<SimTime>,
    #[serde(default)]
    pub settle_default: bool,
    #[serde(default)]
    pub settle_ignore: Vec<String>,
    #[serde(default)]
    pub kind: TransitionKind,
}

impl TransitionSpec {
    /// A transition from `source` to `next` on `trigger`.
    pub fn new(source: impl Into<String>, trigger: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            triggers: vec![trigger.into()],
            next: next.into(),
            firing: Vec::new(),
            delay: None,
            delay_overrides: Vec::new(),
            guard: None,
            settle_time: None,
            settle_default: false,
            settle_ignore: Vec::new(),
            kind: TransitionKind::Normal,
        }
    }

    /// A self-loop that consumes `trigger` in `state` without effect.
    pub fn ignore(state: impl Into<String>, trigger: impl Into<String>) -> Self {
        let state = state.into();
        let mut spec = Self::new(state.clone(), trigger, state);
        spec.kind = TransitionKind::Ignore;
        spec
    }

    /// Sets an explicit transition id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds another trigger; each trigger expands into its own table entry.
    pub fn or_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Fires an output when taken.
    pub fn fire(mut self, output: impl Into<String>) -> Self {
        self.firing.push(output.into());
        self
    }

    /// Fires every listed output when taken, in order.
    pub fn fire_all<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.firing.extend(outputs.into_iter().map(Into::into));
        self
    }

    /// Sets the propagation delay of every fired output.
    pub fn delay(mut self, delay: SimTime) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Overrides the propagation delay of one fired output.
    pub fn delay_for(mut self, output: impl Into<String>, delay: SimTime) -> Self {
        self.delay_overrides.push((output.into(), delay));
        self
    }

    /// Attaches a timing guard.
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Inputs arriving less than `time` after this transition are violations.
    pub fn settle(mut self, time: SimTime) -> Self {
        self.settle_time = Some(time);
        self
    }

    /// Uses the cell-wide default settle time.
    pub fn settle_default(mut self) -> Self {
        self.settle_default = true;
        self
    }

    /// Inputs on `port` during the settle window are absorbed instead of failing.
    pub fn settle_ignore(mut self, port: impl Into<String>) -> Self {
        self.settle_ignore.push(port.into());
        self
    }

    /// Marks the transition erroneous.
    pub fn error(mut self) -> Self {
        self.kind = TransitionKind::Error;
        self
    }

    /// Marks the transition as a guard-failure target only.
    pub fn fallback(mut self) -> Self {
        self.kind = TransitionKind::Fallback;
        self
    }
}

/// Compiled guard reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reference {
    LastTransition,
    LastArrival(usize),
    LastAny,
}

#[derive(Clone, Debug)]
struct CompiledGuard {
    reference: Reference,
    min: SimTime,
    max: SimTime,
    on_fail: Option<usize>,
}

/// One compiled table entry (a spec with several triggers yields several).
#[derive(Clone, Debug)]
struct Transition {
    id: String,
    source: usize,
    trigger: usize,
    next: usize,
    firing: Vec<(usize, SimTime)>,
    guard: Option<CompiledGuard>,
    settle_time: SimTime,
    settle_ignore: Vec<usize>,
    kind: TransitionKind,
    spec_guard: Option<Guard>,
}

/// Builder for [`Automaton`].
#[derive(Clone, Debug)]
pub struct AutomatonBuilder {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    initial: String,
    transitions: Vec<TransitionSpec>,
    firing_delay: SimTime,
    firing_delay_override: Option<SimTime>,
    output_delay_overrides: BTreeMap<String, SimTime>,
    settle_time: SimTime,
    settle_time_override: Option<SimTime>,
    transition_settle_overrides: BTreeMap<String, SimTime>,
    error_ids: Vec<String>,
    unmatched: UnmatchedPolicy,
    jjs: Option<u32>,
}

impl AutomatonBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            initial: "idle".to_string(),
            transitions: Vec::new(),
            firing_delay: 0,
            firing_delay_override: None,
            output_delay_overrides: BTreeMap::new(),
            settle_time: 0,
            settle_time_override: None,
            transition_settle_overrides: BTreeMap::new(),
            error_ids: Vec::new(),
            unmatched: UnmatchedPolicy::Strict,
            jjs: None,
        }
    }

    /// Declares the input ports, in order.
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the output ports, in order.
    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initial state (defaults to `"idle"`).
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = state.into();
        self
    }

    /// Default delay for firing transitions that declare none.
    pub fn firing_delay(mut self, delay: SimTime) -> Self {
        self.firing_delay = delay;
        self
    }

    /// Forces every fired output to use `delay`, whatever the transitions say.
    pub fn override_firing_delay(mut self, delay: Option<SimTime>) -> Self {
        self.firing_delay_override = delay;
        self
    }

    /// Forces every pulse fired on `output` to use `delay`.
    ///
    /// Outputs without an entry keep their declared delays. A cell-wide
    /// [`override_firing_delay`](Self::override_firing_delay) takes precedence.
    pub fn override_firing_delay_for(mut self, output: impl Into<String>, delay: SimTime) -> Self {
        self.output_delay_overrides.insert(output.into(), delay);
        self
    }

    /// Settle time for transitions declared with [`TransitionSpec::settle_default`].
    pub fn settle_time(mut self, time: SimTime) -> Self {
        self.settle_time = time;
        self
    }

    /// Replaces settle times: default-settle transitions get `time`, all others zero.
    pub fn override_settle_time(mut self, time: Option<SimTime>) -> Self {
        self.settle_time_override = time;
        self
    }

    /// Sets the settle time of the transition with id `id`, ahead of any other setting.
    pub fn override_settle_time_for(mut self, id: impl Into<String>, time: SimTime) -> Self {
        self.transition_settle_overrides.insert(id.into(), time);
        self
    }

    /// Marks the transitions with the given ids as erroneous.
    pub fn error_transitions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Consume unmatched inputs instead of raising a diagnostic.
    pub fn ignore_unmatched(mut self) -> Self {
        self.unmatched = UnmatchedPolicy::Ignore;
        self
    }

    /// Records the Josephson-junction count of the cell.
    pub fn jjs(mut self, jjs: u32) -> Self {
        self.jjs = Some(jjs);
        self
    }

    /// Adds a transition. Declaration order is kept in the compiled table.
    pub fn transition(mut self, spec: TransitionSpec) -> Self {
        self.transitions.push(spec);
        self
    }

    fn err(&self, message: impl Into<String>) -> SimError {
        SimError::config(format!("automaton '{}'", self.name), message)
    }

    fn input_index(&self, port: &str) -> SimResult<usize> {
        self.inputs
            .iter()
            .position(|p| p == port)
            .ok_or_else(|| self.err(format!("'{}' is not an input", port)))
    }

    fn output_index(&self, port: &str) -> SimResult<usize> {
        self.outputs
            .iter()
            .position(|p| p == port)
            .ok_or_else(|| self.err(format!("'{}' is not an output", port)))
    }

    /// Assigns ids to transitions without one, skipping ids already in use.
    fn assign_ids(&mut self) -> SimResult<()> {
        let mut taken = HashSet::new();
        for spec in &self.transitions {
            if let Some(id) = &spec.id {
                if !taken.insert(id.clone()) {
                    return Err(self.err(format!("duplicate transition id '{}'", id)));
                }
            }
        }

        let mut next = 0usize;
        for spec in &mut self.transitions {
            if spec.id.is_none() {
                while taken.contains(&next.to_string()) {
                    next += 1;
                }
                spec.id = Some(next.to_string());
                next += 1;
            }
        }
        Ok(())
    }

    /// Checks the declaration and compiles it into an [`Automaton`].
    pub fn build(mut self) -> SimResult<Automaton> {
        self.check_ports()?;
        self.assign_ids()?;

        let all_ids: HashSet<String> = self.transitions.iter().filter_map(|t| t.id.clone()).collect();
        if let Some(unknown) = self.error_ids.iter().find(|id| !all_ids.contains(*id)) {
            return Err(self.err(format!("error transition id '{}' matches no transition", unknown)));
        }
        if let Some(unknown) = self.transition_settle_overrides.keys().find(|id| !all_ids.contains(*id)) {
            return Err(self.err(format!("transition time for id '{}' matches no transition", unknown)));
        }
        if let Some(unknown) = self.output_delay_overrides.keys().find(|o| !self.outputs.contains(*o)) {
            return Err(self.err(format!("firing delay for '{}', which is not an output", unknown)));
        }

        if !self.transitions.is_empty()
            && !self
                .transitions
                .iter()
                .any(|t| t.source == self.initial || t.next == self.initial)
        {
            return Err(self.err(format!("initial state '{}' is unknown", self.initial)));
        }

        let mut states = vec![self.initial.clone()];
        for spec in &self.transitions {
            for s in [&spec.source, &spec.next] {
                if !states.contains(s) {
                    states.push(s.clone());
                }
            }
        }
        let state_index = |name: &str| states.iter().position(|s| s == name).unwrap_or(0);

        let mut compiled = Vec::new();
        for spec in &self.transitions {
            let id = spec.id.clone().unwrap_or_default();
            self.check_spec(spec, &id)?;

            let kind = if self.error_ids.contains(&id) {
                TransitionKind::Error
            } else {
                spec.kind
            };

            let mut firing = Vec::with_capacity(spec.firing.len());
            for out in &spec.firing {
                let delay = match self.firing_delay_override {
                    Some(d) => d,
                    None => self
                        .output_delay_overrides
                        .get(out)
                        .copied()
                        .or_else(|| {
                            spec.delay_overrides
                                .iter()
                                .find(|(o, _)| o == out)
                                .map(|(_, d)| *d)
                        })
                        .or(spec.delay)
                        .unwrap_or(self.firing_delay),
                };
                firing.push((self.output_index(out)?, delay));
            }

            let settle_time = match (self.transition_settle_overrides.get(&id), self.settle_time_override) {
                (Some(&t), _) => t,
                (None, Some(t)) if spec.settle_default => t,
                (None, Some(_)) => 0,
                (None, None) if spec.settle_default => self.settle_time,
                (None, None) => spec.settle_time.unwrap_or(0),
            };

            let settle_ignore = spec
                .settle_ignore
                .iter()
                .map(|p| self.input_index(p))
                .collect::<SimResult<Vec<_>>>()?;

            for trigger in &spec.triggers {
                let guard = match &spec.guard {
                    Some(g) => Some(CompiledGuard {
                        reference: match &g.reference {
                            GuardRef::LastTransition => Reference::LastTransition,
                            GuardRef::LastArrival(port) => Reference::LastArrival(self.input_index(port)?),
                            GuardRef::LastAnyArrival => Reference::LastAny,
                        },
                        min: g.bounds().0,
                        max: g.bounds().1,
                        on_fail: None,
                    }),
                    None => None,
                };
                compiled.push(Transition {
                    id: id.clone(),
                    source: state_index(&spec.source),
                    trigger: self.input_index(trigger)?,
                    next: state_index(&spec.next),
                    firing: firing.clone(),
                    guard,
                    settle_time,
                    settle_ignore: settle_ignore.clone(),
                    kind,
                    spec_guard: spec.guard.clone(),
                });
            }
        }

        let width = self.inputs.len();
        let mut table = vec![Vec::new(); states.len() * width];
        for (ix, t) in compiled.iter().enumerate() {
            if t.kind != TransitionKind::Fallback {
                table[t.source * width + t.trigger].push(ix);
            }
        }

        self.check_determinism(&compiled, &table, &states)?;
        self.resolve_fallbacks(&mut compiled, &table, &states)?;

        Ok(Automaton {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            states,
            initial: 0,
            transitions: compiled,
            table,
            unmatched: self.unmatched,
            jjs: self.jjs,
        })
    }

    fn check_ports(&self) -> SimResult<()> {
        for (kind, ports) in [("input", &self.inputs), ("output", &self.outputs)] {
            let mut seen = HashSet::new();
            for p in ports.iter() {
                if !seen.insert(p) {
                    return Err(self.err(format!("duplicate {} port '{}'", kind, p)));
                }
            }
        }
        if let Some(p) = self.inputs.iter().find(|p| self.outputs.contains(p)) {
            return Err(self.err(format!("'{}' is declared as both input and output", p)));
        }
        Ok(())
    }

    fn check_spec(&self, spec: &TransitionSpec, id: &str) -> SimResult<()> {
        if spec.triggers.is_empty() {
            return Err(self.err(format!("transition '{}' has no trigger", id)));
        }
        if let Some(dup) = first_duplicate(&spec.triggers) {
            return Err(self.err(format!("trigger '{}' appears twice in transition '{}'", dup, id)));
        }
        if let Some(dup) = first_duplicate(&spec.firing) {
            return Err(self.err(format!("output '{}' fires twice in transition '{}'", dup, id)));
        }
        if let Some(dup) = first_duplicate(&spec.settle_ignore) {
            return Err(self.err(format!("'{}' is ignored twice in transition '{}'", dup, id)));
        }
        for (out, _) in &spec.delay_overrides {
            if !spec.firing.contains(out) {
                return Err(self.err(format!(
                    "delay override for '{}' in transition '{}' names an output that does not fire",
                    out, id
                )));
            }
        }
        if spec.kind == TransitionKind::Ignore && (!spec.firing.is_empty() || spec.source != spec.next) {
            return Err(self.err(format!(
                "ignore transition '{}' must be a self-loop without outputs",
                id
            )));
        }
        if let Some(g) = &spec.guard {
            if let (Some(lo), Some(hi)) = (g.min, g.max) {
                if lo > hi {
                    return Err(self.err(format!("guard of transition '{}' has min {} > max {}", id, lo, hi)));
                }
            }
            if spec.kind == TransitionKind::Fallback {
                return Err(self.err(format!("fallback transition '{}' cannot carry a guard", id)));
            }
        }
        Ok(())
    }

    fn check_determinism(&self, compiled: &[Transition], table: &[Vec<usize>], states: &[String]) -> SimResult<()> {
        let width = self.inputs.len();
        for (slot, candidates) in table.iter().enumerate() {
            for (i, &a) in candidates.iter().enumerate() {
                for &b in &candidates[i + 1..] {
                    let (ta, tb) = (&compiled[a], &compiled[b]);
                    let disjoint = match (&ta.spec_guard, &tb.spec_guard) {
                        (Some(ga), Some(gb)) => ga.disjoint_from(gb),
                        _ => false,
                    };
                    if !disjoint {
                        return Err(self.err(format!(
                            "ambiguous transitions '{}' and '{}' from state '{}' on input '{}'",
                            ta.id,
                            tb.id,
                            states[slot / width],
                            self.inputs[slot % width]
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_fallbacks(&self, compiled: &mut [Transition], table: &[Vec<usize>], states: &[String]) -> SimResult<()> {
        let width = self.inputs.len();
        for (slot, candidates) in table.iter().enumerate() {
            let (state, port) = (slot / width, slot % width);
            let mut target: Option<&GuardFail> = None;
            for &ix in candidates {
                if let Some(g) = &compiled[ix].spec_guard {
                    match target {
                        None => target = Some(&g.on_fail),
                        Some(t) if *t != g.on_fail => {
                            return Err(self.err(format!(
                                "guarded transitions from state '{}' on input '{}' declare different failure targets",
                                states[state], self.inputs[port]
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }

            let Some(GuardFail::Goto(target_id)) = target.cloned() else {
                continue;
            };
            let fallback = compiled
                .iter()
                .position(|t| t.id == target_id && t.source == state && t.trigger == port)
                .ok_or_else(|| {
                    self.err(format!(
                        "guard failure target '{}' has no transition from state '{}' on input '{}'",
                        target_id, states[state], self.inputs[port]
                    ))
                })?;
            if compiled[fallback].kind != TransitionKind::Fallback {
                return Err(self.err(format!(
                    "guard failure target '{}' must be declared as a fallback transition",
                    target_id
                )));
            }
            for &ix in candidates {
                if let Some(g) = compiled[ix].guard.as_mut() {
                    g.on_fail = Some(fallback);
                }
            }
        }
        Ok(())
    }
}

fn first_duplicate(items: &[String]) -> Option<&String> {
    let mut seen = HashSet::new();
    items.iter().find(|i| !seen.insert(*i))
}

/// A checked, compiled finite-state automaton.
///
/// The automaton itself is immutable; the state of one running cell is kept in
/// an [`AutomatonState`] owned by the simulator, so a circuit can be shared by
/// independent runs.
#[derive(Clone, Debug)]
pub struct Automaton {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    states: Vec<String>,
    initial: usize,
    transitions: Vec<Transition>,
    table: Vec<Vec<usize>>,
    unmatched: UnmatchedPolicy,
    jjs: Option<u32>,
}

/// Run-time state of one automaton instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutomatonState {
    current: usize,
    last_transition: Option<SimTime>,
    last_arrival: Vec<Option<SimTime>>,
    last_any: Option<SimTime>,
    settle: Option<Settle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Settle {
    until: SimTime,
    transition: usize,
}

impl AutomatonState {
    /// Index of the current state.
    pub fn current(&self) -> usize {
        self.current
    }
}

/// The result of feeding one pulse to an automaton.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Step {
    /// `(from, to, transition id)` when a state-changing transition was taken.
    pub transition: Option<(usize, usize, String)>,
    /// Outputs to fire, as `(output index, delay)` in declaration order.
    pub firing: Vec<(usize, SimTime)>,
}

impl Automaton {
    /// Starts declaring an automaton.
    pub fn builder(name: impl Into<String>) -> AutomatonBuilder {
        AutomatonBuilder::new(name)
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

    /// States in order of first appearance, initial state first.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial_state(&self) -> &str {
        &self.states[self.initial]
    }

    pub fn jjs(&self) -> Option<u32> {
        self.jjs
    }

    pub fn unmatched_policy(&self) -> UnmatchedPolicy {
        self.unmatched
    }

    /// Name of the state with the given index.
    pub fn state_name(&self, index: usize) -> &str {
        self.states.get(index).map(String::as_str).unwrap_or("?")
    }

    /// A fresh run-time state positioned at the initial state.
    pub fn start(&self) -> AutomatonState {
        AutomatonState {
            current: self.initial,
            last_transition: None,
            last_arrival: vec![None; self.inputs.len()],
            last_any: None,
            settle: None,
        }
    }

    /// Smallest delay with which each output can fire, `None` if it never fires.
    pub fn min_output_delays(&self) -> Vec<Option<SimTime>> {
        let mut delays = vec![None; self.outputs.len()];
        for t in &self.transitions {
            if matches!(t.kind, TransitionKind::Ignore | TransitionKind::Error) {
                continue;
            }
            for &(port, delay) in &t.firing {
                let slot: &mut Option<SimTime> = &mut delays[port];
                *slot = Some(slot.map_or(delay, |d| d.min(delay)));
            }
        }
        delays
    }

    /// Feeds a pulse arriving on input `port` at `now`.
    ///
    /// The state update is immediate; fired outputs are returned with their
    /// delays for the caller to schedule.
    pub fn step(&self, state: &mut AutomatonState, port: usize, now: SimTime) -> Result<Step, CellFault> {
        if let Some(settle) = state.settle.clone() {
            if now < settle.until {
                let t = &self.transitions[settle.transition];
                if t.settle_ignore.contains(&port) {
                    state.settle = Some(Settle {
                        until: now + t.settle_time,
                        transition: settle.transition,
                    });
                    self.record_arrival(state, port, now);
                    return Ok(Step::default());
                }
                return Err(CellFault::GuardFailure {
                    state: self.states[t.source].clone(),
                    port: self.inputs[port].clone(),
                    detail: format!(
                        "transition time violation at t={}: still settling from '{}' to '{}' (transition '{}') until t={}",
                        now, self.states[t.source], self.states[t.next], t.id, settle.until
                    ),
                });
            }
            state.settle = None;
        }

        let candidates = &self.table[state.current * self.inputs.len() + port];
        let mut chosen = candidates
            .iter()
            .copied()
            .find(|&ix| self.guard_passes(&self.transitions[ix], state, now));

        if chosen.is_none() {
            match candidates.first() {
                None => {
                    return match self.unmatched {
                        UnmatchedPolicy::Strict => Err(CellFault::UnhandledInput {
                            state: self.states[state.current].clone(),
                            port: self.inputs[port].clone(),
                        }),
                        UnmatchedPolicy::Ignore => {
                            self.record_arrival(state, port, now);
                            Ok(Step::default())
                        }
                    };
                }
                Some(&first) => {
                    let t = &self.transitions[first];
                    match t.guard.as_ref().and_then(|g| g.on_fail) {
                        Some(fallback) => chosen = Some(fallback),
                        None => {
                            return Err(CellFault::GuardFailure {
                                state: self.states[state.current].clone(),
                                port: self.inputs[port].clone(),
                                detail: self.describe_guard_failure(candidates, state, now),
                            });
                        }
                    }
                }
            }
        }

        let ix = chosen.unwrap_or_default();
        let t = &self.transitions[ix];
        match t.kind {
            TransitionKind::Error => Err(CellFault::ErrorTransition {
                transition: t.id.clone(),
                state: self.states[state.current].clone(),
                port: self.inputs[port].clone(),
            }),
            TransitionKind::Ignore => {
                self.record_arrival(state, port, now);
                Ok(Step::default())
            }
            TransitionKind::Normal | TransitionKind::Fallback => {
                let from = state.current;
                state.current = t.next;
                state.last_transition = Some(now);
                state.settle = (t.settle_time > 0).then(|| Settle {
                    until: now + t.settle_time,
                    transition: ix,
                });
                self.record_arrival(state, port, now);
                Ok(Step {
                    transition: Some((from, t.next, t.id.clone())),
                    firing: t.firing.clone(),
                })
            }
        }
    }

    fn record_arrival(&self, state: &mut AutomatonState, port: usize, now: SimTime) {
        state.last_arrival[port] = Some(now);
        state.last_any = Some(now);
    }

    /// Time since the guard's reference event, `None` if it never happened.
    fn elapsed(&self, reference: Reference, state: &AutomatonState, now: SimTime) -> Option<SimTime> {
        let since = match reference {
            Reference::LastTransition => state.last_transition,
            Reference::LastArrival(p) => state.last_arrival[p],
            Reference::LastAny => state.last_any,
        };
        since.map(|since| now.saturating_sub(since))
    }

    fn guard_passes(&self, t: &Transition, state: &AutomatonState, now: SimTime) -> bool {
        match &t.guard {
            None => true,
            Some(g) => match self.elapsed(g.reference, state, now) {
                Some(elapsed) => g.min <= elapsed && elapsed <= g.max,
                // a reference that never happened lies infinitely far back
                None => g.max == SimTime::MAX,
            },
        }
    }

    fn describe_guard_failure(&self, candidates: &[usize], state: &AutomatonState, now: SimTime) -> String {
        candidates
            .iter()
            .filter_map(|&ix| {
                let t = &self.transitions[ix];
                t.guard.as_ref().map(|g| {
                    let max = if g.max == SimTime::MAX {
                        "inf".to_string()
                    } else {
                        g.max.to_string()
                    };
                    let got = match self.elapsed(g.reference, state, now) {
                        Some(elapsed) => elapsed.to_string(),
                        None => "never".to_string(),
                    };
                    format!(
                        "transition '{}' requires elapsed in [{}, {}], got {}",
                        t.id, g.min, max, got
                    )
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `(state, input)` pairs with no declared transition.
    pub fn unhandled_pairs(&self) -> Vec<(String, String)> {
        let width = self.inputs.len();
        self.table
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_empty())
            .map(|(slot, _)| (self.states[slot / width].clone(), self.inputs[slot % width].clone()))
            .collect()
    }

    /// Distinct transition ids in declaration order.
    pub fn transition_ids(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.transitions
            .iter()
            .filter(|t| seen.insert(t.id.as_str()))
            .map(|t| t.id.as_str())
            .collect()
    }

    /// Structural description of the automaton for external translators.
    pub fn describe(&self) -> AutomatonDesc {
        AutomatonDesc {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            states: self.states.clone(),
            initial: self.states[self.initial].clone(),
            unmatched: self.unmatched,
            jjs: self.jjs,
            transitions: self
                .transitions
                .iter()
                .map(|t| TransitionDesc {
                    id: t.id.clone(),
                    source: self.states[t.source].clone(),
                    trigger: self.inputs[t.trigger].clone(),
                    next: self.states[t.next].clone(),
                    firing: t
                        .firing
                        .iter()
                        .map(|&(p, delay)| FiringDesc {
                            output: self.outputs[p].clone(),
                            delay,
                        })
                        .collect(),
                    guard: t.spec_guard.clone(),
                    settle_time: t.settle_time,
                    settle_ignore: t.settle_ignore.iter().map(|&p| self.inputs[p].clone()).collect(),
                    kind: t.kind,
                })
                .collect(),
        }
    }
}

/// One fired output in an [`AutomatonDesc`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiringDesc {
    pub output: String,
    pub delay: SimTime,
}

/// One table entry in an [`AutomatonDesc`] (one per trigger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDesc {
    pub id: String,
    pub source: String,
    pub trigger: String,
    pub next: String,
    pub firing: Vec<FiringDesc>,
    pub guard: Option<Guard>,
    pub settle_time: SimTime,
    pub settle_ignore: Vec<String>,
    pub kind: TransitionKind,
}

/// Declarative, serializable form of an automaton.
///
/// Holds everything needed to regenerate an equivalent timed automaton
/// without running a simulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonDesc {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub states: Vec<String>,
    pub initial: String,
    pub unmatched: UnmatchedPolicy,
    pub jjs: Option<u32>,
    pub transitions: Vec<TransitionDesc>,
}
