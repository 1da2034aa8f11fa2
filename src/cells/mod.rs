//! Built-in cell library.
//!
//! Cells are data: each constructor returns a checked [`Automaton`] built from
//! a transition table. Timings are in tenths of a picosecond.
//!
//! - [`sfq`] - single-flux-quantum gates (JTL, splitter, merger, C, C_INV, DRO, TFF)
//! - [`dual_rail`] - dual-rail logic (2x2 join)
//! - [`io`] - sources, sinks and stimulus helpers

pub mod dual_rail;
pub mod io;
pub mod sfq;

use std::collections::BTreeMap;

use crate::automaton::{Automaton, AutomatonBuilder};
use crate::error::{SimError, SimResult};
use crate::registry::CellParams;
use crate::types::SimTime;

/// Per-instance overrides of a library cell's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces every firing delay of the cell
    pub firing_delay: Option<SimTime>,
    /// Firing delay per output name
    pub firing_delays: BTreeMap<String, SimTime>,
    /// Settle time of transitions declared with the default settle time; all
    /// other settle times become zero
    pub transition_time: Option<SimTime>,
    /// Settle time per transition id
    pub transition_times: BTreeMap<String, SimTime>,
    /// Ids of transitions to treat as erroneous
    pub error_transitions: Vec<String>,
    /// Josephson-junction count
    pub jjs: Option<u32>,
}

const OVERRIDE_KEYS: &[&str] = &["firing_delay", "transition_time", "error_transitions", "jjs"];

/// Keys of the form `firing_delay.<output>` and `transition_time.<id>`.
const KEYED_OVERRIDES: &[&str] = &["firing_delay", "transition_time"];

fn is_override_key(key: &str) -> bool {
    match key.split_once('.') {
        Some((base, name)) => KEYED_OVERRIDES.contains(&base) && !name.is_empty(),
        None => OVERRIDE_KEYS.contains(&key),
    }
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn firing_delay(mut self, delay: SimTime) -> Self {
        self.firing_delay = Some(delay);
        self
    }

    pub fn transition_time(mut self, time: SimTime) -> Self {
        self.transition_time = Some(time);
        self
    }

    pub fn firing_delay_for(mut self, output: impl Into<String>, delay: SimTime) -> Self {
        self.firing_delays.insert(output.into(), delay);
        self
    }

    pub fn transition_time_for(mut self, id: impl Into<String>, time: SimTime) -> Self {
        self.transition_times.insert(id.into(), time);
        self
    }

    pub fn error_transition(mut self, id: impl Into<String>) -> Self {
        self.error_transitions.push(id.into());
        self
    }

    pub fn jjs(mut self, jjs: u32) -> Self {
        self.jjs = Some(jjs);
        self
    }

    /// Reads overrides from netlist parameters, rejecting unknown keys.
    ///
    /// `firing_delay.<output>` and `transition_time.<id>` set the map-valued
    /// overrides.
    pub fn from_params(cell: &str, params: &CellParams) -> SimResult<Self> {
        if let Some((key, value)) = params.iter().find(|(k, _)| !is_override_key(k)) {
            return Err(SimError::InvalidParam {
                cell: cell.to_string(),
                key: key.clone(),
                value: value.clone(),
                reason: format!(
                    "expected one of {}, or firing_delay.<output> / transition_time.<id>",
                    OVERRIDE_KEYS.join(", ")
                ),
            });
        }

        let number = |key: &str| -> SimResult<Option<u64>> {
            params
                .get(key)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|e| SimError::InvalidParam {
                        cell: cell.to_string(),
                        key: key.to_string(),
                        value: v.clone(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };

        let jjs = number("jjs")?
            .map(|j| {
                u32::try_from(j).map_err(|e| SimError::InvalidParam {
                    cell: cell.to_string(),
                    key: "jjs".to_string(),
                    value: j.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let error_transitions = params
            .get("error_transitions")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let keyed = |base: &str| -> SimResult<BTreeMap<String, SimTime>> {
            let mut map = BTreeMap::new();
            for key in params.keys() {
                if let Some((b, name)) = key.split_once('.') {
                    if b == base {
                        if let Some(value) = number(key.as_str())? {
                            map.insert(name.to_string(), value);
                        }
                    }
                }
            }
            Ok(map)
        };

        Ok(Self {
            firing_delay: number("firing_delay")?,
            firing_delays: keyed("firing_delay")?,
            transition_time: number("transition_time")?,
            transition_times: keyed("transition_time")?,
            error_transitions,
            jjs,
        })
    }

    /// Applies the overrides on top of a cell's defaults and builds it.
    pub(crate) fn finish(&self, builder: AutomatonBuilder, default_jjs: u32) -> SimResult<Automaton> {
        let builder = self
            .firing_delays
            .iter()
            .fold(builder, |b, (output, &delay)| b.override_firing_delay_for(output.clone(), delay));
        let builder = self
            .transition_times
            .iter()
            .fold(builder, |b, (id, &time)| b.override_settle_time_for(id.clone(), time));
        builder
            .override_firing_delay(self.firing_delay)
            .override_settle_time(self.transition_time)
            .error_transitions(self.error_transitions.iter().cloned())
            .jjs(self.jjs.unwrap_or(default_jjs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> CellParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_overrides_from_params() {
        let o = Overrides::from_params(
            "c0",
            &params(&[("firing_delay", "12"), ("error_transitions", "1, 3"), ("jjs", "7")]),
        )
        .unwrap();
        assert_eq!(o.firing_delay, Some(12));
        assert_eq!(o.transition_time, None);
        assert_eq!(o.error_transitions, vec!["1", "3"]);
        assert_eq!(o.jjs, Some(7));
    }

    #[test]
    fn test_overrides_reject_bad_values() {
        let bad_number = Overrides::from_params("c0", &params(&[("firing_delay", "fast")]));
        assert!(matches!(bad_number, Err(SimError::InvalidParam { ref key, .. }) if key == "firing_delay"));

        let unknown = Overrides::from_params("c0", &params(&[("colour", "red")]));
        assert!(matches!(unknown, Err(SimError::InvalidParam { ref key, .. }) if key == "colour"));

        let bad_keyed = Overrides::from_params("c0", &params(&[("jjs.q", "3")]));
        assert!(matches!(bad_keyed, Err(SimError::InvalidParam { ref key, .. }) if key == "jjs.q"));

        let bad_keyed_value = Overrides::from_params("c0", &params(&[("firing_delay.q", "-1")]));
        assert!(matches!(bad_keyed_value, Err(SimError::InvalidParam { ref key, .. }) if key == "firing_delay.q"));
    }

    #[test]
    fn test_keyed_overrides_from_params() {
        let o = Overrides::from_params(
            "s0",
            &params(&[("firing_delay.r", "50"), ("firing_delay.l", "40"), ("transition_time.0", "4")]),
        )
        .unwrap();
        assert_eq!(o.firing_delay, None);
        assert_eq!(o, Overrides::new().firing_delay_for("l", 40).firing_delay_for("r", 50).transition_time_for("0", 4));

        let s = sfq::splitter(&o).unwrap();
        let delays: Vec<_> = s.describe().transitions[0].firing.iter().map(|f| (f.output.clone(), f.delay)).collect();
        assert_eq!(delays, vec![("l".to_string(), 40), ("r".to_string(), 50)]);
        assert_eq!(s.describe().transitions[0].settle_time, 4);
    }
}
