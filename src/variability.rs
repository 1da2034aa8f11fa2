//! Seeded variation of firing delays.
//!
//! Off by default. When enabled, every delay a transitional cell fires with
//! is perturbed before the pulse is scheduled: either by a bounded random
//! factor drawn from a seeded stream, or by a caller-supplied function. The
//! same seed always yields the same trace.
//!
//! A positive nominal delay never becomes zero, so a loop that was free of
//! zero-delay cycles stays that way.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::cell::Cell;
use crate::types::SimTime;

/// Random variation of every firing delay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variability {
    /// Seed of the run's random stream
    #[serde(default)]
    pub seed: u64,

    /// Largest relative deviation from the nominal delay, in `[0, 1)`
    #[serde(default = "default_spread")]
    pub spread: f64,
}

fn default_spread() -> f64 {
    0.2
}

impl Variability {
    /// Default spread with the given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            spread: default_spread(),
        }
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Checks that the spread is a fraction below one.
    pub fn validate(&self) -> Result<(), String> {
        if !self.spread.is_finite() || !(0.0..1.0).contains(&self.spread) {
            return Err(format!("variability spread must lie in [0, 1), got {}", self.spread));
        }
        Ok(())
    }
}

/// A caller-supplied delay model: `(nominal delay, firing cell) -> actual delay`.
pub type DelayFn = Arc<dyn Fn(SimTime, &Cell) -> SimTime + Send + Sync>;

/// Deterministic jitter source for one run.
pub struct DelayJitter {
    inner: ChaCha8Rng,
    spread: f64,
}

impl DelayJitter {
    pub fn new(variability: &Variability) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(variability.seed),
            spread: variability.spread,
        }
    }

    /// Samples a delay within `spread` of `delay`, uniformly.
    pub fn perturb(&mut self, delay: SimTime) -> SimTime {
        if delay == 0 || self.spread <= 0.0 {
            return delay;
        }
        let nominal = delay as f64;
        let jitter = (self.inner.gen::<f64>() * 2.0 - 1.0) * nominal * self.spread;
        ((nominal + jitter).round() as SimTime).max(1)
    }
}

impl fmt::Debug for DelayJitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayJitter").field("spread", &self.spread).finish()
    }
}

/// How a run turns nominal delays into actual ones.
pub(crate) enum DelayModel {
    Nominal,
    Jitter(DelayJitter),
    Custom(DelayFn),
}

impl DelayModel {
    /// A custom function wins over seeded jitter.
    pub(crate) fn new(variability: Option<&Variability>, custom: Option<&DelayFn>) -> Self {
        match (custom, variability) {
            (Some(f), _) => DelayModel::Custom(Arc::clone(f)),
            (None, Some(v)) => DelayModel::Jitter(DelayJitter::new(v)),
            (None, None) => DelayModel::Nominal,
        }
    }

    pub(crate) fn is_nominal(&self) -> bool {
        matches!(self, DelayModel::Nominal)
    }

    pub(crate) fn apply(&mut self, delay: SimTime, cell: &Cell) -> SimTime {
        match self {
            DelayModel::Nominal => delay,
            DelayModel::Jitter(jitter) => jitter.perturb(delay),
            DelayModel::Custom(f) => {
                let actual = f(delay, cell);
                if delay > 0 {
                    actual.max(1)
                } else {
                    actual
                }
            }
        }
    }
}
