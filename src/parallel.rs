//! Batch execution of independent runs.
//!
//! A circuit is immutable during simulation, so many source schedules can be
//! simulated against the same circuit at once. Each run owns its queue and
//! cell state; nothing is shared between runs except the `&Circuit`.
//!
//! # Feature Flag
//!
//! Runs execute on the rayon thread pool with the `parallel` feature:
//! ```toml
//! [dependencies]
//! pulsim = { version = "0.1", features = ["parallel"] }
//! ```
//! Without it the batch runs sequentially. Results are identical either way
//! and always come back in schedule order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use tracing::info;

use crate::circuit::{Circuit, SourceSchedule};
use crate::config::SimulationParams;
use crate::error::SimResult;
use crate::simulator::Simulator;
use crate::stats::Timer;
use crate::trace::Trace;

fn run_one(circuit: &Circuit, schedule: &SourceSchedule, params: &SimulationParams) -> SimResult<Trace> {
    Simulator::new(circuit)
        .with_params(params.clone())
        .run_with_schedule(schedule, params.horizon)
}

/// Simulates `circuit` once per schedule.
///
/// The horizon and event budget come from `params`. The result for
/// `schedules[i]` is at index `i`.
pub fn run_batch(
    circuit: &Circuit,
    schedules: &[SourceSchedule],
    params: &SimulationParams,
) -> Vec<SimResult<Trace>> {
    let timer = Timer::start();

    #[cfg(feature = "parallel")]
    let results: Vec<_> = schedules
        .par_iter()
        .map(|schedule| run_one(circuit, schedule, params))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = schedules
        .iter()
        .map(|schedule| run_one(circuit, schedule, params))
        .collect();

    info!(
        runs = schedules.len(),
        parallel = cfg!(feature = "parallel"),
        elapsed_ms = timer.elapsed_ms(),
        "Batch finished"
    );
    results
}
