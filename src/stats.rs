//! Run statistics and export.
//!
//! Every [`Trace`](crate::trace::Trace) carries a [`RunStats`] record that can
//! be exported as JSON, CSV or a human-readable summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::SimTime;

/// Aggregate statistics for one simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Number of cells in the simulated circuit
    pub cells: usize,

    /// Number of wires in the simulated circuit
    pub wires: usize,

    /// Events popped from the queue and handled
    pub events_processed: u64,

    /// Events ever scheduled, including seeds and those left past the horizon
    pub events_scheduled: u64,

    /// Pulses recorded in the trace
    pub pulses_recorded: u64,

    /// Largest number of simultaneously pending events
    pub peak_queue_len: usize,

    /// Simulation time of the last processed event
    pub final_time: SimTime,

    /// Number of per-cell diagnostics raised
    pub diagnostics: usize,

    /// Wall-clock duration of the run in milliseconds.
    ///
    /// Not part of the serialized trace, which must be identical across runs.
    #[serde(skip)]
    pub wall_time_ms: f64,
}

impl RunStats {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events processed per wall-clock second.
    pub fn events_per_second(&self) -> f64 {
        if self.wall_time_ms > 0.0 {
            self.events_processed as f64 / (self.wall_time_ms / 1000.0)
        } else {
            0.0
        }
    }

    /// Exports statistics to JSON, wall time included.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("wall_time_ms".to_string(), serde_json::json!(self.wall_time_ms));
        }
        serde_json::to_string_pretty(&value)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");
        csv.push_str(&format!("cells,{}\n", self.cells));
        csv.push_str(&format!("wires,{}\n", self.wires));
        csv.push_str(&format!("events_processed,{}\n", self.events_processed));
        csv.push_str(&format!("events_scheduled,{}\n", self.events_scheduled));
        csv.push_str(&format!("pulses_recorded,{}\n", self.pulses_recorded));
        csv.push_str(&format!("peak_queue_len,{}\n", self.peak_queue_len));
        csv.push_str(&format!("final_time,{}\n", self.final_time));
        csv.push_str(&format!("diagnostics,{}\n", self.diagnostics));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.wall_time_ms));

        csv
    }

    /// Exports statistics to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        w.write_all(self.summary().as_bytes())
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== Simulation Statistics ===".to_string(),
            String::new(),
            format!("Circuit: {} cells, {} wires", self.cells, self.wires),
            format!("Final simulation time: {}", self.final_time),
            format!("Events processed: {}", self.events_processed),
            format!("Events scheduled: {}", self.events_scheduled),
            format!("Pulses recorded: {}", self.pulses_recorded),
            format!("Peak queue length: {}", self.peak_queue_len),
            format!("Diagnostics: {}", self.diagnostics),
            String::new(),
            format!("Wall time: {:.2} ms", self.wall_time_ms),
            format!("Events/sec: {:.2}", self.events_per_second()),
        ];
        lines.push(String::new());
        lines.join("\n")
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunStats {
        RunStats {
            cells: 4,
            wires: 3,
            events_processed: 500,
            events_scheduled: 510,
            pulses_recorded: 480,
            peak_queue_len: 12,
            final_time: 1000,
            diagnostics: 1,
            wall_time_ms: 2.5,
        }
    }

    #[test]
    fn test_stats_json_export() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["final_time"], 1000);
        assert_eq!(value["wall_time_ms"], 2.5);
    }

    #[test]
    fn test_wall_time_not_serialized() {
        let plain = serde_json::to_value(sample()).unwrap();
        assert!(plain.get("wall_time_ms").is_none());
    }

    #[test]
    fn test_stats_csv_export() {
        let csv = sample().to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("final_time,1000"));
        assert!(csv.contains("events_processed,500"));
    }

    #[test]
    fn test_summary_output() {
        let summary = sample().summary();
        assert!(summary.contains("Final simulation time: 1000"));
        assert!(summary.contains("Diagnostics: 1"));

        let mut buf = Vec::new();
        sample().write_summary(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), summary);
    }

    #[test]
    fn test_events_per_second() {
        assert_eq!(RunStats::new().events_per_second(), 0.0);
        assert!((sample().events_per_second() - 200_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }
}
