use crate::utils::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::Write,
    time::{Duration, Instant},
};

/// A record of timing information for one solver step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Name of the step (e.g., "update_w", "atom_update")
    pub step_name: String,
    /// Index of the target column the step belonged to
    pub target: usize,
    /// The iteration number when this step was executed
    pub iteration: usize,
    /// Duration of the step in milliseconds
    pub duration_ms: f64,
}

/// Per-step timing diagnostics returned from every fit.
///
/// Solvers fill a tracker while they iterate and hand it back with their
/// result, so callers decide whether to print, export or drop the data.
/// Trackers from independent targets are combined with [`TimingTracker::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingTracker {
    step_timings: Vec<TimingRecord>,
    current_iteration: usize,
    target: usize,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker whose records are tagged with `target`.
    pub fn for_target(target: usize) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    pub fn start_iteration(&mut self) {
        self.current_iteration += 1;
    }

    pub fn record_step(&mut self, step_name: &str, duration: Duration) {
        self.step_timings.push(TimingRecord {
            step_name: step_name.to_string(),
            target: self.target,
            iteration: self.current_iteration,
            duration_ms: duration.as_secs_f64() * 1000.0,
        });
    }

    /// Appends all records of `other`.
    pub fn merge(&mut self, other: TimingTracker) {
        self.current_iteration = self.current_iteration.max(other.current_iteration);
        self.step_timings.extend(other.step_timings);
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.step_timings
    }

    pub fn write_step_timings_to_csv(&self, filename: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "step_name,target,iteration,duration_ms")?;
        for record in &self.step_timings {
            writeln!(
                file,
                "{},{},{},{:.3}",
                record.step_name, record.target, record.iteration, record.duration_ms
            )?;
        }

        Ok(())
    }

    /// `(average_ms, max_ms, count)` per step name.
    pub fn get_step_statistics(&self) -> BTreeMap<String, (f64, f64, usize)> {
        let mut stats = BTreeMap::new();

        for record in &self.step_timings {
            let entry = stats
                .entry(record.step_name.clone())
                .or_insert((0.0f64, 0.0f64, 0));
            entry.0 += record.duration_ms;
            entry.1 = entry.1.max(record.duration_ms);
            entry.2 += 1;
        }

        for (_, stats) in stats.iter_mut() {
            stats.0 /= stats.2 as f64;
        }

        stats
    }

    pub fn print_timing_summary(&self) {
        println!("\n=== Step Timing Summary ===");
        for (step, (avg, max, count)) in self.get_step_statistics() {
            println!(
                "{}: avg={:.4}ms, max={:.4}ms, count={}",
                step, avg, max, count
            );
        }
        println!();
    }
}

/// Runs `f`, records its duration under `name` and passes its result through.
pub fn time_fn<F, R>(tracker: &mut TimingTracker, name: &str, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    let start = Instant::now();
    let result = f();
    tracker.record_step(name, start.elapsed());
    result
}
