//! The timed loop

use std::io::Write;
use std::time::Instant;

use crate::bench::errors::BenchError;
use crate::core::database::Database;

/// Iteration count and reporting stride of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParams {
    iterations: u64,
    frequency: u64,
}

impl RunParams {
    pub fn new(iterations: u64, frequency: u64) -> Result<Self, BenchError> {
        if iterations == 0 {
            return Err(BenchError::InvalidParams("iteration count must be at least 1".to_string()));
        }
        if frequency == 0 {
            return Err(BenchError::InvalidParams("sampling frequency must be at least 1".to_string()));
        }
        Ok(RunParams { iterations, frequency })
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// Whether iteration `i` (1-based) gets a line in the output
    pub fn is_sampled(&self, i: u64) -> bool {
        i == 1 || i == self.iterations || i % self.frequency == 0
    }
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams { iterations: 100, frequency: 10 }
    }
}

/// Run `unit` once per iteration, timing each call, and write the sampled
/// timings to `out` as `count,duration` CSV with durations in
/// milliseconds.
///
/// Stops at the first failing iteration and returns its error.
pub fn run<W, F>(db: &Database, unit: &mut F, params: &RunParams, out: &mut W) -> Result<(), BenchError>
where
    W: Write + ?Sized,
    F: FnMut(&Database) -> Result<(), BenchError> + ?Sized,
{
    writeln!(out, "count,duration")?;

    for i in 1..=params.iterations {
        let start = Instant::now();
        unit(db)?;
        let elapsed = start.elapsed();

        if params.is_sampled(i) {
            writeln!(out, "{},{:.2}", i, elapsed.as_secs_f64() * 1000.0)?;
        }
    }

    out.flush()?;
    Ok(())
}
