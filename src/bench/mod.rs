//! Benchmark harness
//!
//! Times a scenario's unit of work over many iterations and reports a
//! sampled CSV series. See [`lifecycle::execute`] for the entry point.

pub mod errors;
pub mod lifecycle;
pub mod runner;
pub mod scenario;

pub use errors::{BenchError, Failure, Failures, Phase};
pub use lifecycle::{drive, execute, BenchConfig};
pub use runner::{run, RunParams};
pub use scenario::{Finalizer, Registry, RunOutcome, Scenario, ScenarioKind, TimedUnit, Workload};
