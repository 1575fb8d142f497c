//! Run lifecycle: open, construct, run, finalize, close, clean up
//!
//! Every phase reports into one [`Failures`] collection. A failing phase
//! never prevents the later teardown phases from running.

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::bench::errors::{BenchError, Failures, Phase};
use crate::bench::runner::{self, RunParams};
use crate::bench::scenario::{Registry, RunOutcome, Scenario, Workload};
use crate::core::database::Database;
use crate::storage::{self, EngineKind};

/// Everything needed to run one scenario
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub engine: EngineKind,
    /// Database location; derived from the scenario name when absent
    pub target: Option<PathBuf>,
    pub scenario: String,
    /// Remove the on-disk database once the run is over
    pub remove_after: bool,
    pub params: RunParams,
}

impl BenchConfig {
    pub fn new(scenario: impl Into<String>, engine: EngineKind) -> Self {
        BenchConfig {
            engine,
            target: None,
            scenario: scenario.into(),
            remove_after: false,
            params: RunParams::default(),
        }
    }

    /// The database location: the explicit target, or `<scenario>.db`
    pub fn target_path(&self) -> PathBuf {
        self.target
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.db", self.scenario)))
    }
}

/// Run the configured scenario and write its timings to `out`.
///
/// The returned collection is empty when every phase succeeded.
///
/// # Panics
///
/// Scenario construction panics (setup statement or transaction begin
/// failures) are not caught.
pub fn execute<W: Write + ?Sized>(config: &BenchConfig, registry: &Registry, out: &mut W) -> Failures {
    let mut failures = Failures::new();

    let Some(scenario) = registry.get(&config.scenario) else {
        failures.push(Phase::Open, BenchError::UnknownScenario(config.scenario.clone()));
        return failures;
    };

    let target = config.target_path();
    let Some(db) = failures.record(Phase::Open, Database::open(config.engine, &target)) else {
        return failures;
    };

    run_opened(db, scenario, config, &target, out, &mut failures);
    failures
}

/// Everything after a successful open: construct, drive, close and the
/// optional cleanup. Close and cleanup run whatever happened before them.
fn run_opened<W: Write + ?Sized>(
    db: Database,
    scenario: &Scenario,
    config: &BenchConfig,
    target: &Path,
    out: &mut W,
    failures: &mut Failures,
) {
    info!(
        "running {} on {} at {} ({} iterations)",
        scenario.name(),
        config.engine,
        target.display(),
        config.params.iterations()
    );

    let workload = scenario.construct(&db);
    drive(&db, workload, &config.params, out, failures);

    failures.record(Phase::Close, db.close());

    if config.remove_after {
        if config.engine.is_durable() {
            let removed = storage::remove_artifact(target)
                .map_err(|source| BenchError::Cleanup { path: target.to_path_buf(), source });
            failures.record(Phase::Cleanup, removed);
        } else {
            debug!("{} engine leaves nothing on disk, skipping removal", config.engine);
        }
    }

    info!("run of {} finished with {} error(s)", scenario.name(), failures.len());
}

/// Run the timed loop, then the finalizer, recording failures of both.
///
/// A panic escaping the timed loop is caught here, handed to the finalizer
/// and recorded as a run failure.
pub fn drive<W: Write + ?Sized>(
    db: &Database,
    workload: Workload,
    params: &RunParams,
    out: &mut W,
    failures: &mut Failures,
) {
    let Workload { mut unit, finalizer } = workload;

    let result = panic::catch_unwind(AssertUnwindSafe(|| runner::run(db, &mut unit, params, out)));
    let outcome = match result {
        Ok(Ok(())) => RunOutcome::Completed,
        Ok(Err(e)) => {
            failures.push(Phase::Run, e);
            RunOutcome::Failed
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            failures.push(Phase::Run, BenchError::Panicked(message.clone()));
            RunOutcome::Panicked(message)
        },
    };
    debug!("timed loop ended: {:?}", outcome);
    drop(unit);

    if let Some(finalizer) = finalizer {
        failures.record(Phase::Finalize, finalizer(&outcome));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{Result as StoreResult, StoreError};
    use crate::storage::{Engine, MemoryEngine, Mutation, TableInfo};
    use std::fs;
    use std::io;
    use tempfile::tempdir;

    /// Builtins plus a transactional scenario whose second insert hits a
    /// duplicate primary key
    fn keyed_registry() -> Registry {
        Registry::builtin().with(Scenario::transactional(
            "insert-pk-with-tx",
            "CREATE TABLE IF NOT EXISTS keyed (PRIMARY KEY id)",
            "INSERT INTO keyed VALUES {id: 1}",
        ))
    }

    fn config(scenario: &str, engine: EngineKind, n: u64, f: u64) -> BenchConfig {
        BenchConfig {
            params: RunParams::new(n, f).unwrap(),
            ..BenchConfig::new(scenario, engine)
        }
    }

    fn counts(output: &[u8]) -> Vec<u64> {
        let text = String::from_utf8(output.to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("count,duration"));
        lines
            .map(|line| {
                let (count, duration) = line.split_once(',').unwrap();
                assert!(duration.parse::<f64>().unwrap() >= 0.0);
                count.parse().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_default_target() {
        let mut config = BenchConfig::new("insert-all-types", EngineKind::Sled);
        assert_eq!(config.target_path(), PathBuf::from("insert-all-types.db"));

        config.target = Some(PathBuf::from("custom.db"));
        assert_eq!(config.target_path(), PathBuf::from("custom.db"));
    }

    #[test]
    fn test_insert_all_types_in_memory() {
        let mut out = Vec::new();
        let failures = execute(&config("insert-all-types", EngineKind::Memory, 5, 2), &Registry::builtin(), &mut out);

        assert!(failures.is_empty(), "{}", failures);
        assert_eq!(counts(&out), vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_transaction_failure_rolls_back() {
        let registry = keyed_registry();
        let scenario = registry.get("insert-pk-with-tx").unwrap();

        // Drive by hand to inspect the database before it is closed
        let db = Database::open(EngineKind::Memory, "unused.db").unwrap();
        let mut out = Vec::new();
        let mut failures = Failures::new();
        drive(&db, scenario.construct(&db), &RunParams::new(3, 10).unwrap(), &mut out, &mut failures);

        assert_eq!(failures.phases(), vec![Phase::Run]);
        let failure = failures.iter().next().unwrap();
        assert!(matches!(failure.error, BenchError::Store(StoreError::DuplicateKey { .. })));
        assert_eq!(counts(&out), vec![1]);

        let stats = db.tx_stats();
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(db.count("keyed").unwrap(), 0);

        // Same run end to end
        let mut out = Vec::new();
        let failures = execute(&config("insert-pk-with-tx", EngineKind::Memory, 3, 10), &registry, &mut out);
        assert!(!failures.is_empty());
        assert!(failures.into_result().is_err());
    }

    #[test]
    fn test_failed_run_still_closes_and_removes() {
        let dir = tempdir().unwrap();

        for (engine, name) in [(EngineKind::Sled, "keyed.db"), (EngineKind::Journal, "keyed.journal")] {
            let target = dir.path().join(name);
            let config = BenchConfig {
                target: Some(target.clone()),
                remove_after: true,
                ..config("insert-pk-with-tx", engine, 3, 1)
            };

            let mut out = Vec::new();
            let failures = execute(&config, &keyed_registry(), &mut out);

            assert_eq!(failures.phases(), vec![Phase::Run]);
            assert_eq!(counts(&out), vec![1]);
            assert!(!target.exists(), "{} left {}", engine, target.display());
        }
    }

    /// Memory engine that cannot be closed
    struct StuckOnClose(MemoryEngine);

    impl Engine for StuckOnClose {
        fn kind(&self) -> EngineKind {
            self.0.kind()
        }

        fn table(&self, name: &str) -> StoreResult<Option<TableInfo>> {
            self.0.table(name)
        }

        fn contains(&self, table: &str, key: &[u8]) -> StoreResult<bool> {
            self.0.contains(table, key)
        }

        fn count(&self, table: &str) -> StoreResult<usize> {
            self.0.count(table)
        }

        fn apply(&mut self, batch: &[Mutation]) -> StoreResult<()> {
            self.0.apply(batch)
        }

        fn flush(&mut self) -> StoreResult<()> {
            self.0.flush()
        }

        fn close(self: Box<Self>) -> StoreResult<()> {
            Err(io::Error::new(io::ErrorKind::Other, "device busy").into())
        }
    }

    #[test]
    fn test_close_failure_is_recorded_after_run_failure() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("keyed.journal");
        fs::write(&target, b"").unwrap();

        let config = BenchConfig {
            target: Some(target.clone()),
            remove_after: true,
            ..config("insert-pk-with-tx", EngineKind::Journal, 3, 1)
        };
        let registry = keyed_registry();
        let db = Database::from_engine(Box::new(StuckOnClose(MemoryEngine::new())));

        let mut out = Vec::new();
        let mut failures = Failures::new();
        run_opened(db, registry.get("insert-pk-with-tx").unwrap(), &config, &target, &mut out, &mut failures);

        assert_eq!(failures.phases(), vec![Phase::Run, Phase::Close]);
        assert_eq!(counts(&out), vec![1]);
        // Cleanup still ran
        assert!(!target.exists());
    }

    #[test]
    fn test_transactional_run_commits() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("tx.db");
        let config = BenchConfig {
            target: Some(target.clone()),
            ..config("insert-all-types-with-tx", EngineKind::Sled, 4, 2)
        };

        let mut out = Vec::new();
        let failures = execute(&config, &Registry::builtin(), &mut out);
        assert!(failures.is_empty(), "{}", failures);
        assert_eq!(counts(&out), vec![1, 2, 4]);

        let db = Database::open(EngineKind::Sled, &target).unwrap();
        assert_eq!(db.count("warzone").unwrap(), 4);
        db.close().unwrap();
    }

    #[test]
    fn test_panic_in_timed_unit_is_recovered() {
        let db = Database::open(EngineKind::Memory, "unused.db").unwrap();
        let Workload { mut unit, finalizer } = Registry::builtin()
            .get("insert-all-types-with-tx")
            .unwrap()
            .construct(&db);

        let mut calls = 0;
        let workload = Workload {
            unit: Box::new(move |db: &Database| {
                calls += 1;
                if calls == 2 {
                    panic!("disk on fire");
                }
                unit(db)
            }),
            finalizer,
        };

        let mut out = Vec::new();
        let mut failures = Failures::new();
        drive(&db, workload, &RunParams::new(5, 1).unwrap(), &mut out, &mut failures);

        assert_eq!(failures.phases(), vec![Phase::Run]);
        let failure = failures.iter().next().unwrap();
        assert!(matches!(&failure.error, BenchError::Panicked(m) if m == "disk on fire"));
        assert_eq!(counts(&out), vec![1]);

        let stats = db.tx_stats();
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(db.count("warzone").unwrap(), 0);
    }

    #[test]
    fn test_finalize_failure_is_kept_apart_from_run_failure() {
        let db = Database::open(EngineKind::Memory, "unused.db").unwrap();
        let workload = Workload {
            unit: Box::new(|_: &Database| -> Result<(), BenchError> {
                Err(StoreError::TableNotFound("warzone".to_string()).into())
            }),
            finalizer: Some(Box::new(|outcome: &RunOutcome| -> Result<(), BenchError> {
                assert_eq!(outcome, &RunOutcome::Failed);
                Err(StoreError::Closed.into())
            })),
        };

        let mut failures = Failures::new();
        drive(&db, workload, &RunParams::default(), &mut std::io::sink(), &mut failures);
        assert_eq!(failures.phases(), vec![Phase::Run, Phase::Finalize]);
    }

    #[test]
    fn test_remove_after_on_memory_engine_is_a_no_op() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("keep-me.db");
        fs::write(&target, b"not ours").unwrap();

        let config = BenchConfig {
            target: Some(target.clone()),
            remove_after: true,
            ..config("insert-all-types", EngineKind::Memory, 2, 1)
        };
        let failures = execute(&config, &Registry::builtin(), &mut Vec::new());

        assert!(failures.is_empty(), "{}", failures);
        assert!(target.exists());
    }

    #[test]
    fn test_remove_after_on_durable_engines() {
        let dir = tempdir().unwrap();

        for (engine, name) in [(EngineKind::Sled, "bench.db"), (EngineKind::Journal, "bench.journal")] {
            let target = dir.path().join(name);
            let config = BenchConfig {
                target: Some(target.clone()),
                remove_after: true,
                ..config("insert-all-types", engine, 3, 1)
            };

            let failures = execute(&config, &Registry::builtin(), &mut Vec::new());
            assert!(failures.is_empty(), "{}", failures);
            assert!(!target.exists());
        }
    }

    #[test]
    fn test_open_failure_skips_everything_else() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let config = BenchConfig {
            target: Some(blocker.join("bench.journal")),
            remove_after: true,
            ..config("insert-all-types", EngineKind::Journal, 2, 1)
        };
        let mut out = Vec::new();
        let failures = execute(&config, &Registry::builtin(), &mut out);

        assert_eq!(failures.phases(), vec![Phase::Open]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_scenario() {
        let failures = execute(&config("nope", EngineKind::Memory, 1, 1), &Registry::builtin(), &mut Vec::new());
        let failure = failures.iter().next().unwrap();
        assert!(matches!(&failure.error, BenchError::UnknownScenario(name) if name == "nope"));
    }

    #[test]
    fn test_sink_failure_is_a_run_failure() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let failures = execute(&config("insert-all-types-with-tx", EngineKind::Memory, 2, 1), &Registry::builtin(), &mut Broken);
        assert_eq!(failures.phases(), vec![Phase::Run]);
        assert!(matches!(failures.iter().next().unwrap().error, BenchError::Output(_)));
    }
}
