//! Scenarios: named workloads that are timed by the run controller
//!
//! A scenario prepares its table once, then hands out a [`Workload`]: the
//! unit of work to time and an optional finalizer that runs once after the
//! timed loop.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, error};

use crate::bench::errors::BenchError;
use crate::core::database::{Database, Transaction};

/// Table every built-in scenario writes to
pub const TABLE_NAME: &str = "warzone";

/// Creates the scenario table
pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS warzone";

/// Inserts one document holding every supported value type
pub const INSERT_ALL_TYPES: &str = r#"INSERT INTO warzone VALUES {
    i: 10,
    dbl: 10.10,
    b: true,
    t: "hello",
    arr: [1, "true", true],
    doc: {"foo": "bar"},
    du: 127ns,
    bb: base64("YmxvYlZhbHVlCg=="),
    byt: base64("Ynl0ZXNWYWx1ZQ==")
}"#;

/// The unit of work timed on every iteration
pub type TimedUnit = Box<dyn FnMut(&Database) -> Result<(), BenchError>>;

/// Runs once after the timed loop, whatever its outcome
pub type Finalizer = Box<dyn FnOnce(&RunOutcome) -> Result<(), BenchError>>;

/// How the timed loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every iteration succeeded
    Completed,
    /// An iteration, or writing its result, returned an error
    Failed,
    /// An iteration panicked; carries the panic message
    Panicked(String),
}

/// What a scenario hands to the run controller
pub struct Workload {
    pub unit: TimedUnit,
    pub finalizer: Option<Finalizer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Every iteration runs in its own implicit transaction
    Plain,
    /// All iterations share one transaction, resolved by the finalizer
    Transactional,
}

/// A named workload definition
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    setup: String,
    statement: String,
    kind: ScenarioKind,
}

impl Scenario {
    pub fn plain(name: impl Into<String>, setup: impl Into<String>, statement: impl Into<String>) -> Self {
        Scenario {
            name: name.into(),
            setup: setup.into(),
            statement: statement.into(),
            kind: ScenarioKind::Plain,
        }
    }

    pub fn transactional(name: impl Into<String>, setup: impl Into<String>, statement: impl Into<String>) -> Self {
        Scenario {
            name: name.into(),
            setup: setup.into(),
            statement: statement.into(),
            kind: ScenarioKind::Transactional,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    /// Prepare the database and build the workload.
    ///
    /// # Panics
    ///
    /// Panics if the setup statement fails or, for transactional
    /// scenarios, if the transaction cannot begin. Either means the
    /// benchmark cannot run at all.
    pub fn construct(&self, db: &Database) -> Workload {
        if let Err(e) = db.exec(&self.setup) {
            panic!("scenario {}: setup failed: {}", self.name, e);
        }
        debug!("scenario {} set up", self.name);

        match self.kind {
            ScenarioKind::Plain => self.plain_workload(),
            ScenarioKind::Transactional => self.transactional_workload(db),
        }
    }

    fn plain_workload(&self) -> Workload {
        let statement = self.statement.clone();

        Workload {
            unit: Box::new(move |db: &Database| db.exec(&statement).map_err(BenchError::from)),
            finalizer: None,
        }
    }

    fn transactional_workload(&self, db: &Database) -> Workload {
        let tx = match db.begin(true) {
            Ok(tx) => tx,
            Err(e) => panic!("scenario {}: cannot begin transaction: {}", self.name, e),
        };

        // Shared by the unit and the finalizer; whoever resolves the
        // transaction takes it out of the slot.
        let slot: Rc<RefCell<Option<Transaction>>> = Rc::new(RefCell::new(Some(tx)));
        let statement = self.statement.clone();

        let unit_slot = Rc::clone(&slot);
        let unit = move |_: &Database| -> Result<(), BenchError> {
            let mut held = unit_slot.borrow_mut();
            let tx = held.as_mut().ok_or(BenchError::TransactionResolved)?;

            if let Err(e) = tx.exec(&statement) {
                return match held.take().map(Transaction::rollback) {
                    Some(Err(rollback)) => Err(BenchError::RollbackFailed { source: e, rollback }),
                    _ => Err(BenchError::Store(e)),
                };
            }
            Ok(())
        };

        let name = self.name.clone();
        let finalizer = move |outcome: &RunOutcome| -> Result<(), BenchError> {
            let Some(tx) = slot.borrow_mut().take() else {
                debug!("scenario {}: transaction already rolled back", name);
                return Ok(());
            };

            match outcome {
                RunOutcome::Completed => tx.commit()?,
                RunOutcome::Failed => tx.rollback()?,
                RunOutcome::Panicked(message) => {
                    error!("scenario {}: recovered panic: {}", name, message);
                    tx.rollback()?
                },
            }
            Ok(())
        };

        Workload {
            unit: Box::new(unit),
            finalizer: Some(Box::new(finalizer)),
        }
    }
}

/// Immutable name to scenario mapping
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scenarios: BTreeMap<String, Scenario>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// The scenarios shipped with warzone
    pub fn builtin() -> Self {
        Registry::new()
            .with(Scenario::plain("insert-all-types", CREATE_TABLE, INSERT_ALL_TYPES))
            .with(Scenario::transactional("insert-all-types-with-tx", CREATE_TABLE, INSERT_ALL_TYPES))
    }

    /// Add a scenario, replacing any with the same name
    pub fn with(mut self, scenario: Scenario) -> Self {
        self.scenarios.insert(scenario.name.clone(), scenario);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }

    /// Scenario names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }
}
