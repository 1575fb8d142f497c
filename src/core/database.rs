//! Database handle and transactions
//!
//! A [`Database`] owns one storage engine. Statements run either in
//! autocommit mode through [`Database::exec`] or inside a [`Transaction`],
//! which stages its writes and hands them to the engine as one batch on
//! commit.
//!
//! The handle is single-threaded: its state sits behind `Rc`/`RefCell`,
//! so neither the database nor its transactions can leave the thread that
//! opened them.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};

use crate::core::errors::{Result, StoreError};
use crate::core::plan::plan;
use crate::ql::parse_statement;
use crate::storage::{Engine, EngineKind, JournalEngine, MemoryEngine, Mutation, PersistentEngine};

/// Transaction counters, useful to check how a run resolved its work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

struct Shared {
    engine: RefCell<Option<Box<dyn Engine>>>,
    /// Set while a writable transaction is open
    writer_active: Cell<bool>,
    stats: Cell<TxStats>,
}

impl Shared {
    fn with_engine<T>(&self, f: impl FnOnce(&mut dyn Engine) -> Result<T>) -> Result<T> {
        let mut slot = self.engine.borrow_mut();
        let engine = slot.as_deref_mut().ok_or(StoreError::Closed)?;
        f(engine)
    }

    fn record(&self, update: impl FnOnce(&mut TxStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

/// Handle to an open database
pub struct Database {
    shared: Rc<Shared>,
    kind: EngineKind,
    target: PathBuf,
}

impl Database {
    /// Open a database with the given engine. `target` is ignored by the
    /// memory engine.
    pub fn open<P: AsRef<Path>>(kind: EngineKind, target: P) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let engine: Box<dyn Engine> = match kind {
            EngineKind::Memory => Box::new(MemoryEngine::new()),
            EngineKind::Sled => Box::new(PersistentEngine::open(&target)?),
            EngineKind::Journal => Box::new(JournalEngine::open(&target)?),
        };

        debug!("opened {} database at {}", kind, target.display());
        Ok(Self::from_parts(engine, target))
    }

    /// Wrap an already opened engine
    pub fn from_engine(engine: Box<dyn Engine>) -> Self {
        Self::from_parts(engine, PathBuf::new())
    }

    fn from_parts(engine: Box<dyn Engine>, target: PathBuf) -> Self {
        Database {
            kind: engine.kind(),
            shared: Rc::new(Shared {
                engine: RefCell::new(Some(engine)),
                writer_active: Cell::new(false),
                stats: Cell::new(TxStats::default()),
            }),
            target,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Execute a statement in its own implicit transaction
    pub fn exec(&self, statement: &str) -> Result<()> {
        let statement = parse_statement(statement)?;
        if self.shared.writer_active.get() {
            return Err(StoreError::TransactionInProgress);
        }

        self.shared.with_engine(|engine| {
            let batch = plan(statement, engine, &[])?;
            if batch.is_empty() {
                return Ok(());
            }
            engine.apply(&batch)
        })
    }

    /// Begin a transaction. Only one writable transaction may be open at a
    /// time.
    pub fn begin(&self, writable: bool) -> Result<Transaction> {
        self.shared.with_engine(|_| Ok(()))?;
        if writable {
            if self.shared.writer_active.get() {
                return Err(StoreError::TransactionInProgress);
            }
            self.shared.writer_active.set(true);
        }
        self.shared.record(|s| s.begun += 1);

        Ok(Transaction {
            shared: Rc::clone(&self.shared),
            writable,
            pending: Vec::new(),
            resolved: false,
        })
    }

    /// Count the documents of a table
    pub fn count(&self, table: &str) -> Result<usize> {
        self.shared.with_engine(|engine| engine.count(table))
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.shared.with_engine(|engine| Ok(engine.table(table)?.is_some()))
    }

    pub fn tx_stats(&self) -> TxStats {
        self.shared.stats.get()
    }

    /// Flush and release the engine. Transactions still alive afterwards
    /// fail with [`StoreError::Closed`].
    pub fn close(self) -> Result<()> {
        let engine = self.shared.engine.borrow_mut().take();
        match engine {
            Some(mut engine) => {
                engine.flush()?;
                engine.close()?;
                debug!("closed {} database at {}", self.kind, self.target.display());
                Ok(())
            },
            None => Err(StoreError::Closed),
        }
    }
}

/// A transaction. Writes are staged until [`Transaction::commit`];
/// dropping an unresolved transaction rolls it back.
pub struct Transaction {
    shared: Rc<Shared>,
    writable: bool,
    pending: Vec<Mutation>,
    resolved: bool,
}

impl Transaction {
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Execute a statement inside the transaction
    pub fn exec(&mut self, statement: &str) -> Result<()> {
        let statement = parse_statement(statement)?;
        if !self.writable {
            return Err(StoreError::ReadOnlyTransaction);
        }

        let pending = &self.pending;
        let batch = self.shared.with_engine(|engine| plan(statement, engine, pending))?;
        self.pending.extend(batch);
        Ok(())
    }

    /// Number of staged writes
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Apply every staged write atomically
    pub fn commit(mut self) -> Result<()> {
        self.finish();
        self.shared.record(|s| s.commits += 1);

        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return self.shared.with_engine(|_| Ok(()));
        }
        self.shared.with_engine(|engine| engine.apply(&pending))
    }

    /// Discard every staged write
    pub fn rollback(mut self) -> Result<()> {
        self.finish();
        self.shared.record(|s| s.rollbacks += 1);

        let discarded = std::mem::take(&mut self.pending).len();
        debug!("rolled back {} staged writes", discarded);
        self.shared.with_engine(|_| Ok(()))
    }

    fn finish(&mut self) {
        self.resolved = true;
        if self.writable {
            self.shared.writer_active.set(false);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        warn!("transaction dropped without commit or rollback, discarding {} staged writes", self.pending.len());
        self.finish();
        self.shared.record(|s| s.rollbacks += 1);
    }
}
