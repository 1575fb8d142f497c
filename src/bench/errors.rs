//! Error types for the benchmark harness

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::errors::StoreError;

/// Errors raised while running a scenario
#[derive(Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot rollback: {rollback}, base error: {source}")]
    RollbackFailed { source: StoreError, rollback: StoreError },

    #[error("scenario panicked: {0}")]
    Panicked(String),

    #[error("transaction already resolved")]
    TransactionResolved,

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("invalid run parameters: {0}")]
    InvalidParams(String),

    #[error("cannot write results: {0}")]
    Output(#[from] io::Error),

    #[error("cannot remove {}: {source}", path.display())]
    Cleanup { path: PathBuf, source: io::Error },
}

/// The phase of a run a failure belongs to, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Open,
    Run,
    Finalize,
    Close,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Open => "open",
            Phase::Run => "run",
            Phase::Finalize => "finalize",
            Phase::Close => "close",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// One failed phase
#[derive(Error, Debug)]
#[error("{phase}: {error}")]
pub struct Failure {
    pub phase: Phase,
    #[source]
    pub error: BenchError,
}

/// Every failure collected over a run, in the order they happened.
///
/// An empty collection means the run succeeded.
#[derive(Debug, Default)]
pub struct Failures(Vec<Failure>);

impl Failures {
    pub fn new() -> Self {
        Failures(Vec::new())
    }

    pub fn push(&mut self, phase: Phase, error: impl Into<BenchError>) {
        self.0.push(Failure { phase, error: error.into() });
    }

    /// Record the error of `result`, if any
    pub fn record<T, E: Into<BenchError>>(&mut self, phase: Phase, result: std::result::Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(phase, e);
                None
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Failure> {
        self.0.iter()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.0.iter().map(|f| f.phase).collect()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> std::result::Result<(), Failures> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "no errors occurred"),
            1 => write!(f, "1 error occurred:\n\t* {}", self.0[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for failure in &self.0 {
                    write!(f, "\n\t* {}", failure)?;
                }
                Ok(())
            },
        }
    }
}

impl std::error::Error for Failures {}

impl IntoIterator for Failures {
    type Item = Failure;
    type IntoIter = std::vec::IntoIter<Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Failures {
    type Item = &'a Failure;
    type IntoIter = std::slice::Iter<'a, Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_failures() {
        let failures = Failures::new();
        assert!(failures.is_empty());
        assert_eq!(failures.to_string(), "no errors occurred");
        assert!(failures.into_result().is_ok());
    }

    #[test]
    fn test_failures_keep_order() {
        let mut failures = Failures::new();
        failures.push(Phase::Run, StoreError::TableNotFound("warzone".to_string()));
        assert_eq!(failures.record::<(), _>(Phase::Close, Err(StoreError::Closed)), None);
        assert_eq!(failures.record::<u8, StoreError>(Phase::Cleanup, Ok(3)), Some(3));

        assert_eq!(failures.len(), 2);
        assert_eq!(failures.phases(), vec![Phase::Run, Phase::Close]);
        assert_eq!(
            failures.to_string(),
            "2 errors occurred:\n\t* run: Table not found: warzone\n\t* close: Database is closed"
        );
        assert!(failures.into_result().is_err());
    }

    #[test]
    fn test_rollback_failure_message() {
        let err = BenchError::RollbackFailed {
            source: StoreError::TableNotFound("warzone".to_string()),
            rollback: StoreError::Closed,
        };
        assert_eq!(err.to_string(), "cannot rollback: Database is closed, base error: Table not found: warzone");
    }
}
