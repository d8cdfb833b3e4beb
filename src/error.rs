//! The crate-wide error taxonomy. C1/C2 problems are fatal and surface
//! immediately; C4 failures are internal and only become visible here once
//! the retry supervisor has exhausted its own budget.

use crate::backtracking_search::Statistics;
use thiserror::Error;

/// Terminal report attached to solver failures: the statistics of the last
/// attempt plus a one-line narrative of the final configuration tried and
/// why the solve stopped.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub statistics: Statistics,
    pub narrative: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("corpus missing or empty: {0}")]
    CorpusMissing(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("no solution found: {}", .0.narrative)]
    NoSolution(Box<FailureReport>),

    #[error("time budget exceeded: {}", .0.narrative)]
    TimeBudgetExceeded(Box<FailureReport>),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl Error {
    /// The statistics of the final solve attempt, for failures that carry
    /// them.
    #[must_use]
    pub fn statistics(&self) -> Option<&Statistics> {
        match self {
            Error::NoSolution(report) | Error::TimeBudgetExceeded(report) => {
                Some(&report.statistics)
            }
            _ => None,
        }
    }
}
