//! Search results and errors.

use core::fmt;

use strand_vm::{ChoiceRecord, VmError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Vm(#[from] VmError),

    #[error("the VM must be started before a search")]
    NotStarted,

    #[error("choice generator {0} has no choices")]
    EmptyChoice(String),
}

/// Counters kept by the search core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchStats {
    /// Transitions executed.
    pub transitions: usize,
    /// Choice points expanded for the first time.
    pub new_states: usize,
    /// Choice points skipped because their state was seen before.
    pub revisited_states: usize,
    /// States in which every thread had terminated.
    pub end_states: usize,
    pub paths: usize,
    pub backtracks: usize,
    pub restores: usize,
    pub constraint_hits: usize,
    pub max_depth: usize,
}

/// A property that failed, with the choices that led there.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub property: String,
    pub message: String,
    pub trail: Vec<ChoiceRecord>,
}

impl Violation {
    #[inline]
    pub fn depth(&self) -> usize {
        self.trail.len()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (depth {})", self.property, self.message, self.depth())
    }
}

#[derive(Debug, Clone)]
pub struct SearchReport {
    pub strategy: &'static str,
    pub stats: SearchStats,
    pub violations: Vec<Violation>,
}

impl SearchReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}
