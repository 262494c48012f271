//! Interpreter bookkeeping that is not part of the program state proper.

use std::sync::Arc;

use crate::choice::Choice;
use crate::thread::ThreadId;
use crate::vm::UncaughtException;

/// One taken choice on the current path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRecord {
    pub cg_id: Arc<str>,
    pub choice: Choice,
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemState {
    pub current_thread: ThreadId,
    /// Data choice waiting to be consumed by a nondeterministic source.
    pub current_choice: Option<Choice>,
    /// Choices taken since `start`, oldest first.
    pub trail: Vec<ChoiceRecord>,
    /// Exception that escaped a thread during the last transition.
    pub uncaught: Option<UncaughtException>,
    pub started: bool,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            current_thread: ThreadId::MAIN,
            current_choice: None,
            trail: Vec::new(),
            uncaught: None,
            started: false,
        }
    }
}

impl SystemState {
    #[inline]
    pub fn path_length(&self) -> usize {
        self.trail.len()
    }
}
