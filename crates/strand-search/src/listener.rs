//! Search notifications.
//!
//! Listeners see the interpreter and the counters through a shared
//! context; they cannot drive the search or change interpreter state.

use strand_vm::Vm;

use crate::types::{SearchStats, Violation};

pub struct SearchContext<'a> {
    pub vm: &'a Vm,
    pub stats: &'a SearchStats,
    /// Path length of the current state.
    pub depth: usize,
}

#[allow(unused_variables)]
pub trait SearchListener {
    fn search_started(&mut self, ctx: &SearchContext) {}

    /// A transition completed and the interpreter is in a new state.
    fn state_advanced(&mut self, ctx: &SearchContext) {}

    /// Returned to the state in front of an open choice point.
    fn state_backtracked(&mut self, ctx: &SearchContext) {}

    /// Jumped to a stored state that is not an ancestor of the current one.
    fn state_restored(&mut self, ctx: &SearchContext) {}

    fn property_violated(&mut self, ctx: &SearchContext, violation: &Violation) {}

    fn search_constraint_hit(&mut self, ctx: &SearchContext, constraint: &str) {}

    fn search_finished(&mut self, ctx: &SearchContext) {}
}
