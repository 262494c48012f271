//! Primitives shared by every search strategy.
//!
//! `SearchCore` owns the interpreter and is the only component that moves
//! choice-generator cursors, takes snapshots and restores them. Strategies
//! decide the order in which open choices are tried and when a path ends.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};
use strand_vm::{ChoiceGenerator, TransitionEnd, Vm, VmSnapshot};

use crate::config::SearchConfig;
use crate::listener::{SearchContext, SearchListener};
use crate::property::{self, Property};
use crate::types::{SearchError, SearchReport, SearchStats, Violation};

/// How a search picks the next choice to try.
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    fn search(&mut self, core: &mut SearchCore) -> Result<(), SearchError>;
}

pub struct SearchCore {
    vm: Vm,
    config: SearchConfig,
    properties: Vec<Box<dyn Property>>,
    listeners: Vec<Box<dyn SearchListener>>,
    violations: Vec<Violation>,
    stats: SearchStats,
    visited: FxHashSet<u64>,
    /// Transition count at the last property check.
    checked_at: Option<usize>,
    done: bool,
}

impl SearchCore {
    /// Core checking the default properties.
    pub fn new(vm: Vm, config: SearchConfig) -> Self {
        Self {
            vm,
            config,
            properties: property::default_properties(),
            listeners: Vec::new(),
            violations: Vec::new(),
            stats: SearchStats::default(),
            visited: FxHashSet::default(),
            checked_at: None,
            done: false,
        }
    }

    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    pub fn add_property(&mut self, property: Box<dyn Property>) {
        self.properties.push(property);
    }

    pub fn add_listener(&mut self, listener: Box<dyn SearchListener>) {
        self.listeners.push(listener);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn into_vm(self) -> Vm {
        self.vm
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Path length of the current state.
    #[inline]
    pub fn depth(&self) -> usize {
        self.vm.path_length()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn set_done(&mut self) {
        self.done = true;
    }

    /// Deepest path length a path may reach: the depth limit counted from
    /// the path length the search starts at.
    pub fn max_depth(&self) -> usize {
        match self.config.depth_limit {
            0 => usize::MAX,
            limit => limit.saturating_add(self.vm.path_length()),
        }
    }

    // =========================================================================
    // Running a strategy
    // =========================================================================

    pub fn run(&mut self, strategy: &mut dyn SearchStrategy) -> Result<SearchReport, SearchError> {
        if !self.vm.is_started() {
            return Err(SearchError::NotStarted);
        }
        tracing::info!(strategy = strategy.name(), "search started");
        self.notify(|l, ctx| l.search_started(ctx));

        let result = strategy.search(self);

        self.notify(|l, ctx| l.search_finished(ctx));
        tracing::info!(
            strategy = strategy.name(),
            transitions = self.stats.transitions,
            paths = self.stats.paths,
            violations = self.violations.len(),
            "search finished"
        );
        result?;
        Ok(SearchReport {
            strategy: strategy.name(),
            stats: self.stats.clone(),
            violations: self.violations.clone(),
        })
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Hand out the interpreter's pending choice generator.
    pub fn take_choice_point(&mut self) -> Option<ChoiceGenerator> {
        self.vm.take_pending_choice()
    }

    /// Run the transition for the current choice of `cg`.
    pub fn forward(&mut self, cg: &ChoiceGenerator) -> Result<TransitionEnd, SearchError> {
        let end = self.vm.execute_transition(cg)?;
        self.stats.transitions += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.vm.path_length());
        if end == TransitionEnd::EndState {
            self.stats.end_states += 1;
        }
        self.notify(|l, ctx| l.state_advanced(ctx));
        Ok(end)
    }

    pub fn snapshot(&self) -> VmSnapshot {
        self.vm.snapshot()
    }

    /// Return to an ancestor of the current state.
    pub fn backtrack(&mut self, snapshot: &VmSnapshot) {
        self.vm.restore(snapshot);
        self.stats.backtracks += 1;
        tracing::debug!(depth = self.vm.path_length(), "backtrack");
        self.notify(|l, ctx| l.state_backtracked(ctx));
    }

    /// Jump to a stored state elsewhere in the tree.
    pub fn restore(&mut self, snapshot: &VmSnapshot) {
        self.vm.restore(snapshot);
        self.stats.restores += 1;
        self.notify(|l, ctx| l.state_restored(ctx));
    }

    /// Record the current state, with `cg` pending in it, as expanded.
    /// Returns false if state matching is on and the pair was expanded
    /// before.
    pub fn visit(&mut self, cg: &ChoiceGenerator) -> bool {
        if !self.config.state_matching {
            self.stats.new_states += 1;
            return true;
        }
        if self.visited.insert(self.state_key(cg)) {
            self.stats.new_states += 1;
            true
        } else {
            self.stats.revisited_states += 1;
            false
        }
    }

    /// The heap and threads alone do not tell choice points apart: a
    /// forced thread switch in front of a nondeterministic call leaves
    /// them exactly as the data choice of that call finds them.
    fn state_key(&self, cg: &ChoiceGenerator) -> u64 {
        let mut hasher = FxHasher::default();
        self.vm.fingerprint().hash(&mut hasher);
        self.vm.current_thread().hash(&mut hasher);
        cg.id().hash(&mut hasher);
        cg.domain().hash(&mut hasher);
        hasher.finish()
    }

    pub fn path_finished(&mut self) {
        self.stats.paths += 1;
    }

    pub fn constraint_hit(&mut self, constraint: &str) {
        self.stats.constraint_hits += 1;
        tracing::debug!(constraint, depth = self.vm.path_length(), "search constraint hit");
        self.notify(|l, ctx| l.search_constraint_hit(ctx, constraint));
    }

    /// Check every property against the current state. Each state is
    /// checked once; returns true if a property failed. With
    /// `stop_on_first_error` a failure also ends the search.
    pub fn check_properties(&mut self) -> bool {
        if self.checked_at == Some(self.stats.transitions) {
            return false;
        }
        self.checked_at = Some(self.stats.transitions);

        let mut found = Vec::new();
        for p in self.properties.iter_mut() {
            if let Some(message) = p.check(&self.vm) {
                found.push(Violation {
                    property: p.name().to_string(),
                    message,
                    trail: self.vm.trail().to_vec(),
                });
            }
        }
        if found.is_empty() {
            return false;
        }
        for violation in found {
            tracing::warn!(%violation, "property violated");
            self.notify(|l, ctx| l.property_violated(ctx, &violation));
            self.violations.push(violation);
        }
        if self.config.stop_on_first_error {
            self.done = true;
        }
        true
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn SearchListener, &SearchContext)) {
        if self.listeners.is_empty() {
            return;
        }
        let ctx = SearchContext {
            vm: &self.vm,
            stats: &self.stats,
            depth: self.vm.path_length(),
        };
        for l in self.listeners.iter_mut() {
            f(l.as_mut(), &ctx);
        }
    }
}
