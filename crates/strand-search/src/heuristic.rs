//! Best-first search over open choices.
//!
//! Every choice of an expanded choice point becomes a queue entry holding
//! the state in front of the choice point. The entry with the lowest
//! priority runs next; entries with equal priority run in the order they
//! were queued.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use strand_vm::{Choice, ChoiceGenerator, Vm, VmSnapshot};

use crate::driver::{SearchCore, SearchStrategy};
use crate::types::SearchError;

pub trait Heuristic {
    fn name(&self) -> &'static str;

    /// Priority of taking `choice` from the state `vm` is in. Lower runs
    /// first.
    fn priority(&mut self, vm: &Vm, cg: &ChoiceGenerator, choice: Choice) -> i64;
}

/// Shallower states first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirst;

impl Heuristic for BreadthFirst {
    fn name(&self) -> &'static str {
        "bfs"
    }

    fn priority(&mut self, vm: &Vm, _cg: &ChoiceGenerator, _choice: Choice) -> i64 {
        vm.path_length() as i64
    }
}

/// Paths with more context switches first. The priority is the number of
/// scheduling choices on the path that kept the running thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferThreadSwitch;

impl PreferThreadSwitch {
    fn kept_thread(vm: &Vm) -> i64 {
        let mut last = None;
        let mut kept = 0;
        for rec in vm.trail() {
            if let Choice::Thread(t) = rec.choice {
                if last == Some(t) {
                    kept += 1;
                }
                last = Some(t);
            }
        }
        kept
    }
}

impl Heuristic for PreferThreadSwitch {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn priority(&mut self, vm: &Vm, _cg: &ChoiceGenerator, choice: Choice) -> i64 {
        let keeps = match choice {
            Choice::Thread(t) => i64::from(t == vm.current_thread()),
            _ => 0,
        };
        Self::kept_thread(vm) + keeps
    }
}

struct Node {
    priority: i64,
    seq: u64,
    snapshot: Rc<VmSnapshot>,
    cg: ChoiceGenerator,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    // BinaryHeap pops the greatest; reverse so the lowest priority and
    // then the oldest entry win.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct HeuristicSearch<H> {
    heuristic: H,
    queue: BinaryHeap<Node>,
    seq: u64,
}

impl<H: Heuristic> HeuristicSearch<H> {
    pub fn new(heuristic: H) -> Self {
        Self {
            heuristic,
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Queue one entry per choice of `cg`, which is pending in the current
    /// state.
    fn expand(&mut self, core: &SearchCore, cg: ChoiceGenerator) -> Result<(), SearchError> {
        if cg.total_choices() == 0 {
            return Err(SearchError::EmptyChoice(cg.id().to_string()));
        }
        let snapshot = Rc::new(core.snapshot());
        for i in 0..cg.total_choices() {
            let mut entry = cg.clone();
            let Some(choice) = entry.select(i) else {
                continue;
            };
            let priority = self.heuristic.priority(core.vm(), &entry, choice);
            self.queue.push(Node {
                priority,
                seq: self.seq,
                snapshot: Rc::clone(&snapshot),
                cg: entry,
            });
            self.seq += 1;
        }
        Ok(())
    }
}

impl<H: Heuristic> SearchStrategy for HeuristicSearch<H> {
    fn name(&self) -> &'static str {
        self.heuristic.name()
    }

    fn search(&mut self, core: &mut SearchCore) -> Result<(), SearchError> {
        let max_depth = core.max_depth();
        let Some(root) = core.take_choice_point() else {
            core.check_properties();
            core.path_finished();
            return Ok(());
        };
        core.visit(&root);
        self.expand(core, root)?;

        // The interpreter sits in front of the root choice point until the
        // first entry has run.
        let mut at_root = true;
        while let Some(node) = self.queue.pop() {
            if core.is_done() {
                break;
            }
            if !at_root {
                core.restore(&node.snapshot);
            }
            at_root = false;
            core.forward(&node.cg)?;

            if core.check_properties() && core.is_done() {
                core.path_finished();
                break;
            }
            if core.depth() >= max_depth {
                if core.vm().has_pending_choice() {
                    core.constraint_hit("depth limit");
                }
                core.path_finished();
                continue;
            }
            match core.take_choice_point() {
                Some(next) => {
                    if core.visit(&next) {
                        self.expand(core, next)?;
                    }
                }
                None => core.path_finished(),
            }
        }
        self.queue.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(priority: i64, seq: u64, snapshot: &Rc<VmSnapshot>) -> Node {
        Node {
            priority,
            seq,
            snapshot: Rc::clone(snapshot),
            cg: ChoiceGenerator::new("n", strand_vm::ChoiceDomain::Bool),
        }
    }

    #[test]
    fn test_queue_order() {
        let vm = Vm::new(
            std::sync::Arc::new(strand_vm::Program::new()),
            strand_vm::VmConfig::default(),
        );
        let snap = Rc::new(vm.snapshot());
        let mut heap = BinaryHeap::new();
        heap.push(node(2, 0, &snap));
        heap.push(node(1, 1, &snap));
        heap.push(node(2, 2, &snap));
        heap.push(node(1, 3, &snap));
        let order: Vec<(i64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|n| (n.priority, n.seq))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 3), (2, 0), (2, 2)]);
    }
}
