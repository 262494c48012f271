//! Exhaustive depth-first search.

use strand_vm::{ChoiceGenerator, VmSnapshot};

use crate::driver::{SearchCore, SearchStrategy};
use crate::types::SearchError;

/// An expanded choice point on the current path.
struct Frame {
    /// State in front of the choice point.
    snapshot: VmSnapshot,
    cg: ChoiceGenerator,
    /// No choice of `cg` has run yet, so the interpreter is still at
    /// `snapshot`.
    fresh: bool,
}

/// Tries every choice of every reachable choice point, backtracking to the
/// nearest choice point with untried choices when a path ends. With state
/// matching a choice point is expanded only the first time its state is
/// reached.
#[derive(Debug, Default)]
pub struct DfsSearch;

impl DfsSearch {
    pub fn new() -> Self {
        Self
    }
}

impl SearchStrategy for DfsSearch {
    fn name(&self) -> &'static str {
        "dfs"
    }

    fn search(&mut self, core: &mut SearchCore) -> Result<(), SearchError> {
        let max_depth = core.max_depth();
        let Some(root) = core.take_choice_point() else {
            core.check_properties();
            core.path_finished();
            return Ok(());
        };
        core.visit(&root);
        let mut stack = vec![Frame {
            snapshot: core.snapshot(),
            cg: root,
            fresh: true,
        }];

        while !core.is_done() {
            let Some(top) = stack.last_mut() else {
                break;
            };
            if top.cg.advance().is_none() {
                if top.cg.total_choices() == 0 {
                    return Err(SearchError::EmptyChoice(top.cg.id().to_string()));
                }
                stack.pop();
                continue;
            }
            if top.fresh {
                top.fresh = false;
            } else {
                core.backtrack(&top.snapshot);
            }
            core.forward(&top.cg)?;

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
                        stack.push(Frame {
                            snapshot: core.snapshot(),
                            cg: next,
                            fresh: true,
                        });
                    }
                }
                None => core.path_finished(),
            }
        }
        Ok(())
    }
}
