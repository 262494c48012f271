//! Random path sampling.
//!
//! Every path starts at the initial state and takes one random choice at
//! each choice point until the program ends or the depth limit is reached.
//! Then the initial state is restored and the next path begins. No state is
//! stored besides the initial one.

use crate::driver::{SearchCore, SearchStrategy};
use crate::types::SearchError;

#[derive(Debug, Default)]
pub struct RandomSearch;

impl RandomSearch {
    pub fn new() -> Self {
        Self
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn search(&mut self, core: &mut SearchCore) -> Result<(), SearchError> {
        let mut rng = core.config().rng();
        let max_depth = core.max_depth();
        let path_limit = core.config().path_limit;
        let init = core.snapshot();
        let Some(root) = core.take_choice_point() else {
            core.check_properties();
            core.path_finished();
            return Ok(());
        };

        let mut cg = root.clone();
        loop {
            if cg.select_random(&mut rng).is_none() {
                return Err(SearchError::EmptyChoice(cg.id().to_string()));
            }
            core.forward(&cg)?;
            core.check_properties();

            let next = if core.is_done() {
                None
            } else if core.depth() >= max_depth {
                if core.vm().has_pending_choice() {
                    core.constraint_hit("depth limit");
                }
                None
            } else {
                core.take_choice_point()
            };
            if let Some(next) = next {
                cg = next;
                continue;
            }

            core.path_finished();
            if core.is_done() || core.stats().paths > path_limit {
                return Ok(());
            }
            core.restore(&init);
            cg = root.clone();
        }
    }
}
