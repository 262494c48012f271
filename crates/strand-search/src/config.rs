//! Search configuration.

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchConfig {
    /// Choices a path may take beyond the path length the search starts
    /// from (0 = unlimited).
    pub depth_limit: usize,
    /// Paths a sampling search runs after the first one.
    pub path_limit: usize,
    /// End the search at the first property violation.
    pub stop_on_first_error: bool,
    /// Do not expand a choice point whose state was already expanded.
    pub state_matching: bool,
    /// Seed for random choice selection; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth_limit: 0,
            path_limit: 0,
            stop_on_first_error: true,
            state_matching: true,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}
