//! Heap footprint sampling.

use std::cell::RefCell;
use std::rc::Rc;

use crate::listener::{SearchContext, SearchListener};

/// Heap sizes recorded by a `FootprintMonitor`, readable after the monitor
/// was handed to the search.
#[derive(Debug, Clone, Default)]
pub struct FootprintSamples(Rc<RefCell<Vec<usize>>>);

impl FootprintSamples {
    pub fn to_vec(&self) -> Vec<usize> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn max(&self) -> Option<usize> {
        self.0.borrow().iter().copied().max()
    }

    pub fn average(&self) -> Option<f64> {
        let samples = self.0.borrow();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<usize>() as f64 / samples.len() as f64)
    }

    fn push(&self, v: usize) {
        self.0.borrow_mut().push(v);
    }
}

/// Records the number of live heap objects every `interval` transitions
/// and logs a summary when the search ends.
#[derive(Debug)]
pub struct FootprintMonitor {
    interval: usize,
    seen: usize,
    samples: FootprintSamples,
}

impl FootprintMonitor {
    /// An interval of 0 is treated as 1.
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            seen: 0,
            samples: FootprintSamples::default(),
        }
    }

    pub fn samples(&self) -> FootprintSamples {
        self.samples.clone()
    }
}

impl SearchListener for FootprintMonitor {
    fn state_advanced(&mut self, ctx: &SearchContext) {
        self.seen += 1;
        if self.seen % self.interval == 0 {
            self.samples.push(ctx.vm.kernel().heap.len());
        }
    }

    fn search_finished(&mut self, _ctx: &SearchContext) {
        match (self.samples.average(), self.samples.max()) {
            (Some(avg), Some(max)) => tracing::info!(
                samples = self.samples.len(),
                average = %format!("{:.1}", avg),
                max,
                "heap footprint"
            ),
            _ => tracing::info!("heap footprint: no samples"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        let s = FootprintSamples::default();
        assert_eq!(s.average(), None);
        s.push(2);
        s.push(4);
        s.push(9);
        assert_eq!(s.average(), Some(5.0));
        assert_eq!(s.max(), Some(9));
        assert_eq!(s.len(), 3);
    }
}
