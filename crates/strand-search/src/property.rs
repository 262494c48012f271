//! Properties checked after every transition.

use strand_vm::Vm;

pub trait Property {
    fn name(&self) -> &str;

    /// Describe the violation in the current state, if any.
    fn check(&mut self, vm: &Vm) -> Option<String>;
}

/// No thread may terminate through an exception.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUncaughtExceptions;

impl Property for NoUncaughtExceptions {
    fn name(&self) -> &str {
        "no-uncaught-exceptions"
    }

    fn check(&mut self, vm: &Vm) -> Option<String> {
        vm.uncaught_exception().map(|e| format!("uncaught {}", e))
    }
}

/// Some live thread must be able to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotDeadlocked;

impl Property for NotDeadlocked {
    fn name(&self) -> &str {
        "not-deadlocked"
    }

    fn check(&mut self, vm: &Vm) -> Option<String> {
        if !vm.is_deadlocked() {
            return None;
        }
        let blocked: Vec<String> = vm
            .kernel()
            .threads
            .iter()
            .filter(|t| t.is_alive())
            .map(|t| format!("{} {:?}", t.id(), t.status()))
            .collect();
        Some(format!("deadlock: {}", blocked.join(", ")))
    }
}

/// The properties every search checks unless told otherwise.
pub fn default_properties() -> Vec<Box<dyn Property>> {
    vec![Box::new(NoUncaughtExceptions), Box::new(NotDeadlocked)]
}
