//! Restorable copies of the interpreter state.

use crate::kernel::KernelState;
use crate::vm::SystemState;

/// Owned deep copy of everything a transition can change. Opaque to its
/// holders; only `Vm::restore` reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct VmSnapshot {
    pub(super) kernel: KernelState,
    pub(super) system: SystemState,
}

impl VmSnapshot {
    /// Path length at the time the snapshot was taken.
    pub fn path_length(&self) -> usize {
        self.system.path_length()
    }

    /// Fingerprint of the program state this snapshot holds.
    pub fn fingerprint(&self) -> u64 {
        self.kernel.fingerprint()
    }
}
