//! Mutable interpreter state: heap, threads and class initialization.
//!
//! `KernelState` is everything a snapshot has to copy. It owns no
//! reference to the program; ids index into the `Program` tables.

use core::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::bytecode::{builtin, ClassId, Program};
use crate::heap::{Heap, HeapObject, ObjRef};
use crate::lock::NotOwner;
use crate::thread::{ThreadId, ThreadInfo, ThreadStatus};
use crate::vm::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassStatus {
    Uninitialized,
    /// `<clinit>` is running on this thread.
    Initializing(ThreadId),
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassRuntime {
    pub status: ClassStatus,
    pub class_obj: ObjRef,
}

/// Result of releasing one monitor level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlocked {
    StillHeld,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelState {
    pub heap: Heap,
    pub threads: Vec<ThreadInfo>,
    pub classes: Vec<ClassRuntime>,
}

impl KernelState {
    /// Fresh state with one class object per loaded class.
    pub fn new(program: &Program) -> Self {
        let mut heap = Heap::new();
        let class_class = program.class_id(builtin::CLASS).unwrap_or(ClassId(0));
        let classes = program
            .classes()
            .map(|ci| ClassRuntime {
                status: ClassStatus::Uninitialized,
                class_obj: heap.alloc_class_object(class_class, ci.id, ci.static_fields().len()),
            })
            .collect();
        Self {
            heap,
            threads: Vec::new(),
            classes,
        }
    }

    // =========================================================================
    // Threads
    // =========================================================================

    #[inline]
    pub fn thread(&self, tid: ThreadId) -> Result<&ThreadInfo, VmError> {
        self.threads.get(tid.index()).ok_or(VmError::NoSuchThread(tid))
    }

    #[inline]
    pub fn thread_mut(&mut self, tid: ThreadId) -> Result<&mut ThreadInfo, VmError> {
        self.threads
            .get_mut(tid.index())
            .ok_or(VmError::NoSuchThread(tid))
    }

    pub fn add_thread(&mut self, thread_obj: ObjRef) -> ThreadId {
        let tid = ThreadId(self.threads.len() as u32);
        self.threads.push(ThreadInfo::new(tid, thread_obj));
        tid
    }

    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_runnable())
            .map(ThreadInfo::id)
            .collect()
    }

    pub fn has_other_runnable(&self, tid: ThreadId) -> bool {
        self.threads.iter().any(|t| t.id() != tid && t.is_runnable())
    }

    pub fn alive_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_alive()).count()
    }

    /// Every thread has terminated.
    pub fn is_end_state(&self) -> bool {
        !self.threads.is_empty() && self.alive_count() == 0
    }

    /// Live threads exist but none can run.
    pub fn is_deadlocked(&self) -> bool {
        self.alive_count() > 0 && self.runnable_threads().is_empty()
    }

    pub fn thread_of_object(&self, thread_obj: ObjRef) -> Option<ThreadId> {
        self.threads
            .iter()
            .find(|t| t.thread_obj() == thread_obj)
            .map(ThreadInfo::id)
    }

    /// Is any thread other than `tid` blocked on `obj`?
    pub fn has_blocked_on(&self, obj: ObjRef, tid: ThreadId) -> bool {
        self.threads
            .iter()
            .any(|t| t.id() != tid && t.status() == ThreadStatus::Blocked(obj))
    }

    /// Make threads blocked on `obj` runnable again; they retry their
    /// acquiring instruction.
    pub fn wake_blocked_on(&mut self, obj: ObjRef) -> usize {
        let mut n = 0;
        for t in self.threads.iter_mut() {
            if t.status() == ThreadStatus::Blocked(obj) {
                t.set_status(ThreadStatus::Runnable);
                n += 1;
            }
        }
        n
    }

    pub fn wake_joiners(&mut self, terminated: ThreadId) -> usize {
        let mut n = 0;
        for t in self.threads.iter_mut() {
            if t.status() == ThreadStatus::Joining(terminated) {
                t.set_status(ThreadStatus::Runnable);
                n += 1;
            }
        }
        n
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub fn class_runtime(&self, class: ClassId) -> Result<&ClassRuntime, VmError> {
        self.classes
            .get(class.index())
            .ok_or(VmError::NoSuchClassId(class))
    }

    pub fn class_status(&self, class: ClassId) -> Result<ClassStatus, VmError> {
        Ok(self.class_runtime(class)?.status)
    }

    pub fn set_class_status(&mut self, class: ClassId, status: ClassStatus) -> Result<(), VmError> {
        self.classes
            .get_mut(class.index())
            .ok_or(VmError::NoSuchClassId(class))?
            .status = status;
        Ok(())
    }

    pub fn class_object(&self, class: ClassId) -> Result<ObjRef, VmError> {
        Ok(self.class_runtime(class)?.class_obj)
    }

    // =========================================================================
    // Objects and monitors
    // =========================================================================

    pub fn object(&self, r: ObjRef) -> Result<&HeapObject, VmError> {
        self.heap.get(r).ok_or(VmError::DanglingReference(r))
    }

    pub fn object_mut(&mut self, r: ObjRef) -> Result<&mut HeapObject, VmError> {
        self.heap.get_mut(r).ok_or(VmError::DanglingReference(r))
    }

    pub fn can_lock(&self, obj: ObjRef, tid: ThreadId) -> Result<bool, VmError> {
        Ok(self.object(obj)?.lock.can_lock(tid))
    }

    /// Acquire or re-enter; false when another thread owns the monitor.
    pub fn lock_object(&mut self, obj: ObjRef, tid: ThreadId) -> Result<bool, VmError> {
        Ok(self.object_mut(obj)?.lock.lock(tid))
    }

    pub fn unlock_object(&mut self, obj: ObjRef, tid: ThreadId) -> Result<Result<Unlocked, NotOwner>, VmError> {
        Ok(self.object_mut(obj)?.lock.unlock(tid).map(|free| {
            if free {
                Unlocked::Released
            } else {
                Unlocked::StillHeld
            }
        }))
    }

    /// Record that `obj` is reachable from other threads.
    pub fn mark_shared(&mut self, obj: ObjRef) {
        if let Some(o) = self.heap.get_mut(obj) {
            o.shared = true;
        }
    }

    /// Hash of the observable state, used for state matching.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_objects_allocated_up_front() {
        let program = Program::new();
        let k = KernelState::new(&program);
        assert_eq!(k.classes.len(), program.class_count());
        assert_eq!(k.heap.len(), program.class_count());
        let object = program.class_id(builtin::OBJECT).unwrap();
        assert_eq!(k.class_status(object).unwrap(), ClassStatus::Uninitialized);
        assert!(!k.class_object(object).unwrap().is_null());
    }

    #[test]
    fn test_end_state_and_deadlock() {
        let program = Program::new();
        let mut k = KernelState::new(&program);
        assert!(!k.is_end_state());
        let t0 = k.add_thread(ObjRef::NULL);
        let t1 = k.add_thread(ObjRef::NULL);
        let obj = k.class_object(ClassId(0)).unwrap();

        k.thread_mut(t0).unwrap().set_status(ThreadStatus::Blocked(obj));
        k.thread_mut(t1).unwrap().set_status(ThreadStatus::Joining(t0));
        assert!(k.is_deadlocked());
        assert!(k.has_blocked_on(obj, t1));
        assert!(!k.has_blocked_on(obj, t0));

        assert_eq!(k.wake_blocked_on(obj), 1);
        assert!(!k.is_deadlocked());
        k.thread_mut(t0).unwrap().terminate();
        assert_eq!(k.wake_joiners(t0), 1);
        k.thread_mut(t1).unwrap().terminate();
        assert!(k.is_end_state());
    }

    #[test]
    fn test_monitor_helpers() {
        let program = Program::new();
        let mut k = KernelState::new(&program);
        let obj = k.class_object(ClassId(1)).unwrap();
        let (a, b) = (ThreadId(0), ThreadId(1));
        assert!(k.lock_object(obj, a).unwrap());
        assert!(!k.lock_object(obj, b).unwrap());
        assert!(!k.can_lock(obj, b).unwrap());
        assert_eq!(k.unlock_object(obj, b).unwrap(), Err(NotOwner));
        assert_eq!(k.unlock_object(obj, a).unwrap(), Ok(Unlocked::Released));
        assert!(matches!(k.lock_object(ObjRef(999), a), Err(VmError::DanglingReference(_))));
    }

    #[test]
    fn test_fingerprint_tracks_state() {
        let program = Program::new();
        let mut k = KernelState::new(&program);
        let before = k.fingerprint();
        assert_eq!(before, k.clone().fingerprint());
        k.mark_shared(ObjRef(1));
        let obj = k.heap.alloc_instance(ClassId(0), 1, ThreadId::MAIN);
        assert!(!obj.is_null());
        assert_ne!(before, k.fingerprint());
    }
}
