//! Re-entrant monitor state carried by every heap object.

use crate::thread::ThreadId;

/// Unlock attempted by a thread that does not own the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotOwner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockState {
    owner: Option<ThreadId>,
    count: u32,
}

impl LockState {
    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    #[inline]
    pub fn is_locked_by(&self, tid: ThreadId) -> bool {
        self.owner == Some(tid)
    }

    /// Free, or already held by `tid`.
    #[inline]
    pub fn can_lock(&self, tid: ThreadId) -> bool {
        self.owner.map_or(true, |o| o == tid)
    }

    /// Acquire or re-enter. Returns false when another thread holds it.
    pub fn lock(&mut self, tid: ThreadId) -> bool {
        if !self.can_lock(tid) {
            return false;
        }
        self.owner = Some(tid);
        self.count += 1;
        true
    }

    /// Release one level. `Ok(true)` once the lock is free again;
    /// `Err(NotOwner)` when `tid` does not own it.
    pub fn unlock(&mut self, tid: ThreadId) -> Result<bool, NotOwner> {
        if !self.is_locked_by(tid) {
            return Err(NotOwner);
        }
        self.count -= 1;
        if self.count == 0 {
            self.owner = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
