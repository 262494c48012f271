//! Threads and stack frames.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::heap::ObjRef;
use crate::instruction::{Instruction, ProgramPoint};
use crate::method::{MethodId, MethodInfo};
use crate::vm::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const MAIN: Self = Self(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    Runnable,
    /// Waiting to acquire the monitor of this object.
    Blocked(ObjRef),
    /// Waiting for the given thread to terminate.
    Joining(ThreadId),
    Terminated,
}

// =============================================================================
// StackFrame
// =============================================================================

/// One method activation.
///
/// Every slot is a `u64`. Ints are stored sign-extended; longs and doubles
/// take a value slot followed by a zero padding slot, both on the operand
/// stack and in locals.
#[derive(Debug, Clone)]
pub struct StackFrame {
    method: Arc<MethodInfo>,
    pub pc: u32,
    pub locals: Vec<u64>,
    pub operands: Vec<u64>,
    pub this_ref: ObjRef,
}

impl StackFrame {
    pub fn new(method: Arc<MethodInfo>, this_ref: ObjRef) -> Self {
        let locals = vec![0; method.max_locals() as usize];
        let operands = Vec::with_capacity(method.max_stack() as usize);
        Self {
            method,
            pc: 0,
            locals,
            operands,
            this_ref,
        }
    }

    #[inline]
    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    #[inline]
    pub fn point(&self) -> ProgramPoint {
        ProgramPoint {
            method: self.method.global_id(),
            index: self.pc,
        }
    }

    #[inline]
    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.method.instruction(self.pc as usize)
    }

    fn underflow(&self) -> VmError {
        VmError::StackUnderflow {
            method: self.method.full_name(),
        }
    }

    // === Operand stack ===

    #[inline]
    pub fn push(&mut self, v: u64) {
        self.operands.push(v);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<u64, VmError> {
        match self.operands.pop() {
            Some(v) => Ok(v),
            None => Err(self.underflow()),
        }
    }

    /// Slot `depth` below the top (0 = top).
    #[inline]
    pub fn peek(&self, depth: usize) -> Result<u64, VmError> {
        let len = self.operands.len();
        if depth < len {
            Ok(self.operands[len - 1 - depth])
        } else {
            Err(self.underflow())
        }
    }

    /// Pop `n` slots, returned in push order.
    pub fn pop_slots(&mut self, n: usize) -> Result<Vec<u64>, VmError> {
        let len = self.operands.len();
        if n > len {
            return Err(self.underflow());
        }
        Ok(self.operands.split_off(len - n))
    }

    #[inline]
    pub fn push_int(&mut self, v: i32) {
        self.push(v as i64 as u64);
    }

    #[inline]
    pub fn pop_int(&mut self) -> Result<i32, VmError> {
        Ok(self.pop()? as i32)
    }

    #[inline]
    pub fn peek_int(&self, depth: usize) -> Result<i32, VmError> {
        Ok(self.peek(depth)? as i32)
    }

    pub fn push_long(&mut self, v: i64) {
        self.push(v as u64);
        self.push(0);
    }

    pub fn pop_long(&mut self) -> Result<i64, VmError> {
        self.pop()?;
        Ok(self.pop()? as i64)
    }

    pub fn push_double(&mut self, v: f64) {
        self.push(v.to_bits());
        self.push(0);
    }

    pub fn pop_double(&mut self) -> Result<f64, VmError> {
        self.pop()?;
        Ok(f64::from_bits(self.pop()?))
    }

    #[inline]
    pub fn push_ref(&mut self, r: ObjRef) {
        self.push(r.to_slot());
    }

    #[inline]
    pub fn pop_ref(&mut self) -> Result<ObjRef, VmError> {
        Ok(ObjRef::from_slot(self.pop()?))
    }

    #[inline]
    pub fn peek_ref(&self, depth: usize) -> Result<ObjRef, VmError> {
        Ok(ObjRef::from_slot(self.peek(depth)?))
    }

    // === Locals ===

    #[inline]
    pub fn local(&self, slot: usize) -> Result<u64, VmError> {
        self.locals
            .get(slot)
            .copied()
            .ok_or_else(|| VmError::LocalOutOfRange {
                method: self.method.full_name(),
                slot,
            })
    }

    #[inline]
    pub fn set_local(&mut self, slot: usize, v: u64) -> Result<(), VmError> {
        match self.locals.get_mut(slot) {
            Some(l) => {
                *l = v;
                Ok(())
            }
            None => Err(VmError::LocalOutOfRange {
                method: self.method.full_name(),
                slot,
            }),
        }
    }

    pub fn set_local_wide(&mut self, slot: usize, v: u64) -> Result<(), VmError> {
        self.set_local(slot, v)?;
        self.set_local(slot + 1, 0)
    }
}

impl PartialEq for StackFrame {
    fn eq(&self, other: &Self) -> bool {
        self.method.global_id() == other.method.global_id()
            && self.method.unique_name() == other.method.unique_name()
            && self.pc == other.pc
            && self.locals == other.locals
            && self.operands == other.operands
            && self.this_ref == other.this_ref
    }
}

impl Eq for StackFrame {}

impl Hash for StackFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.global_id().hash(state);
        self.method.unique_name().hash(state);
        self.pc.hash(state);
        self.locals.hash(state);
        self.operands.hash(state);
        self.this_ref.hash(state);
    }
}

// =============================================================================
// ThreadInfo
// =============================================================================

/// Per-step scratch data, cleared before every step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecTransient {
    pub callee: Option<MethodId>,
    pub receiver: ObjRef,
    /// Result slots handed back by a popped direct-call stub.
    pub direct_call_result: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    id: ThreadId,
    status: ThreadStatus,
    frames: Vec<StackFrame>,
    thread_obj: ObjRef,
    next_pc: Option<ProgramPoint>,
    /// First step of a transition: the scheduling point for this
    /// instruction has already been taken.
    first_step: bool,
    transient: ExecTransient,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, thread_obj: ObjRef) -> Self {
        Self {
            id,
            status: ThreadStatus::Runnable,
            frames: Vec::new(),
            thread_obj,
            next_pc: None,
            first_step: true,
            transient: ExecTransient::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: ThreadStatus) {
        self.status = status;
    }

    #[inline]
    pub fn thread_obj(&self) -> ObjRef {
        self.thread_obj
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status == ThreadStatus::Runnable
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.status == ThreadStatus::Terminated
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.is_terminated()
    }

    pub fn terminate(&mut self) {
        self.status = ThreadStatus::Terminated;
        self.frames.clear();
        self.next_pc = None;
    }

    // === Frames ===

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    #[inline]
    pub fn count_stack_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    #[inline]
    pub fn top_frame(&self) -> Result<&StackFrame, VmError> {
        self.frames.last().ok_or(VmError::NoActiveFrame(self.id))
    }

    #[inline]
    pub fn top_frame_mut(&mut self) -> Result<&mut StackFrame, VmError> {
        self.frames.last_mut().ok_or(VmError::NoActiveFrame(self.id))
    }

    pub fn current_method(&self) -> Option<&Arc<MethodInfo>> {
        self.frames.last().map(StackFrame::method)
    }

    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.frames.last()?.current_instruction()
    }

    /// First frame executing `point`, skipping the `offset` topmost frames.
    pub fn stack_frame_executing(&self, point: ProgramPoint, offset: usize) -> Option<&StackFrame> {
        self.frames
            .iter()
            .rev()
            .skip(offset)
            .find(|f| f.point() == point)
    }

    // === Step bookkeeping ===

    #[inline]
    pub fn next_pc(&self) -> Option<ProgramPoint> {
        self.next_pc
    }

    /// Record where this thread continues after the step just executed.
    pub fn update_next_pc(&mut self) {
        self.next_pc = self.frames.last().map(StackFrame::point);
    }

    #[inline]
    pub fn is_first_step(&self) -> bool {
        self.first_step
    }

    #[inline]
    pub fn set_first_step(&mut self, on: bool) {
        self.first_step = on;
    }

    pub fn transient(&self) -> &ExecTransient {
        &self.transient
    }

    pub fn transient_mut(&mut self) -> &mut ExecTransient {
        &mut self.transient
    }

    pub fn cleanup_transients(&mut self) {
        self.transient = ExecTransient::default();
    }
}

impl Hash for ThreadInfo {
    // Scratch data is not part of the observable state.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.status.hash(state);
        self.frames.hash(state);
        self.thread_obj.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_common_core::Modifiers;

    fn frame(max_locals: u16) -> StackFrame {
        let mi = MethodInfo::new(None, "f", "()V", max_locals, 8, Modifiers::STATIC).unwrap();
        StackFrame::new(Arc::new(mi), ObjRef::NULL)
    }

    #[test]
    fn test_wide_values_take_two_slots() {
        let mut f = frame(0);
        f.push_int(-7);
        f.push_long(i64::MIN + 3);
        f.push_double(2.5);
        assert_eq!(f.operands.len(), 5);
        assert_eq!(f.pop_double().unwrap(), 2.5);
        assert_eq!(f.pop_long().unwrap(), i64::MIN + 3);
        assert_eq!(f.pop_int().unwrap(), -7);
        assert!(matches!(f.pop(), Err(VmError::StackUnderflow { .. })));
    }

    #[test]
    fn test_peek_and_pop_slots() {
        let mut f = frame(0);
        for v in 1..=4 {
            f.push(v);
        }
        assert_eq!(f.peek(0).unwrap(), 4);
        assert_eq!(f.peek(3).unwrap(), 1);
        assert!(f.peek(4).is_err());
        assert_eq!(f.pop_slots(3).unwrap(), vec![2, 3, 4]);
        assert!(f.pop_slots(2).is_err());
    }

    #[test]
    fn test_local_bounds() {
        let mut f = frame(2);
        f.set_local(1, 9).unwrap();
        assert_eq!(f.local(1).unwrap(), 9);
        assert!(matches!(f.set_local_wide(1, 3), Err(VmError::LocalOutOfRange { slot: 2, .. })));
        assert!(f.local(2).is_err());
    }

    #[test]
    fn test_thread_lifecycle() {
        let mut t = ThreadInfo::new(ThreadId(1), ObjRef(4));
        assert!(t.is_runnable());
        assert!(matches!(t.top_frame(), Err(VmError::NoActiveFrame(ThreadId(1)))));
        t.push_frame(frame(0));
        t.update_next_pc();
        assert!(t.next_pc().is_some());
        t.set_status(ThreadStatus::Blocked(ObjRef(2)));
        assert!(!t.is_runnable());
        t.terminate();
        assert!(t.is_terminated());
        assert_eq!(t.count_stack_frames(), 0);
        assert_eq!(t.next_pc(), None);
        assert_eq!(t.id().to_string(), "T1");
    }
}
