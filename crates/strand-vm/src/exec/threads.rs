//! Thread lifecycle: ThreadStart, ThreadJoin (ThreadYield only marks a
//! scheduling point and has no effect of its own).

use std::sync::Arc;

use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::instruction::Instruction;
use crate::thread::{StackFrame, ThreadStatus};
use crate::vm::{Flow, VmError, VmEvent};

/// Pops a thread object and starts it. The new thread's bottom frame is a
/// `[run]` stub with the thread object as the receiver of `run()`.
pub fn exec_start(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let program = ctx.program;
    let obj = ctx.frame_mut()?.pop_ref()?;
    if obj.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("starting null thread"));
    }
    if ctx.kernel.thread_of_object(obj).is_some() {
        return ctx.raise(builtin::ILLEGAL_THREAD_STATE, Some("thread already started"));
    }

    let class = ctx.kernel.object(obj)?.class;
    let run = program
        .find_method(class, "run()V")
        .ok_or_else(|| VmError::NoSuchMethod(format!("run()V of thread object {:?}", obj)))?;
    let stub = run.create_direct_call_stub("[run]", program.factory())?;
    let mut frame = StackFrame::new(Arc::new(stub), obj);
    frame.push_ref(obj);

    let started = ctx.kernel.add_thread(obj);
    ctx.kernel.mark_shared(obj);
    ctx.kernel.thread_mut(started)?.push_frame(frame);
    ctx.events.push(VmEvent::ThreadStarted(started));
    tracing::debug!(parent = %ctx.tid, thread = %started, "thread started");
    Ok(next(insn))
}

/// Waits for the thread object on the stack to terminate. Joining a thread
/// that was never started returns at once.
pub fn exec_join(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let obj = ctx.frame()?.peek_ref(0)?;
    if obj.is_null() {
        ctx.frame_mut()?.pop()?;
        return ctx.raise(builtin::NULL_POINTER, Some("joining null thread"));
    }
    if let Some(target) = ctx.kernel.thread_of_object(obj) {
        if !ctx.kernel.thread(target)?.is_terminated() {
            ctx.thread_mut()?.set_status(ThreadStatus::Joining(target));
            return Ok(Flow::Reexecute);
        }
    }
    ctx.frame_mut()?.pop()?;
    Ok(next(insn))
}
