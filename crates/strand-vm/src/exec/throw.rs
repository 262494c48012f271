//! Throwing and exception dispatch.

use std::sync::Arc;

use super::call::leave;
use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::heap::ObjRef;
use crate::instruction::Instruction;
use crate::vm::{Flow, UncaughtException, VmError, VmEvent};

pub fn exec_athrow(ctx: &mut ExecCtx) -> Result<Flow, VmError> {
    let exc = ctx.frame_mut()?.pop_ref()?;
    if exc.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("throwing null"));
    }
    Ok(Flow::Raise(exc))
}

pub fn exec_assert(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    if ctx.frame_mut()?.pop_int()? == 0 {
        return ctx.raise(builtin::ASSERTION_ERROR, insn.message());
    }
    Ok(next(insn))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unwind {
    /// A handler frame is positioned on its handler.
    Handled,
    /// The exception left a firewall frame or the bottom frame.
    Escaped(UncaughtException),
}

/// Search the stack for a handler of `exc`, popping frames (and releasing
/// their monitors) until one matches. Handlers are tried in declaration
/// order; the first covering one whose catch type is a superclass of the
/// exception wins.
pub fn unwind(ctx: &mut ExecCtx, exc: ObjRef) -> Result<Unwind, VmError> {
    let tid = ctx.tid;
    let program = ctx.program;
    ctx.events.push(VmEvent::ExceptionThrown(tid, exc));
    let exc_class = ctx.kernel.object(exc)?.class;

    loop {
        let frame = ctx.frame()?;
        let method = Arc::clone(frame.method());
        let position = frame
            .current_instruction()
            .map(Instruction::position)
            .ok_or_else(|| VmError::NoInstruction {
                method: method.full_name(),
                pc: frame.pc,
            })?;

        let handler = method.find_handler(position, |catch| program.is_subclass_of_name(exc_class, catch));
        if let Some(h) = handler {
            let target = method.instruction_at(h.handler_pc)?.index();
            tracing::trace!(thread = %tid, method = %method.full_name(), handler = h.handler_pc, "caught");
            let frame = ctx.frame_mut()?;
            frame.operands.clear();
            frame.push_ref(exc);
            frame.pc = target;
            return Ok(Unwind::Handled);
        }

        leave(ctx)?;
        if method.is_firewall() || ctx.thread()?.count_stack_frames() == 0 {
            let obj = ctx.kernel.object(exc)?;
            let class_name = program
                .class(obj.class)
                .map_or_else(|| Arc::from(builtin::THROWABLE), |c| Arc::clone(&c.name));
            let record = UncaughtException {
                thread: tid,
                exception: exc,
                class_name,
                message: obj.detail.clone(),
            };
            tracing::debug!(thread = %tid, method = %method.full_name(), exception = %record, "escaped");
            return Ok(Unwind::Escaped(record));
        }
    }
}
