//! MonitorEnter / MonitorExit.

use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::instruction::Instruction;
use crate::kernel::Unlocked;
use crate::thread::ThreadStatus;
use crate::vm::{Flow, VmError, VmEvent};

/// The object stays on the stack until the monitor is acquired, so a
/// blocked thread retries the same instruction once woken.
pub fn exec_monitor_enter(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let obj = ctx.frame()?.peek_ref(0)?;
    if obj.is_null() {
        ctx.frame_mut()?.pop()?;
        return ctx.raise(builtin::NULL_POINTER, Some("monitorenter on null"));
    }
    if !ctx.kernel.lock_object(obj, ctx.tid)? {
        ctx.thread_mut()?.set_status(ThreadStatus::Blocked(obj));
        return Ok(Flow::Reexecute);
    }
    ctx.frame_mut()?.pop()?;
    ctx.events.push(VmEvent::ObjectLocked(ctx.tid, obj));
    Ok(next(insn))
}

pub fn exec_monitor_exit(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let obj = ctx.frame_mut()?.pop_ref()?;
    if obj.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("monitorexit on null"));
    }
    match ctx.kernel.unlock_object(obj, ctx.tid)? {
        Err(_) => ctx.raise(builtin::ILLEGAL_MONITOR_STATE, None),
        Ok(unlocked) => {
            if unlocked == Unlocked::Released {
                ctx.kernel.wake_blocked_on(obj);
            }
            ctx.events.push(VmEvent::ObjectUnlocked(ctx.tid, obj));
            Ok(next(insn))
        }
    }
}
