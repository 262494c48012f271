//! Calls: InvokeVirtual, InvokeSpecial, InvokeStatic, InvokeClinit,
//! DirectCallReturn and the return family.
//!
//! The caller's pc stays on the invoke while the callee runs; a return
//! pops the callee and advances the caller past it. A direct-call stub
//! return does not advance, so the instruction that pushed the stub runs
//! again.

use std::sync::Arc;

use super::{next, nondet, ExecCtx};
use crate::bytecode::{builtin, ClassId, Program};
use crate::heap::ObjRef;
use crate::instruction::{Instruction, Opcode};
use crate::kernel::{ClassStatus, KernelState, Unlocked};
use crate::method::MethodInfo;
use crate::thread::{StackFrame, ThreadStatus};
use crate::vm::{EnterOutcome, Flow, VmError, VmEvent};

// =============================================================================
// Resolution
// =============================================================================

/// Method an invoke lands in. Virtual calls dispatch on the receiver's
/// class; `None` means the receiver is null.
pub fn resolve_target(
    program: &Program,
    kernel: &KernelState,
    frame: &StackFrame,
    insn: &Instruction,
) -> Result<Option<Arc<MethodInfo>>, VmError> {
    let declared = program.resolve_method(insn.method_ref()?)?;
    if declared.is_static() {
        return Ok(Some(Arc::clone(declared)));
    }
    let receiver = frame.peek_ref(declared.arguments_size() - 1)?;
    if receiver.is_null() {
        return Ok(None);
    }
    if insn.op != Opcode::InvokeVirtual {
        return Ok(Some(Arc::clone(declared)));
    }
    let class = kernel.object(receiver)?.class;
    let target = program
        .find_method(class, declared.unique_name())
        .unwrap_or(declared);
    Ok(Some(Arc::clone(target)))
}

/// Monitor a synchronized method takes: the class object for statics,
/// the receiver otherwise.
pub fn lock_target(kernel: &KernelState, method: &MethodInfo, this_ref: ObjRef) -> Result<ObjRef, VmError> {
    if !method.is_static() {
        return Ok(this_ref);
    }
    let class = method
        .class_id()
        .ok_or_else(|| VmError::NoSuchClass(method.full_name()))?;
    kernel.class_object(class)
}

// =============================================================================
// Class initialization overlay
// =============================================================================

/// Make sure `class` and its superclasses are initialized, superclass
/// first. Returns true if a `[clinit]` stub frame was pushed; the caller
/// must then re-execute.
pub fn push_clinit_if_needed(ctx: &mut ExecCtx, class: ClassId) -> Result<bool, VmError> {
    let program = ctx.program;
    for c in program.class_chain(class).into_iter().rev() {
        let clinit = match ctx.kernel.class_status(c)? {
            ClassStatus::Initialized => continue,
            ClassStatus::Initializing(t) if t == ctx.tid => continue,
            _ => program.class(c).and_then(|ci| ci.clinit()),
        };
        let Some(clinit) = clinit else {
            ctx.kernel.set_class_status(c, ClassStatus::Initialized)?;
            continue;
        };
        let stub = clinit.create_direct_call_stub("[clinit]", program.factory())?;
        tracing::debug!(thread = %ctx.tid, class = %clinit.class_name(), "class initialization");
        ctx.thread_mut()?
            .push_frame(StackFrame::new(Arc::new(stub), ObjRef::NULL));
        return Ok(true);
    }
    Ok(false)
}

pub fn exec_invoke_clinit(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let program = ctx.program;
    let class = program.resolve_class(insn.class_name()?)?;
    match ctx.kernel.class_status(class.id)? {
        ClassStatus::Initialized => return Ok(next(insn)),
        ClassStatus::Initializing(t) if t == ctx.tid => return Ok(next(insn)),
        _ => {}
    }
    if let Some(sup) = class.super_class {
        if push_clinit_if_needed(ctx, sup)? {
            return Ok(Flow::Reexecute);
        }
    }
    let Some(clinit) = class.clinit() else {
        ctx.kernel.set_class_status(class.id, ClassStatus::Initialized)?;
        return Ok(next(insn));
    };
    match enter(ctx, clinit)? {
        EnterOutcome::Entered => Ok(Flow::CallInto),
        EnterOutcome::Blocked(_) => Ok(Flow::Reexecute),
    }
}

// =============================================================================
// Invocation
// =============================================================================

pub fn exec_invoke(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let program = ctx.program;
    if insn.op == Opcode::InvokeStatic {
        let class = program.resolve_class(&insn.method_ref()?.class)?.id;
        if push_clinit_if_needed(ctx, class)? {
            return Ok(Flow::Reexecute);
        }
    }

    let target = resolve_target(program, ctx.kernel, ctx.frame()?, insn)?;
    let Some(callee) = target else {
        let name = &insn.method_ref()?.name;
        return ctx.raise(builtin::NULL_POINTER, Some(&format!("invoking {} on null", name)));
    };
    ctx.thread_mut()?.transient_mut().callee = Some(callee.global_id());

    if callee.is_abstract() {
        return ctx.raise(builtin::ABSTRACT_METHOD, Some(&callee.full_name()));
    }
    if callee.is_native() {
        return nondet::exec_native(ctx, insn, &callee);
    }
    match enter(ctx, &callee)? {
        EnterOutcome::Entered => Ok(Flow::CallInto),
        EnterOutcome::Blocked(_) => Ok(Flow::Reexecute),
    }
}

/// Push a frame for `method`, moving its arguments off the caller's
/// operand stack. A synchronized method takes its monitor first; if that
/// fails the thread is marked blocked and nothing else changes.
pub fn enter(ctx: &mut ExecCtx, method: &Arc<MethodInfo>) -> Result<EnterOutcome, VmError> {
    let tid = ctx.tid;
    let this_ref = if method.is_static() {
        ObjRef::NULL
    } else {
        ctx.frame()?.peek_ref(method.arguments_size() - 1)?
    };

    if method.is_synchronized() {
        let target = lock_target(ctx.kernel, method, this_ref)?;
        if !ctx.kernel.lock_object(target, tid)? {
            tracing::trace!(thread = %tid, method = %method.full_name(), "blocked on entry");
            ctx.thread_mut()?.set_status(ThreadStatus::Blocked(target));
            ctx.thread_mut()?.transient_mut().receiver = target;
            return Ok(EnterOutcome::Blocked(target));
        }
        ctx.events.push(VmEvent::ObjectLocked(tid, target));
        if method.is_clinit() {
            if let Some(class) = method.class_id() {
                ctx.kernel.set_class_status(class, ClassStatus::Initializing(tid))?;
            }
        }
    }

    let args = ctx.frame_mut()?.pop_slots(method.arguments_size())?;
    let mut frame = StackFrame::new(Arc::clone(method), this_ref);
    if frame.locals.len() < args.len() {
        frame.locals.resize(args.len(), 0);
    }
    frame.locals[..args.len()].copy_from_slice(&args);

    let thread = ctx.thread_mut()?;
    thread.transient_mut().receiver = this_ref;
    thread.push_frame(frame);
    ctx.events.push(VmEvent::MethodEntered(tid, Arc::clone(method)));
    Ok(EnterOutcome::Entered)
}

/// Pop the top frame, releasing a synchronized method's monitor. A class
/// initializer publishes `Initialized` only once its lock is released.
pub fn leave(ctx: &mut ExecCtx) -> Result<StackFrame, VmError> {
    let tid = ctx.tid;
    let frame = ctx
        .thread_mut()?
        .pop_frame()
        .ok_or(VmError::NoActiveFrame(tid))?;
    let method = Arc::clone(frame.method());

    if method.is_synchronized() {
        let target = lock_target(ctx.kernel, &method, frame.this_ref)?;
        if ctx.kernel.object(target)?.lock.is_locked_by(tid) {
            if let Ok(Unlocked::Released) = ctx.kernel.unlock_object(target, tid)? {
                ctx.kernel.wake_blocked_on(target);
            }
            ctx.events.push(VmEvent::ObjectUnlocked(tid, target));
        }
    }
    if method.is_clinit() {
        if let Some(class) = method.class_id() {
            ctx.kernel.set_class_status(class, ClassStatus::Initialized)?;
        }
    }
    if !method.is_vm_internal() {
        ctx.events.push(VmEvent::MethodExited(tid, method));
    }
    Ok(frame)
}

// =============================================================================
// Returns
// =============================================================================

pub fn exec_return(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let n = match insn.op {
        Opcode::Return => 0,
        Opcode::LReturn | Opcode::DReturn => 2,
        _ => 1,
    };
    let result = ctx.frame_mut()?.pop_slots(n)?;
    leave(ctx)?;
    let thread = ctx.thread_mut()?;
    let Ok(caller) = thread.top_frame_mut() else {
        return Ok(Flow::Terminate);
    };
    caller.operands.extend(result);
    caller.pc += 1;
    Ok(Flow::ReturnFrom)
}

pub fn exec_direct_call_return(ctx: &mut ExecCtx) -> Result<Flow, VmError> {
    let frame = leave(ctx)?;
    let thread = ctx.thread_mut()?;
    thread.transient_mut().direct_call_result = Some(frame.operands);
    if thread.count_stack_frames() == 0 {
        return Ok(Flow::Terminate);
    }
    Ok(Flow::ReturnFrom)
}
