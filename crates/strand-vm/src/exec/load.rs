//! Constants, locals and stack shuffling.

use super::{next, ExecCtx};
use crate::instruction::{Instruction, Opcode};
use crate::vm::{Flow, VmError};

pub fn exec_const(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    match insn.op {
        Opcode::IConst => frame.push_int(insn.int_value()? as i32),
        Opcode::LConst => frame.push_long(insn.int_value()?),
        Opcode::DConst => frame.push_double(insn.double_value()?),
        _ => frame.push(0),
    }
    Ok(next(insn))
}

pub fn exec_load(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = insn.local()?;
    let frame = ctx.frame_mut()?;
    let v = frame.local(slot)?;
    frame.push(v);
    if matches!(insn.op, Opcode::LLoad | Opcode::DLoad) {
        frame.push(0);
    }
    Ok(next(insn))
}

pub fn exec_store(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let slot = insn.local()?;
    let frame = ctx.frame_mut()?;
    if matches!(insn.op, Opcode::LStore | Opcode::DStore) {
        frame.pop()?;
        let v = frame.pop()?;
        frame.set_local_wide(slot, v)?;
    } else {
        let v = frame.pop()?;
        frame.set_local(slot, v)?;
    }
    Ok(next(insn))
}

pub fn exec_stack(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    match insn.op {
        Opcode::Dup => {
            let v = frame.peek(0)?;
            frame.push(v);
        }
        Opcode::Pop => {
            frame.pop()?;
        }
        Opcode::Pop2 => {
            frame.pop()?;
            frame.pop()?;
        }
        _ => {
            let a = frame.pop()?;
            let b = frame.pop()?;
            frame.push(a);
            frame.push(b);
        }
    }
    Ok(next(insn))
}
