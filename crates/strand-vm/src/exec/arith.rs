//! Integer, long and double arithmetic plus conversions.
//!
//! Overflow wraps. Integral division by zero raises
//! `ArithmeticException`; double division follows IEEE 754.

use core::cmp::Ordering;

use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::instruction::{Instruction, Opcode};
use crate::vm::{Flow, VmError};

const DIV_BY_ZERO: &str = "/ by zero";

pub fn exec_int(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    if insn.op == Opcode::INeg {
        let a = frame.pop_int()?;
        frame.push_int(a.wrapping_neg());
        return Ok(next(insn));
    }
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    let v = match insn.op {
        Opcode::IAdd => a.wrapping_add(b),
        Opcode::ISub => a.wrapping_sub(b),
        Opcode::IMul => a.wrapping_mul(b),
        Opcode::IDiv | Opcode::IRem if b == 0 => {
            return ctx.raise(builtin::ARITHMETIC, Some(DIV_BY_ZERO));
        }
        Opcode::IDiv => a.wrapping_div(b),
        _ => a.wrapping_rem(b),
    };
    frame.push_int(v);
    Ok(next(insn))
}

pub fn exec_iinc(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let (slot, delta) = insn.iinc()?;
    let frame = ctx.frame_mut()?;
    let v = (frame.local(slot)? as i32).wrapping_add(delta);
    frame.set_local(slot, v as i64 as u64)?;
    Ok(next(insn))
}

pub fn exec_long(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    let b = frame.pop_long()?;
    let a = frame.pop_long()?;
    match insn.op {
        Opcode::LCmp => frame.push_int(ordering_to_int(a.cmp(&b))),
        Opcode::LAdd => frame.push_long(a.wrapping_add(b)),
        Opcode::LSub => frame.push_long(a.wrapping_sub(b)),
        Opcode::LMul => frame.push_long(a.wrapping_mul(b)),
        _ if b == 0 => return ctx.raise(builtin::ARITHMETIC, Some(DIV_BY_ZERO)),
        _ => frame.push_long(a.wrapping_div(b)),
    }
    Ok(next(insn))
}

pub fn exec_double(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    let b = frame.pop_double()?;
    let a = frame.pop_double()?;
    match insn.op {
        Opcode::DAdd => frame.push_double(a + b),
        Opcode::DSub => frame.push_double(a - b),
        Opcode::DMul => frame.push_double(a * b),
        Opcode::DDiv => frame.push_double(a / b),
        // NaN compares as less.
        _ => frame.push_int(a.partial_cmp(&b).map_or(-1, ordering_to_int)),
    }
    Ok(next(insn))
}

pub fn exec_convert(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    match insn.op {
        Opcode::I2L => {
            let v = frame.pop_int()?;
            frame.push_long(v as i64);
        }
        Opcode::L2I => {
            let v = frame.pop_long()?;
            frame.push_int(v as i32);
        }
        Opcode::I2D => {
            let v = frame.pop_int()?;
            frame.push_double(v as f64);
        }
        Opcode::D2I => {
            // Saturating, NaN becomes 0.
            let v = frame.pop_double()?;
            frame.push_int(v as i32);
        }
        _ => {
            let v = f32::from_bits(frame.pop()? as u32);
            frame.push_double(v as f64);
        }
    }
    Ok(next(insn))
}

#[inline]
fn ordering_to_int(o: Ordering) -> i32 {
    match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}
