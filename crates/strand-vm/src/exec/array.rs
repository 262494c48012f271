//! Array creation and element access.

use strand_common_core::TypeCode;

use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::heap::ObjRef;
use crate::instruction::{Instruction, Opcode};
use crate::vm::{Flow, VmError};

fn not_an_array(obj: ObjRef) -> VmError {
    VmError::WrongObjectKind {
        obj,
        expected: "an array",
    }
}

pub fn exec_new_array(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let elem = match insn.op {
        Opcode::NewArray => insn.type_code()?,
        _ => {
            ctx.program.resolve_class(insn.class_name()?)?;
            TypeCode::Reference
        }
    };
    let len = ctx.frame_mut()?.pop_int()?;
    if len < 0 {
        return ctx.raise(builtin::NEGATIVE_ARRAY_SIZE, Some(&len.to_string()));
    }
    // Arrays carry no class of their own.
    let class = ctx.program.resolve_class(builtin::OBJECT)?.id;
    let arr = ctx.kernel.heap.alloc_array(class, elem, len as usize, ctx.tid);
    ctx.frame_mut()?.push_ref(arr);
    Ok(next(insn))
}

pub fn exec_array_length(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let arr = ctx.frame_mut()?.pop_ref()?;
    if arr.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("array length of null"));
    }
    let len = ctx.kernel.object(arr)?.array().ok_or_else(|| not_an_array(arr))?.len();
    ctx.frame_mut()?.push_int(len as i32);
    Ok(next(insn))
}

/// Bounds-checked element index, or the exception message.
fn checked_index(ctx: &ExecCtx, arr: ObjRef, index: i32) -> Result<Result<usize, String>, VmError> {
    let len = ctx.kernel.object(arr)?.array().ok_or_else(|| not_an_array(arr))?.len();
    if index < 0 || index as usize >= len {
        return Ok(Err(format!("Index {} out of bounds for length {}", index, len)));
    }
    Ok(Ok(index as usize))
}

pub fn exec_array_load(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    let index = frame.pop_int()?;
    let arr = frame.pop_ref()?;
    if arr.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("load from null array"));
    }
    let i = match checked_index(ctx, arr, index)? {
        Ok(i) => i,
        Err(msg) => return ctx.raise(builtin::ARRAY_INDEX, Some(&msg)),
    };
    ctx.note_access(arr)?;
    let v = ctx.kernel.object(arr)?.array().ok_or_else(|| not_an_array(arr))?[i];
    ctx.frame_mut()?.push(v);
    Ok(next(insn))
}

pub fn exec_array_store(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let frame = ctx.frame_mut()?;
    let v = frame.pop()?;
    let index = frame.pop_int()?;
    let arr = frame.pop_ref()?;
    if arr.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some("store into null array"));
    }
    let i = match checked_index(ctx, arr, index)? {
        Ok(i) => i,
        Err(msg) => return ctx.raise(builtin::ARRAY_INDEX, Some(&msg)),
    };
    ctx.note_access(arr)?;
    let o = ctx.kernel.object_mut(arr)?;
    let shared = o.shared;
    o.array_mut().ok_or_else(|| not_an_array(arr))?[i] = v;
    if shared && insn.op == Opcode::AAStore {
        ctx.kernel.mark_shared(ObjRef::from_slot(v));
    }
    Ok(next(insn))
}
