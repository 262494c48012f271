//! Object creation and field access.

use strand_common_core::TypeCode;

use super::call::push_clinit_if_needed;
use super::{next, ExecCtx};
use crate::bytecode::{builtin, ClassId, FieldInfo};
use crate::heap::ObjRef;
use crate::instruction::{FieldRef, Instruction};
use crate::vm::{Flow, VmError};

fn field_class(ctx: &ExecCtx, fref: &FieldRef) -> Result<ClassId, VmError> {
    Ok(ctx.program.resolve_class(&fref.class)?.id)
}

fn no_such_field(fref: &FieldRef) -> VmError {
    VmError::NoSuchField(format!("{}.{}", fref.class, fref.name))
}

fn instance_field(ctx: &ExecCtx, fref: &FieldRef) -> Result<FieldInfo, VmError> {
    let class = field_class(ctx, fref)?;
    ctx.program
        .find_instance_field(class, &fref.name)
        .cloned()
        .ok_or_else(|| no_such_field(fref))
}

/// Pop a field value in push order.
fn pop_value(ctx: &mut ExecCtx, t: TypeCode) -> Result<u64, VmError> {
    let frame = ctx.frame_mut()?;
    if t.slot_size() == 2 {
        frame.pop()?;
    }
    frame.pop()
}

fn push_value(ctx: &mut ExecCtx, t: TypeCode, v: u64) -> Result<(), VmError> {
    let frame = ctx.frame_mut()?;
    frame.push(v);
    if t.slot_size() == 2 {
        frame.push(0);
    }
    Ok(())
}

/// References stored into shared memory become shared themselves.
fn publish(ctx: &mut ExecCtx, t: TypeCode, v: u64, holder_shared: bool) {
    if holder_shared && t.is_reference() {
        ctx.kernel.mark_shared(ObjRef::from_slot(v));
    }
}

pub fn exec_new(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let class = ctx.program.resolve_class(insn.class_name()?)?.id;
    if push_clinit_if_needed(ctx, class)? {
        return Ok(Flow::Reexecute);
    }
    let obj = ctx.new_instance(class)?;
    ctx.frame_mut()?.push_ref(obj);
    Ok(next(insn))
}

pub fn exec_get_field(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let fref = insn.field_ref()?;
    let field = instance_field(ctx, fref)?;
    let obj = ctx.frame_mut()?.pop_ref()?;
    if obj.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some(&format!("reading field {}", fref.name)));
    }
    ctx.note_access(obj)?;
    let v = ctx
        .kernel
        .object(obj)?
        .fields()
        .and_then(|f| f.get(field.slot).copied())
        .ok_or(VmError::WrongObjectKind {
            obj,
            expected: "an instance",
        })?;
    push_value(ctx, field.type_code, v)?;
    Ok(next(insn))
}

pub fn exec_put_field(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let fref = insn.field_ref()?;
    let field = instance_field(ctx, fref)?;
    let v = pop_value(ctx, field.type_code)?;
    let obj = ctx.frame_mut()?.pop_ref()?;
    if obj.is_null() {
        return ctx.raise(builtin::NULL_POINTER, Some(&format!("writing field {}", fref.name)));
    }
    ctx.note_access(obj)?;
    let o = ctx.kernel.object_mut(obj)?;
    let shared = o.shared;
    let slot = o
        .fields_mut()
        .and_then(|f| f.get_mut(field.slot))
        .ok_or(VmError::WrongObjectKind {
            obj,
            expected: "an instance",
        })?;
    *slot = v;
    publish(ctx, field.type_code, v, shared);
    Ok(next(insn))
}

/// Resolve a static field, running class initialization first if needed.
/// `None` means an initializer frame was pushed.
fn static_field(ctx: &mut ExecCtx, fref: &FieldRef) -> Result<Option<(ObjRef, FieldInfo)>, VmError> {
    let class = field_class(ctx, fref)?;
    let (owner, field) = ctx
        .program
        .find_static_field(class, &fref.name)
        .map(|(owner, f)| (owner, f.clone()))
        .ok_or_else(|| no_such_field(fref))?;
    if push_clinit_if_needed(ctx, owner)? {
        return Ok(None);
    }
    Ok(Some((ctx.kernel.class_object(owner)?, field)))
}

pub fn exec_get_static(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let Some((class_obj, field)) = static_field(ctx, insn.field_ref()?)? else {
        return Ok(Flow::Reexecute);
    };
    let v = ctx
        .kernel
        .object(class_obj)?
        .fields()
        .and_then(|f| f.get(field.slot).copied())
        .ok_or(VmError::WrongObjectKind {
            obj: class_obj,
            expected: "a class object",
        })?;
    push_value(ctx, field.type_code, v)?;
    Ok(next(insn))
}

pub fn exec_put_static(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    let Some((class_obj, field)) = static_field(ctx, insn.field_ref()?)? else {
        return Ok(Flow::Reexecute);
    };
    let v = pop_value(ctx, field.type_code)?;
    let slot = ctx
        .kernel
        .object_mut(class_obj)?
        .fields_mut()
        .and_then(|f| f.get_mut(field.slot))
        .ok_or(VmError::WrongObjectKind {
            obj: class_obj,
            expected: "a class object",
        })?;
    *slot = v;
    publish(ctx, field.type_code, v, true);
    Ok(next(insn))
}
