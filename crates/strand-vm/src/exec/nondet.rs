//! Nondeterministic value sources.
//!
//! A native method carrying a `NondetSource` extension does not run. The
//! first time its invoke executes, a choice generator over the possible
//! results is registered and the invoke is re-executed at the start of the
//! next transition, where the choice the search picked is pushed as the
//! return value.

use std::sync::Arc;

use strand_common_core::TypeCode;

use super::{next, ExecCtx};
use crate::bytecode::builtin;
use crate::choice::{ChoiceDomain, ChoiceGenerator, ChoiceKind, NondetSource};
use crate::heap::ObjRef;
use crate::instruction::Instruction;
use crate::method::MethodInfo;
use crate::vm::{Flow, VmError};

pub fn exec_native(ctx: &mut ExecCtx, insn: &Instruction, callee: &Arc<MethodInfo>) -> Result<Flow, VmError> {
    let Some(source) = callee.ext().get::<NondetSource>() else {
        return ctx.raise(builtin::UNSATISFIED_LINK, Some(&callee.full_name()));
    };

    if let Some(choice) = ctx.system.current_choice.take() {
        let frame = ctx.frame_mut()?;
        frame.pop_slots(callee.arguments_size())?;
        if callee.return_size() > 0 {
            for slot in choice.to_slots() {
                frame.push(slot);
            }
        }
        tracing::trace!(thread = %ctx.tid, method = %callee.full_name(), ?choice, "nondet value");
        return Ok(next(insn));
    }

    let domain = domain_for(ctx, callee, source)?;
    let id = format!("nondet.{}", callee.name());
    tracing::debug!(thread = %ctx.tid, cg = %id, choices = domain.len(), "data choice");
    *ctx.pending = Some(ChoiceGenerator::new(&id, domain));
    Ok(Flow::Reexecute)
}

fn domain_for(ctx: &ExecCtx, callee: &MethodInfo, source: &NondetSource) -> Result<ChoiceDomain, VmError> {
    let malformed = || VmError::MalformedNondet(callee.full_name());
    let frame = ctx.frame()?;
    let args = callee.argument_types();
    let domain = match callee.return_choice_kind() {
        ChoiceKind::Bool => ChoiceDomain::Bool,
        ChoiceKind::Int => match args {
            [TypeCode::Int, TypeCode::Int] => ChoiceDomain::IntRange {
                min: frame.peek_int(1)?,
                max: frame.peek_int(0)?,
            },
            _ => return Err(malformed()),
        },
        ChoiceKind::Long => match args {
            // Each long is a value slot plus padding.
            [TypeCode::Long, TypeCode::Long] => ChoiceDomain::LongRange {
                min: frame.peek(3)? as i64,
                max: frame.peek(1)? as i64,
            },
            _ => return Err(malformed()),
        },
        ChoiceKind::Float => ChoiceDomain::Floats(source.floats.clone()),
        ChoiceKind::Double => ChoiceDomain::Doubles(source.doubles.clone()),
        ChoiceKind::Reference => {
            if callee.return_type_code() == TypeCode::Void || !args.iter().all(|t| t.is_reference()) {
                return Err(malformed());
            }
            let n = args.len();
            let candidates = (0..n)
                .rev()
                .map(|depth| frame.peek(depth).map(ObjRef::from_slot))
                .collect::<Result<Vec<_>, _>>()?;
            ChoiceDomain::References(candidates)
        }
        ChoiceKind::Threads => return Err(malformed()),
    };
    Ok(domain)
}
