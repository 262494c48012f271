//! Conditional and unconditional branches.

use super::{next, ExecCtx};
use crate::instruction::{Instruction, Opcode};
use crate::vm::{Flow, VmError};

pub fn exec_branch(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    use Opcode::*;
    let target = insn.target()?;
    let frame = ctx.frame_mut()?;
    let taken = match insn.op {
        Goto => true,
        IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
            let v = frame.pop_int()?;
            match insn.op {
                IfEq => v == 0,
                IfNe => v != 0,
                IfLt => v < 0,
                IfGe => v >= 0,
                IfGt => v > 0,
                _ => v <= 0,
            }
        }
        IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe | IfICmpGt | IfICmpLe => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            match insn.op {
                IfICmpEq => a == b,
                IfICmpNe => a != b,
                IfICmpLt => a < b,
                IfICmpGe => a >= b,
                IfICmpGt => a > b,
                _ => a <= b,
            }
        }
        IfACmpEq | IfACmpNe => {
            let b = frame.pop_ref()?;
            let a = frame.pop_ref()?;
            (a == b) == (insn.op == IfACmpEq)
        }
        IfNull => frame.pop_ref()?.is_null(),
        _ => !frame.pop_ref()?.is_null(),
    };
    Ok(if taken {
        Flow::BranchTo(target)
    } else {
        next(insn)
    })
}
