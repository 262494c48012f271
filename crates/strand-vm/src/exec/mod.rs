//! Instruction semantics.
//!
//! One free function per opcode family, each taking the step context and
//! returning where control goes next. `execute` is the dispatcher and
//! `apply` carries out the returned `Flow` on the thread.

pub mod arith;
pub mod array;
pub mod branch;
pub mod call;
pub mod field;
pub mod load;
pub mod monitor;
pub mod nondet;
pub mod threads;
pub mod throw;

use crate::bytecode::{ClassId, Program};
use crate::choice::ChoiceGenerator;
use crate::heap::ObjRef;
use crate::instruction::{Instruction, Opcode};
use crate::kernel::KernelState;
use crate::thread::{StackFrame, ThreadId, ThreadInfo};
use crate::vm::{Flow, SystemState, UncaughtException, VmConfig, VmError, VmEvent};

/// Everything one step may touch.
pub struct ExecCtx<'a> {
    pub program: &'a Program,
    pub kernel: &'a mut KernelState,
    pub system: &'a mut SystemState,
    pub config: &'a VmConfig,
    pub tid: ThreadId,
    pub events: &'a mut Vec<VmEvent>,
    /// Choice generator registered by this step.
    pub pending: &'a mut Option<ChoiceGenerator>,
}

impl<'a> ExecCtx<'a> {
    #[inline]
    pub fn thread(&self) -> Result<&ThreadInfo, VmError> {
        self.kernel.thread(self.tid)
    }

    #[inline]
    pub fn thread_mut(&mut self) -> Result<&mut ThreadInfo, VmError> {
        self.kernel.thread_mut(self.tid)
    }

    #[inline]
    pub fn frame(&self) -> Result<&StackFrame, VmError> {
        self.thread()?.top_frame()
    }

    #[inline]
    pub fn frame_mut(&mut self) -> Result<&mut StackFrame, VmError> {
        self.thread_mut()?.top_frame_mut()
    }

    /// Allocate a plain instance owned by the current thread.
    pub fn new_instance(&mut self, class: ClassId) -> Result<ObjRef, VmError> {
        let n = self
            .program
            .class(class)
            .ok_or(VmError::NoSuchClassId(class))?
            .instance_fields()
            .len();
        Ok(self.kernel.heap.alloc_instance(class, n, self.tid))
    }

    /// Synthesize a target exception of `class_name`.
    pub fn raise(&mut self, class_name: &str, message: Option<&str>) -> Result<Flow, VmError> {
        let class = self.program.resolve_class(class_name)?.id;
        let exc = self.new_instance(class)?;
        self.kernel.object_mut(exc)?.detail = message.map(Into::into);
        tracing::debug!(thread = %self.tid, exception = class_name, ?message, "raise");
        Ok(Flow::Raise(exc))
    }

    /// Record that `obj` is touched by the current thread; objects touched
    /// outside their creating thread become shared.
    pub fn note_access(&mut self, obj: ObjRef) -> Result<(), VmError> {
        let tid = self.tid;
        let o = self.kernel.object_mut(obj)?;
        if o.creator != tid {
            o.shared = true;
        }
        Ok(())
    }
}

#[inline]
pub fn next(insn: &Instruction) -> Flow {
    Flow::ContinueTo(insn.next_index())
}

/// Execute `insn` on the top frame of `ctx.tid`.
pub fn execute(ctx: &mut ExecCtx, insn: &Instruction) -> Result<Flow, VmError> {
    use Opcode::*;
    match insn.op {
        Nop => Ok(next(insn)),
        IConst | LConst | DConst | AConstNull => load::exec_const(ctx, insn),
        ILoad | LLoad | DLoad | ALoad => load::exec_load(ctx, insn),
        IStore | LStore | DStore | AStore => load::exec_store(ctx, insn),
        Dup | Pop | Pop2 | Swap => load::exec_stack(ctx, insn),

        IAdd | ISub | IMul | IDiv | IRem | INeg => arith::exec_int(ctx, insn),
        IInc => arith::exec_iinc(ctx, insn),
        LAdd | LSub | LMul | LDiv | LCmp => arith::exec_long(ctx, insn),
        DAdd | DSub | DMul | DDiv | DCmpl => arith::exec_double(ctx, insn),
        I2L | L2I | I2D | D2I | F2D => arith::exec_convert(ctx, insn),

        IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfICmpEq | IfICmpNe | IfICmpLt
        | IfICmpGe | IfICmpGt | IfICmpLe | IfACmpEq | IfACmpNe | IfNull | IfNonNull
        | Goto => branch::exec_branch(ctx, insn),

        New => field::exec_new(ctx, insn),
        GetField => field::exec_get_field(ctx, insn),
        PutField => field::exec_put_field(ctx, insn),
        GetStatic => field::exec_get_static(ctx, insn),
        PutStatic => field::exec_put_static(ctx, insn),

        NewArray | ANewArray => array::exec_new_array(ctx, insn),
        ArrayLength => array::exec_array_length(ctx, insn),
        IALoad | AALoad => array::exec_array_load(ctx, insn),
        IAStore | AAStore => array::exec_array_store(ctx, insn),

        InvokeVirtual | InvokeSpecial | InvokeStatic => call::exec_invoke(ctx, insn),
        InvokeClinit => call::exec_invoke_clinit(ctx, insn),
        DirectCallReturn => call::exec_direct_call_return(ctx),
        Return | IReturn | LReturn | DReturn | AReturn => call::exec_return(ctx, insn),

        AThrow => throw::exec_athrow(ctx),
        Assert => throw::exec_assert(ctx, insn),
        MonitorEnter => monitor::exec_monitor_enter(ctx, insn),
        MonitorExit => monitor::exec_monitor_exit(ctx, insn),

        ThreadStart => threads::exec_start(ctx, insn),
        ThreadJoin => threads::exec_join(ctx, insn),
        ThreadYield => Ok(next(insn)),
    }
}

/// What became of the thread after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    /// No frames left.
    Finished,
    /// An exception left a firewall frame or the bottom of the stack.
    Escaped(UncaughtException),
}

/// Carry out `flow` on the current thread.
pub fn apply(ctx: &mut ExecCtx, flow: Flow) -> Result<StepOutcome, VmError> {
    match flow {
        Flow::ContinueTo(index) | Flow::BranchTo(index) => ctx.frame_mut()?.pc = index,
        Flow::CallInto | Flow::ReturnFrom | Flow::Reexecute => {}
        Flow::Raise(exc) => {
            if let throw::Unwind::Escaped(record) = throw::unwind(ctx, exc)? {
                return Ok(StepOutcome::Escaped(record));
            }
        }
        Flow::Terminate => return Ok(StepOutcome::Finished),
    }
    Ok(StepOutcome::Running)
}
