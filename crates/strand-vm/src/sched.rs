//! Scheduling relevance: which steps are candidate interleaving points.
//!
//! Every rule has to be exact per opcode. Answering false where another
//! thread could observe the effect hides races; answering true where none
//! can multiplies states for nothing.

use strand_common_core::types;

use crate::bytecode::Program;
use crate::choice::ChoiceGenerator;
use crate::exec::call::resolve_target;
use crate::heap::ObjRef;
use crate::instruction::{Instruction, Opcode};
use crate::kernel::KernelState;
use crate::thread::{StackFrame, ThreadId};

impl Instruction {
    /// Must the scheduler consider switching threads before `tid` executes
    /// this instruction?
    pub fn is_scheduling_relevant(&self, program: &Program, kernel: &KernelState, tid: ThreadId) -> bool {
        if !kernel.has_other_runnable(tid) {
            return false;
        }
        let Ok(thread) = kernel.thread(tid) else {
            return false;
        };
        let Ok(frame) = thread.top_frame() else {
            return false;
        };
        if frame.method().is_atomic() {
            return false;
        }

        use Opcode::*;
        match self.op {
            MonitorEnter => true,
            MonitorExit => frame
                .peek_ref(0)
                .map_or(false, |obj| kernel.has_blocked_on(obj, tid)),
            GetField => self.field_access_relevant(program, kernel, tid, frame, 0),
            PutField => {
                let depth = self
                    .field_ref()
                    .ok()
                    .and_then(|f| types::check_field_descriptor(&f.descriptor).ok())
                    .map_or(1, |t| t.slot_size());
                self.field_access_relevant(program, kernel, tid, frame, depth)
            }
            IALoad | AALoad => element_access_relevant(kernel, tid, frame.peek_ref(1).ok()),
            IAStore | AAStore => element_access_relevant(kernel, tid, frame.peek_ref(2).ok()),
            GetStatic | PutStatic => true,
            InvokeVirtual | InvokeSpecial | InvokeStatic => {
                matches!(
                    resolve_target(program, kernel, frame, self),
                    Ok(Some(m)) if m.is_synchronized() && m.is_sync_relevant()
                )
            }
            ThreadStart | ThreadJoin | ThreadYield => true,
            Return | IReturn | LReturn | DReturn | AReturn | DirectCallReturn => {
                thread.count_stack_frames() == 1
            }
            _ => false,
        }
    }

    fn field_access_relevant(
        &self,
        program: &Program,
        kernel: &KernelState,
        tid: ThreadId,
        frame: &StackFrame,
        depth: usize,
    ) -> bool {
        let volatile = self
            .field_ref()
            .ok()
            .and_then(|f| {
                let class = program.class_id(&f.class)?;
                program.find_instance_field(class, &f.name)
            })
            .map_or(false, |f| f.is_volatile());
        volatile || element_access_relevant(kernel, tid, frame.peek_ref(depth).ok())
    }
}

/// Shared object, or touched by a thread other than its creator.
fn element_access_relevant(kernel: &KernelState, tid: ThreadId, obj: Option<ObjRef>) -> bool {
    obj.and_then(|r| kernel.heap.get(r))
        .map_or(false, |o| o.shared || o.creator != tid)
}

/// Choice over all runnable threads, in id order.
pub fn thread_choice(kernel: &KernelState, id: &str) -> ChoiceGenerator {
    ChoiceGenerator::threads(id, kernel.runnable_threads())
}

/// Choice-generator id for a scheduling point before `op`.
pub fn choice_id(op: Opcode) -> &'static str {
    use Opcode::*;
    match op {
        MonitorEnter => "monitorEnter",
        MonitorExit => "monitorExit",
        GetField | PutField | IALoad | AALoad | IAStore | AAStore => "sharedFieldAccess",
        GetStatic | PutStatic => "staticFieldAccess",
        InvokeVirtual | InvokeSpecial | InvokeStatic => "syncMethodEnter",
        ThreadStart => "threadStart",
        ThreadJoin => "threadJoin",
        ThreadYield => "threadYield",
        _ => "threadTerminate",
    }
}
