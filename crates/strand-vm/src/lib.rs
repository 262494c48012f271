//! Bytecode interpreter for the strand model checker.
//!
//! This crate provides a stack-based interpreter whose execution can be
//! split into transitions at every choice point:
//! - Method metadata with build-once tables and memoized signature data
//! - Heap objects with per-object monitors and class initialization state
//! - Scheduling relevance per opcode and data choices from native sources
//! - Whole-state snapshots for backtracking

pub mod bytecode;
pub mod choice;
pub mod code;
pub mod exec;
pub mod ext;
pub mod heap;
pub mod instruction;
pub mod kernel;
pub mod listener;
pub mod lock;
pub mod method;
pub mod registry;
pub mod sched;
pub mod thread;
pub mod vm;

pub use bytecode::{builtin, ClassDecl, ClassId, ClassInfo, FieldInfo, LoadError, Program};
pub use choice::{Choice, ChoiceDomain, ChoiceGenerator, ChoiceKind, NondetSource};
pub use code::{CodeBuilder, DefaultInstructionFactory, InstructionFactory, Label};
pub use ext::Extensions;
pub use heap::{Heap, HeapObject, ObjRef, ObjectKind};
pub use instruction::{FieldRef, Instruction, MethodRef, Opcode, Operand, ProgramPoint};
pub use kernel::{ClassStatus, KernelState};
pub use listener::VmListener;
pub use lock::LockState;
pub use method::{ExceptionHandler, LocalVarInfo, MethodAttributes, MethodId, MethodInfo};
pub use registry::MethodRegistry;
pub use thread::{StackFrame, ThreadId, ThreadInfo, ThreadStatus};
pub use vm::{
    ChoiceRecord, EnterOutcome, Flow, SystemState, TransitionEnd, UncaughtException, Vm,
    VmConfig, VmError, VmEvent, VmSnapshot,
};

pub use strand_common_core::{Modifiers, TypeCode};
