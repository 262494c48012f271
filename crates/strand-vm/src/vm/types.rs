//! VM types: step results, errors and configuration.

use core::fmt;
use std::sync::Arc;

use strand_common_core::SignatureError;
use thiserror::Error;

use crate::bytecode::{ClassId, LoadError};
use crate::heap::ObjRef;
use crate::instruction::Opcode;
use crate::method::MethodInfo;
use crate::thread::ThreadId;

/// Where control goes after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the instruction at this index.
    ContinueTo(u32),
    /// Taken branch.
    BranchTo(u32),
    /// A new frame was pushed.
    CallInto,
    /// The top frame was popped; the caller is positioned already.
    ReturnFrom,
    /// Dispatch this exception object.
    Raise(ObjRef),
    /// Execute the same instruction again (blocked, overlay pushed, or a
    /// choice generator registered).
    Reexecute,
    /// The thread has no frames left.
    Terminate,
}

/// Outcome of a method entry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Entered,
    /// The monitor of this object is held by another thread.
    Blocked(ObjRef),
}

/// Why a transition stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEnd {
    /// A choice generator is pending.
    ChoicePoint,
    /// All threads terminated.
    EndState,
    /// Live threads remain but none is runnable.
    Deadlock,
    /// A thread terminated through an exception. If other threads can
    /// still run, an `uncaught` thread choice is pending.
    UncaughtException,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtException {
    pub thread: ThreadId,
    pub exception: ObjRef,
    pub class_name: Arc<str>,
    pub message: Option<Arc<str>>,
}

impl fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.class_name.replace('/', "."), self.thread)?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

/// Side effects of a step, reported to listeners once the step is done.
#[derive(Debug, Clone)]
pub enum VmEvent {
    MethodEntered(ThreadId, Arc<MethodInfo>),
    MethodExited(ThreadId, Arc<MethodInfo>),
    ObjectLocked(ThreadId, ObjRef),
    ObjectUnlocked(ThreadId, ObjRef),
    ThreadStarted(ThreadId),
    ThreadTerminated(ThreadId),
    ExceptionThrown(ThreadId, ObjRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VmConfig {
    /// Steps after which a transition is broken by a scheduling choice
    /// (0 = never). The break is registered even when only one thread is
    /// runnable; that generator has a single choice and adds path length
    /// without branching.
    pub max_transition_length: usize,
    /// Methods (`class.name`) treated as atomic in addition to the
    /// method attribute.
    pub atomic_methods: Vec<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_transition_length: 5000,
            atomic_methods: Vec::new(),
        }
    }
}

impl VmConfig {
    pub fn is_atomic(&self, method: &MethodInfo) -> bool {
        method.is_atomic()
            || (!self.atomic_methods.is_empty()
                && self.atomic_methods.iter().any(|m| *m == method.base_name()))
    }
}

/// Internal consistency faults. Target-program errors never show up here;
/// they become target exceptions.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("malformed operand for {op:?}: expected {expected}")]
    MalformedOperand { op: Opcode, expected: &'static str },

    #[error("label {0} was never bound")]
    UnboundLabel(u32),

    #[error("{table} table index {index} out of range")]
    TableIndexOutOfRange { table: &'static str, index: usize },

    #[error("{table} table entry {index} was never set")]
    MissingTableEntry { table: &'static str, index: usize },

    #[error("{0} table was not started")]
    TableNotStarted(&'static str),

    #[error("method {0} has no code")]
    NoCode(String),

    #[error("no instruction at position {position} in {method}")]
    InstructionNotFound { method: String, position: u32 },

    #[error("no instruction at index {pc} in {method}")]
    NoInstruction { method: String, pc: u32 },

    #[error("inconsistent local variable table for method {0}")]
    InconsistentLocalVarTable(String),

    #[error("cannot create a call stub for {0}: no declaring class")]
    StubWithoutClass(String),

    #[error("operand stack underflow in {method}")]
    StackUnderflow { method: String },

    #[error("local slot {slot} out of range in {method}")]
    LocalOutOfRange { method: String, slot: usize },

    #[error("thread {0} has no active frame")]
    NoActiveFrame(ThreadId),

    #[error("no such thread {0}")]
    NoSuchThread(ThreadId),

    #[error("no class runtime state for {0:?}")]
    NoSuchClassId(ClassId),

    #[error("class {0} not found")]
    NoSuchClass(String),

    #[error("method {0} not found")]
    NoSuchMethod(String),

    #[error("field {0} not found")]
    NoSuchField(String),

    #[error("dangling object reference {0:?}")]
    DanglingReference(ObjRef),

    #[error("object {obj:?} is not {expected}")]
    WrongObjectKind { obj: ObjRef, expected: &'static str },

    #[error("nondeterministic source {0} has an unsupported signature")]
    MalformedNondet(String),

    #[error("the VM has not been started")]
    NotStarted,

    #[error("the VM was already started")]
    AlreadyStarted,

    #[error("host call on thread {0} cannot complete without a scheduling decision")]
    HostCallSuspended(ThreadId),

    #[error("choice generator {0} has no current choice")]
    NoChoiceSelected(String),

    #[error("unhandled exception {class}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    UnhandledException {
        class: String,
        message: Option<String>,
    },
}
