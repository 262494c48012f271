//! The interpreter: transition loop, scheduling, snapshots and host calls.
//!
//! A transition starts from one choice picked by the search and runs
//! instructions until the next choice point, the end of the program or
//! an uncaught exception. Before an instruction runs, the scheduler asks
//! whether it is scheduling relevant; if so a thread choice generator is
//! registered and the transition stops in front of it. The first
//! instruction of every transition skips that check, since its scheduling
//! point is the one that was just resolved.

mod snapshot;
mod state;
mod types;

use std::mem;
use std::sync::Arc;

use strand_common_core::Modifiers;

pub use snapshot::VmSnapshot;
pub use state::{ChoiceRecord, SystemState};
pub use types::{
    EnterOutcome, Flow, TransitionEnd, UncaughtException, VmConfig, VmError, VmEvent,
};

use crate::bytecode::{builtin, Program};
use crate::choice::{Choice, ChoiceGenerator};
use crate::exec::{self, call, ExecCtx, StepOutcome};
use crate::heap::ObjRef;
use crate::kernel::KernelState;
use crate::listener::{self, VmListener};
use crate::method::MethodInfo;
use crate::sched;
use crate::thread::{StackFrame, ThreadId, ThreadInfo};

pub struct Vm {
    program: Arc<Program>,
    config: VmConfig,
    kernel: KernelState,
    system: SystemState,
    pending: Option<ChoiceGenerator>,
    listeners: Vec<Box<dyn VmListener>>,
    events: Vec<VmEvent>,
    /// Thread and stack depth of the host call in progress.
    host_call: Option<(ThreadId, usize)>,
    host_escape: Option<UncaughtException>,
}

impl Vm {
    pub fn new(program: Arc<Program>, config: VmConfig) -> Self {
        let kernel = KernelState::new(&program);
        Self {
            program,
            config,
            kernel,
            system: SystemState::default(),
            pending: None,
            listeners: Vec::new(),
            events: Vec::new(),
            host_call: None,
            host_escape: None,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn VmListener>) {
        self.listeners.push(listener);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[inline]
    pub fn kernel(&self) -> &KernelState {
        &self.kernel
    }

    #[inline]
    pub fn system(&self) -> &SystemState {
        &self.system
    }

    #[inline]
    pub fn current_thread(&self) -> ThreadId {
        self.system.current_thread
    }

    pub fn thread(&self, tid: ThreadId) -> Result<&ThreadInfo, VmError> {
        self.kernel.thread(tid)
    }

    pub fn thread_mut(&mut self, tid: ThreadId) -> Result<&mut ThreadInfo, VmError> {
        self.kernel.thread_mut(tid)
    }

    pub fn is_started(&self) -> bool {
        self.system.started
    }

    pub fn is_end_state(&self) -> bool {
        self.kernel.is_end_state()
    }

    pub fn is_deadlocked(&self) -> bool {
        self.kernel.is_deadlocked()
    }

    /// Exception that escaped a thread in the last transition.
    pub fn uncaught_exception(&self) -> Option<&UncaughtException> {
        self.system.uncaught.as_ref()
    }

    /// No transition can follow this state.
    pub fn is_terminal(&self) -> bool {
        self.is_end_state() || self.is_deadlocked()
    }

    /// Choices taken on the current path.
    #[inline]
    pub fn path_length(&self) -> usize {
        self.system.path_length()
    }

    pub fn trail(&self) -> &[ChoiceRecord] {
        &self.system.trail
    }

    pub fn fingerprint(&self) -> u64 {
        self.kernel.fingerprint()
    }

    // =========================================================================
    // Choices and transitions
    // =========================================================================

    /// Create the main thread and register the root choice generator.
    /// `main_class` must declare `main([Ljava/lang/String;)V` or `main()V`.
    pub fn start(&mut self, main_class: &str) -> Result<(), VmError> {
        if self.system.started {
            return Err(VmError::AlreadyStarted);
        }
        let program = Arc::clone(&self.program);
        let class = program.resolve_class(main_class)?;
        let main = class
            .method("main([Ljava/lang/String;)V")
            .or_else(|| class.method("main()V"))
            .ok_or_else(|| VmError::NoSuchMethod(format!("{}.main", main_class)))?;

        let thread_obj = self.new_thread_object()?;
        let tid = self.kernel.add_thread(thread_obj);
        let stub = main.create_direct_call_stub("[main]", program.factory())?;
        let mut frame = StackFrame::new(Arc::new(stub), ObjRef::NULL);
        if main.number_of_arguments() == 1 {
            frame.push_ref(ObjRef::NULL);
        }
        self.kernel.thread_mut(tid)?.push_frame(frame);
        self.system.current_thread = tid;
        self.system.started = true;
        tracing::debug!(class = main_class, thread = %tid, "vm started");

        self.events.push(VmEvent::ThreadStarted(tid));
        self.flush_events();
        self.register_choice(ChoiceGenerator::threads("root", vec![tid]));
        Ok(())
    }

    pub fn has_pending_choice(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_choice(&self) -> Option<&ChoiceGenerator> {
        self.pending.as_ref()
    }

    /// Hand the pending choice generator to the search.
    pub fn take_pending_choice(&mut self) -> Option<ChoiceGenerator> {
        self.pending.take()
    }

    /// Run from the current choice of `cg` to the next stopping point.
    pub fn execute_transition(&mut self, cg: &ChoiceGenerator) -> Result<TransitionEnd, VmError> {
        if !self.system.started {
            return Err(VmError::NotStarted);
        }
        let choice = cg
            .current()
            .ok_or_else(|| VmError::NoChoiceSelected(cg.id().to_string()))?;
        self.pending = None;
        match choice {
            Choice::Thread(t) => self.system.current_thread = t,
            data => self.system.current_choice = Some(data),
        }
        self.system.trail.push(ChoiceRecord {
            cg_id: cg.id().into(),
            choice,
            index: cg.cursor().unwrap_or(0),
            total: cg.total_choices(),
        });
        self.system.uncaught = None;
        let tid = self.system.current_thread;
        self.kernel.thread_mut(tid)?.set_first_step(true);
        tracing::trace!(cg = cg.id(), ?choice, depth = self.path_length(), "transition");
        self.run_transition()
    }

    fn run_transition(&mut self) -> Result<TransitionEnd, VmError> {
        let program = Arc::clone(&self.program);
        let mut steps = 0usize;
        loop {
            let tid = self.system.current_thread;
            let thread = self.kernel.thread(tid)?;
            if !thread.is_runnable() {
                if let Some(end) = self.reschedule()? {
                    return Ok(end);
                }
                continue;
            }

            if !thread.is_first_step() {
                let frame = thread.top_frame()?;
                let insn = frame
                    .current_instruction()
                    .ok_or_else(|| no_instruction(frame))?;
                let relevant = !self.config.is_atomic(frame.method())
                    && insn.is_scheduling_relevant(&program, &self.kernel, tid);
                let forced = self.config.max_transition_length > 0
                    && steps >= self.config.max_transition_length;
                if relevant || forced {
                    let id = if relevant {
                        sched::choice_id(insn.op)
                    } else {
                        "maxTransitionLength"
                    };
                    let cg = sched::thread_choice(&self.kernel, id);
                    self.register_choice(cg);
                    return Ok(TransitionEnd::ChoicePoint);
                }
            }

            let escaped = self.step(tid)?;
            steps += 1;
            if escaped {
                // The path goes on with whoever can still run.
                if !self.kernel.runnable_threads().is_empty() {
                    self.register_choice(sched::thread_choice(&self.kernel, "uncaught"));
                }
                return Ok(TransitionEnd::UncaughtException);
            }
            if self.pending.is_some() {
                return Ok(TransitionEnd::ChoicePoint);
            }
        }
    }

    /// The current thread cannot continue: pick the next one, or report
    /// why nobody can.
    fn reschedule(&mut self) -> Result<Option<TransitionEnd>, VmError> {
        let runnable = self.kernel.runnable_threads();
        match runnable.as_slice() {
            [] if self.kernel.is_deadlocked() => {
                tracing::debug!(depth = self.path_length(), "deadlock");
                Ok(Some(TransitionEnd::Deadlock))
            }
            [] => Ok(Some(TransitionEnd::EndState)),
            [only] => {
                self.system.current_thread = *only;
                self.kernel.thread_mut(*only)?.set_first_step(true);
                Ok(None)
            }
            _ => {
                let id = if self.kernel.thread(self.system.current_thread)?.is_terminated() {
                    "terminate"
                } else {
                    "blocked"
                };
                self.register_choice(sched::thread_choice(&self.kernel, id));
                Ok(Some(TransitionEnd::ChoicePoint))
            }
        }
    }

    fn register_choice(&mut self, cg: ChoiceGenerator) {
        tracing::debug!(cg = cg.id(), choices = cg.total_choices(), "choice generator registered");
        self.pending = Some(cg);
        self.notify(|l, vm| {
            if let Some(cg) = &vm.pending {
                l.choice_generator_registered(vm, cg);
            }
        });
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    fn with_ctx<R>(
        &mut self,
        tid: ThreadId,
        f: impl FnOnce(&mut ExecCtx) -> Result<R, VmError>,
    ) -> Result<R, VmError> {
        let mut ctx = ExecCtx {
            program: &self.program,
            kernel: &mut self.kernel,
            system: &mut self.system,
            config: &self.config,
            tid,
            events: &mut self.events,
            pending: &mut self.pending,
        };
        f(&mut ctx)
    }

    /// Execute one instruction on `tid`. Returns true if an exception
    /// escaped the thread.
    fn step(&mut self, tid: ThreadId) -> Result<bool, VmError> {
        let thread = self.kernel.thread_mut(tid)?;
        thread.cleanup_transients();
        thread.set_first_step(false);
        let frame = thread.top_frame()?;
        let method = Arc::clone(frame.method());
        let insn = method
            .instruction(frame.pc as usize)
            .ok_or_else(|| no_instruction(frame))?;

        self.notify(|l, vm| l.executing_instruction(vm, tid, insn));
        tracing::trace!(thread = %tid, method = %method.full_name(), pc = insn.index(), op = ?insn.op, "exec");

        let outcome = self.with_ctx(tid, |ctx| {
            let flow = exec::execute(ctx, insn)?;
            exec::apply(ctx, flow)
        })?;

        let mut escaped = false;
        match outcome {
            StepOutcome::Running => {}
            StepOutcome::Finished => self.terminate_thread(tid)?,
            StepOutcome::Escaped(record) => match self.host_call {
                Some((host, base)) if host == tid => {
                    let thread = self.kernel.thread_mut(tid)?;
                    while thread.count_stack_frames() > base {
                        thread.pop_frame();
                    }
                    self.host_escape = Some(record);
                }
                _ => {
                    self.terminate_thread(tid)?;
                    tracing::debug!(exception = %record, "uncaught exception");
                    self.system.uncaught = Some(record);
                    escaped = true;
                }
            },
        }
        self.kernel.thread_mut(tid)?.update_next_pc();

        self.flush_events();
        self.notify(|l, vm| l.instruction_executed(vm, tid, insn));
        Ok(escaped)
    }

    fn terminate_thread(&mut self, tid: ThreadId) -> Result<(), VmError> {
        self.kernel.thread_mut(tid)?.terminate();
        self.kernel.wake_joiners(tid);
        self.events.push(VmEvent::ThreadTerminated(tid));
        tracing::debug!(thread = %tid, "thread terminated");
        Ok(())
    }

    fn new_thread_object(&mut self) -> Result<ObjRef, VmError> {
        let class = self.program.resolve_class(builtin::THREAD)?;
        let creator = ThreadId(self.kernel.threads.len() as u32);
        Ok(self
            .kernel
            .heap
            .alloc_instance(class.id, class.instance_fields().len(), creator))
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    fn notify(&mut self, mut f: impl FnMut(&mut dyn VmListener, &Vm)) {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = mem::take(&mut self.listeners);
        for l in listeners.iter_mut() {
            f(l.as_mut(), self);
        }
        self.listeners = listeners;
    }

    fn flush_events(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let events = mem::take(&mut self.events);
        for event in &events {
            self.notify(|l, vm| listener::dispatch(l, vm, event));
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self) -> VmSnapshot {
        VmSnapshot {
            kernel: self.kernel.clone(),
            system: self.system.clone(),
        }
    }

    /// Replace the live state with `snapshot`. Everything created after it
    /// was taken is gone, including any pending choice generator.
    pub fn restore(&mut self, snapshot: &VmSnapshot) {
        self.kernel = snapshot.kernel.clone();
        self.system = snapshot.system.clone();
        self.pending = None;
        self.events.clear();
        self.host_escape = None;
    }

    // =========================================================================
    // Host access
    // =========================================================================

    /// A thread driven by the embedder rather than the scheduler. Its bottom
    /// frame is a codeless `[host]` method that callers push operands onto.
    pub fn attach_thread(&mut self) -> Result<ThreadId, VmError> {
        let obj = self.new_thread_object()?;
        let tid = self.kernel.add_thread(obj);
        let host = MethodInfo::new(None, "[host]", "()V", 0, 0, Modifiers::STATIC)?;
        self.kernel
            .thread_mut(tid)?
            .push_frame(StackFrame::new(Arc::new(host), ObjRef::NULL));
        Ok(tid)
    }

    pub fn push_operand(&mut self, tid: ThreadId, v: u64) -> Result<(), VmError> {
        self.kernel.thread_mut(tid)?.top_frame_mut()?.push(v);
        Ok(())
    }

    /// Allocate an instance of `class` created by `tid`, without running a
    /// constructor.
    pub fn new_object(&mut self, tid: ThreadId, class: &str) -> Result<ObjRef, VmError> {
        let program = Arc::clone(&self.program);
        let class = program.resolve_class(class)?.id;
        self.with_ctx(tid, |ctx| ctx.new_instance(class))
    }

    /// Method-entry protocol on `tid` with the arguments already pushed.
    pub fn enter_method(&mut self, tid: ThreadId, method: &Arc<MethodInfo>) -> Result<EnterOutcome, VmError> {
        let outcome = self.with_ctx(tid, |ctx| call::enter(ctx, method))?;
        self.flush_events();
        Ok(outcome)
    }

    /// Method-exit protocol: pop the top frame of `tid`.
    pub fn leave_method(&mut self, tid: ThreadId) -> Result<(), VmError> {
        self.with_ctx(tid, |ctx| call::leave(ctx).map(drop))?;
        self.flush_events();
        Ok(())
    }

    /// Could `tid` enter `method` right now without blocking? Arguments
    /// must be on `tid`'s operand stack.
    pub fn can_enter(&self, tid: ThreadId, method: &MethodInfo) -> Result<bool, VmError> {
        if !method.is_synchronized() {
            return Ok(true);
        }
        let this_ref = if method.is_static() {
            ObjRef::NULL
        } else {
            self.kernel
                .thread(tid)?
                .top_frame()?
                .peek_ref(method.arguments_size() - 1)?
        };
        let target = call::lock_target(&self.kernel, method, this_ref)?;
        self.kernel.can_lock(target, tid)
    }

    /// Run `method` to completion on `tid` through a direct-call stub and
    /// return the slots it left behind. `args` are in push order.
    pub fn call_direct(&mut self, tid: ThreadId, method: &MethodInfo, args: &[u64]) -> Result<Vec<u64>, VmError> {
        let stub = method.create_direct_call_stub("[direct]", self.program.factory())?;
        self.run_host_call(tid, stub, args)
    }

    /// Like `call_direct`, through a reflection-call stub.
    pub fn call_reflective(&mut self, tid: ThreadId, method: &MethodInfo, args: &[u64]) -> Result<Vec<u64>, VmError> {
        let stub = method.create_reflection_call_stub(self.program.factory())?;
        self.run_host_call(tid, stub, args)
    }

    fn run_host_call(&mut self, tid: ThreadId, stub: MethodInfo, args: &[u64]) -> Result<Vec<u64>, VmError> {
        let mut frame = StackFrame::new(Arc::new(stub), ObjRef::NULL);
        for &a in args {
            frame.push(a);
        }
        let thread = self.kernel.thread_mut(tid)?;
        let base = thread.count_stack_frames();
        thread.push_frame(frame);

        let outer = self.host_call.replace((tid, base));
        let result = self.drive_host_call(tid, base);
        self.host_call = outer;
        if result.is_err() {
            let thread = self.kernel.thread_mut(tid)?;
            while thread.count_stack_frames() > base {
                thread.pop_frame();
            }
        }
        result
    }

    fn drive_host_call(&mut self, tid: ThreadId, base: usize) -> Result<Vec<u64>, VmError> {
        loop {
            if !self.kernel.thread(tid)?.is_runnable() || self.pending.is_some() {
                self.pending = None;
                return Err(VmError::HostCallSuspended(tid));
            }
            self.step(tid)?;
            if let Some(record) = self.host_escape.take() {
                return Err(VmError::UnhandledException {
                    class: record.class_name.replace('/', "."),
                    message: record.message.map(|m| m.to_string()),
                });
            }
            let thread = self.kernel.thread(tid)?;
            if thread.count_stack_frames() <= base {
                return Ok(thread
                    .transient()
                    .direct_call_result
                    .clone()
                    .unwrap_or_default());
            }
        }
    }
}

fn no_instruction(frame: &StackFrame) -> VmError {
    VmError::NoInstruction {
        method: frame.method().full_name(),
        pc: frame.pc,
    }
}
