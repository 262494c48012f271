//! Interpreter notifications.
//!
//! Listeners get a shared `&Vm` and may query anything, but they cannot
//! mutate interpreter state from inside a notification.

use crate::choice::ChoiceGenerator;
use crate::heap::ObjRef;
use crate::instruction::Instruction;
use crate::method::MethodInfo;
use crate::thread::ThreadId;
use crate::vm::{Vm, VmEvent};

#[allow(unused_variables)]
pub trait VmListener {
    fn executing_instruction(&mut self, vm: &Vm, thread: ThreadId, insn: &Instruction) {}

    fn instruction_executed(&mut self, vm: &Vm, thread: ThreadId, insn: &Instruction) {}

    fn method_entered(&mut self, vm: &Vm, thread: ThreadId, method: &MethodInfo) {}

    fn method_exited(&mut self, vm: &Vm, thread: ThreadId, method: &MethodInfo) {}

    fn choice_generator_registered(&mut self, vm: &Vm, cg: &ChoiceGenerator) {}

    fn thread_started(&mut self, vm: &Vm, thread: ThreadId) {}

    fn thread_terminated(&mut self, vm: &Vm, thread: ThreadId) {}

    fn object_locked(&mut self, vm: &Vm, thread: ThreadId, obj: ObjRef) {}

    fn object_unlocked(&mut self, vm: &Vm, thread: ThreadId, obj: ObjRef) {}

    fn exception_thrown(&mut self, vm: &Vm, thread: ThreadId, exception: ObjRef) {}
}

pub(crate) fn dispatch(listener: &mut dyn VmListener, vm: &Vm, event: &VmEvent) {
    match event {
        VmEvent::MethodEntered(t, m) => listener.method_entered(vm, *t, m),
        VmEvent::MethodExited(t, m) => listener.method_exited(vm, *t, m),
        VmEvent::ObjectLocked(t, o) => listener.object_locked(vm, *t, *o),
        VmEvent::ObjectUnlocked(t, o) => listener.object_unlocked(vm, *t, *o),
        VmEvent::ThreadStarted(t) => listener.thread_started(vm, *t),
        VmEvent::ThreadTerminated(t) => listener.thread_terminated(vm, *t),
        VmEvent::ExceptionThrown(t, e) => listener.exception_thrown(vm, *t, *e),
    }
}
