//! Program builders and drivers shared by the interpreter tests.

#![allow(dead_code)]

use std::sync::Arc;

use strand_vm::{
    ChoiceGenerator, ClassDecl, ClassId, Modifiers, NondetSource, ObjRef, Opcode, Program,
    TransitionEnd, UncaughtException, Vm, VmConfig,
};

pub const MAIN: &str = "app/Main";
pub const WORKER: &str = "app/Worker";

/// Program with an empty `app/Main` carrying an int static `count`.
pub fn program() -> (Program, ClassId) {
    let mut p = Program::new();
    let main = p
        .declare_class(ClassDecl::new(MAIN).field("count", "I", Modifiers::STATIC))
        .unwrap();
    (p, main)
}

pub fn vm(program: Program) -> Vm {
    Vm::new(Arc::new(program), VmConfig::default())
}

pub fn started(program: Program) -> Vm {
    let mut vm = vm(program);
    vm.start(MAIN).unwrap();
    vm
}

/// Follow choice `pick(cg)` at every choice point until the path ends.
pub fn run_path(vm: &mut Vm, mut pick: impl FnMut(&ChoiceGenerator) -> usize) -> TransitionEnd {
    let mut end = TransitionEnd::ChoicePoint;
    while let Some(mut cg) = vm.take_pending_choice() {
        let i = pick(&cg);
        cg.select(i).expect("choice index out of range");
        end = vm.execute_transition(&cg).unwrap();
    }
    end
}

pub fn run_first_choices(vm: &mut Vm) -> TransitionEnd {
    run_path(vm, |_| 0)
}

/// Take first choices until a transition ends in an uncaught exception.
pub fn run_until_escape(vm: &mut Vm) -> Option<UncaughtException> {
    while let Some(mut cg) = vm.take_pending_choice() {
        cg.select(0).expect("empty choice generator");
        if vm.execute_transition(&cg).unwrap() == TransitionEnd::UncaughtException {
            return vm.uncaught_exception().cloned();
        }
    }
    None
}

pub fn static_slot(vm: &Vm, class: &str, field: &str) -> u64 {
    let program = vm.program();
    let id = program.class_id(class).unwrap();
    let (owner, f) = program.find_static_field(id, field).unwrap();
    let obj = vm.kernel().class_object(owner).unwrap();
    vm.kernel().object(obj).unwrap().fields().unwrap()[f.slot]
}

pub fn static_int(vm: &Vm, class: &str, field: &str) -> i32 {
    static_slot(vm, class, field) as i64 as i32
}

/// `app/Worker extends Thread` whose `run()` increments `Main.count`
/// without synchronization.
pub fn add_racy_worker(p: &mut Program) {
    let worker = p.declare_class(ClassDecl::new(WORKER).extends("java/lang/Thread")).unwrap();
    p.define_method(worker, "run", "()V", Modifiers::PUBLIC, 1, 2, |cb| {
        cb.field(Opcode::GetStatic, MAIN, "count", "I")
            .iconst(1)
            .op(Opcode::IAdd)
            .field(Opcode::PutStatic, MAIN, "count", "I")
            .op(Opcode::Return);
    })
    .unwrap();
}

/// `main()` that starts two workers, joins them and asserts `count == 2`.
pub fn add_two_worker_main(p: &mut Program, main: ClassId) {
    p.define_method(main, "main", "()V", Modifiers::PUBLIC | Modifiers::STATIC, 2, 3, |cb| {
        for slot in 0..2 {
            cb.new_object(WORKER)
                .op(Opcode::Dup)
                .invoke(Opcode::InvokeSpecial, WORKER, "<init>", "()V")
                .local(Opcode::AStore, slot);
        }
        for slot in 0..2 {
            cb.local(Opcode::ALoad, slot).op(Opcode::ThreadStart);
        }
        for slot in 0..2 {
            cb.local(Opcode::ALoad, slot).op(Opcode::ThreadJoin);
        }
        let fail = cb.new_label();
        let check = cb.new_label();
        cb.field(Opcode::GetStatic, MAIN, "count", "I")
            .iconst(2)
            .branch(Opcode::IfICmpNe, fail)
            .iconst(1)
            .goto(check);
        cb.bind(fail);
        cb.iconst(0);
        cb.bind(check);
        cb.assert_true("count == 2").op(Opcode::Return);
    })
    .unwrap();
}

pub fn racy_counter() -> Program {
    let (mut p, main) = program();
    add_racy_worker(&mut p);
    add_two_worker_main(&mut p, main);
    p
}

/// Native `app/Verify.randomInt(II)I` acting as a nondeterministic source.
pub fn add_verify(p: &mut Program) -> ClassId {
    let verify = p.declare_class(ClassDecl::new("app/Verify")).unwrap();
    let mut mi = p
        .new_method(
            verify,
            "randomInt",
            "(II)I",
            2,
            0,
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::NATIVE,
        )
        .unwrap();
    mi.ext_mut().insert(NondetSource::default());
    p.add_method(mi).unwrap();
    verify
}

pub fn obj(slot: u64) -> ObjRef {
    ObjRef::from_slot(slot)
}
