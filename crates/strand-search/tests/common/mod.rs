//! Target programs and helpers shared by the search tests.

#![allow(dead_code)]

use std::sync::Arc;

use strand_search::{SearchConfig, SearchCore};
use strand_vm::{
    ClassDecl, ClassId, CodeBuilder, Modifiers, NondetSource, Opcode, Program, Vm, VmConfig,
};

pub const MAIN: &str = "app/Main";
pub const WORKER: &str = "app/Worker";
const OBJECT: &str = "java/lang/Object";
const LOCK: &str = "Ljava/lang/Object;";

fn program(statics: &[(&str, &str)]) -> (Program, ClassId) {
    let mut decl = ClassDecl::new(MAIN);
    for (name, descriptor) in statics {
        decl = decl.field(name, descriptor, Modifiers::STATIC);
    }
    let mut p = Program::new();
    let main = p.declare_class(decl).unwrap();
    (p, main)
}

fn define_main(p: &mut Program, main: ClassId, max_locals: u16, body: impl FnOnce(&mut CodeBuilder)) {
    p.define_method(main, "main", "()V", Modifiers::PUBLIC | Modifiers::STATIC, max_locals, 4, body)
        .unwrap();
}

fn define_worker(p: &mut Program, class: &str, body: impl FnOnce(&mut CodeBuilder)) {
    let worker = p.declare_class(ClassDecl::new(class).extends("java/lang/Thread")).unwrap();
    p.define_method(worker, "run", "()V", Modifiers::PUBLIC, 1, 3, body).unwrap();
}

/// Store a fresh `Object` in static `Main.<field>`.
fn new_lock(cb: &mut CodeBuilder, field: &str) {
    cb.new_object(OBJECT)
        .op(Opcode::Dup)
        .invoke(Opcode::InvokeSpecial, OBJECT, "<init>", "()V")
        .field(Opcode::PutStatic, MAIN, field, LOCK);
}

/// Create one thread per class in `workers`, start them all, then join
/// them all. Uses locals `0..workers.len()`.
fn start_and_join(cb: &mut CodeBuilder, workers: &[&str]) {
    for (slot, class) in workers.iter().enumerate() {
        cb.new_object(class)
            .op(Opcode::Dup)
            .invoke(Opcode::InvokeSpecial, class, "<init>", "()V")
            .local(Opcode::AStore, slot as u16);
    }
    for slot in 0..workers.len() {
        cb.local(Opcode::ALoad, slot as u16).op(Opcode::ThreadStart);
    }
    for slot in 0..workers.len() {
        cb.local(Opcode::ALoad, slot as u16).op(Opcode::ThreadJoin);
    }
}

/// Compare the top two ints with `op` and push 1 if the branch is taken,
/// else 0.
fn push_if(cb: &mut CodeBuilder, op: Opcode) {
    let taken = cb.new_label();
    let done = cb.new_label();
    cb.branch(op, taken).iconst(0).goto(done);
    cb.bind(taken);
    cb.iconst(1);
    cb.bind(done);
}

fn assert_count_is_two(cb: &mut CodeBuilder) {
    cb.field(Opcode::GetStatic, MAIN, "count", "I").iconst(2);
    push_if(cb, Opcode::IfICmpEq);
    cb.assert_true("count == 2");
}

/// Two threads increment `Main.count` without synchronization; main
/// asserts the count afterwards. Some interleaving loses an update.
pub fn racy_counter() -> Program {
    let (mut p, main) = program(&[("count", "I")]);
    define_worker(&mut p, WORKER, |cb| {
        cb.field(Opcode::GetStatic, MAIN, "count", "I")
            .iconst(1)
            .op(Opcode::IAdd)
            .field(Opcode::PutStatic, MAIN, "count", "I")
            .op(Opcode::Return);
    });
    define_main(&mut p, main, 2, |cb| {
        start_and_join(cb, &[WORKER, WORKER]);
        assert_count_is_two(cb);
        cb.op(Opcode::Return);
    });
    p
}

/// Same as `racy_counter`, with the increment guarded by `Main.lock`.
pub fn sync_counter() -> Program {
    let (mut p, main) = program(&[("count", "I"), ("lock", LOCK)]);
    define_worker(&mut p, WORKER, |cb| {
        cb.field(Opcode::GetStatic, MAIN, "lock", LOCK)
            .op(Opcode::MonitorEnter)
            .field(Opcode::GetStatic, MAIN, "count", "I")
            .iconst(1)
            .op(Opcode::IAdd)
            .field(Opcode::PutStatic, MAIN, "count", "I")
            .field(Opcode::GetStatic, MAIN, "lock", LOCK)
            .op(Opcode::MonitorExit)
            .op(Opcode::Return);
    });
    define_main(&mut p, main, 2, |cb| {
        new_lock(cb, "lock");
        start_and_join(cb, &[WORKER, WORKER]);
        assert_count_is_two(cb);
        cb.op(Opcode::Return);
    });
    p
}

/// Two threads take `lockA` and `lockB` in opposite order.
pub fn deadlock() -> Program {
    let (mut p, main) = program(&[("lockA", LOCK), ("lockB", LOCK)]);
    for (class, first, second) in [
        ("app/WorkerAB", "lockA", "lockB"),
        ("app/WorkerBA", "lockB", "lockA"),
    ] {
        define_worker(&mut p, class, |cb| {
            cb.field(Opcode::GetStatic, MAIN, first, LOCK)
                .op(Opcode::MonitorEnter)
                .field(Opcode::GetStatic, MAIN, second, LOCK)
                .op(Opcode::MonitorEnter)
                .field(Opcode::GetStatic, MAIN, second, LOCK)
                .op(Opcode::MonitorExit)
                .field(Opcode::GetStatic, MAIN, first, LOCK)
                .op(Opcode::MonitorExit)
                .op(Opcode::Return);
        });
    }
    define_main(&mut p, main, 2, |cb| {
        new_lock(cb, "lockA");
        new_lock(cb, "lockB");
        start_and_join(cb, &["app/WorkerAB", "app/WorkerBA"]);
        cb.op(Opcode::Return);
    });
    p
}

/// Main draws two values from `Verify.randomInt(0, 1)` and asserts they
/// are not both 1.
pub fn nondet_pair() -> Program {
    let (mut p, main) = program(&[]);
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

    define_main(&mut p, main, 2, |cb| {
        for slot in 0..2 {
            cb.iconst(0)
                .iconst(1)
                .invoke(Opcode::InvokeStatic, "app/Verify", "randomInt", "(II)I")
                .local(Opcode::IStore, slot);
        }
        cb.local(Opcode::ILoad, 0)
            .local(Opcode::ILoad, 1)
            .op(Opcode::IAdd)
            .iconst(2);
        push_if(cb, Opcode::IfICmpNe);
        cb.assert_true("not both").op(Opcode::Return);
    });
    p
}

/// Main starts two workers that both fail an assertion, then joins them.
pub fn two_escapes() -> Program {
    let (mut p, main) = program(&[]);
    define_worker(&mut p, WORKER, |cb| {
        cb.iconst(0).assert_true("worker done").op(Opcode::Return);
    });
    define_main(&mut p, main, 2, |cb| {
        start_and_join(cb, &[WORKER, WORKER]);
        cb.op(Opcode::Return);
    });
    p
}

/// Main starts one thread whose `run()` does nothing.
pub fn single_worker() -> Program {
    let (mut p, main) = program(&[]);
    define_worker(&mut p, WORKER, |cb| {
        cb.op(Opcode::Return);
    });
    define_main(&mut p, main, 1, |cb| {
        cb.new_object(WORKER)
            .op(Opcode::Dup)
            .invoke(Opcode::InvokeSpecial, WORKER, "<init>", "()V")
            .local(Opcode::AStore, 0)
            .local(Opcode::ALoad, 0)
            .op(Opcode::ThreadStart)
            .op(Opcode::Return);
    });
    p
}

pub fn started(program: Program) -> Vm {
    started_with(program, VmConfig::default())
}

pub fn started_with(program: Program, vm_config: VmConfig) -> Vm {
    let mut vm = Vm::new(Arc::new(program), vm_config);
    vm.start(MAIN).unwrap();
    vm
}

pub fn core(program: Program, config: SearchConfig) -> SearchCore {
    SearchCore::new(started(program), config)
}

pub fn core_with(program: Program, vm_config: VmConfig, config: SearchConfig) -> SearchCore {
    SearchCore::new(started_with(program, vm_config), config)
}

/// Exhaustive search that explores every choice of every choice point,
/// without state matching.
pub fn all_paths(config: SearchConfig) -> SearchConfig {
    SearchConfig {
        stop_on_first_error: false,
        state_matching: false,
        ..config
    }
}

/// Count paths by plain recursion over snapshots.
pub fn count_paths(vm: &mut Vm) -> usize {
    let Some(cg) = vm.take_pending_choice() else {
        return 1;
    };
    let before = vm.snapshot();
    let mut paths = 0;
    for i in 0..cg.total_choices() {
        vm.restore(&before);
        let mut cg = cg.clone();
        cg.select(i).unwrap();
        vm.execute_transition(&cg).unwrap();
        paths += count_paths(vm);
    }
    paths
}
