//! Built-in target programs.
//!
//! Each demo is a small multi-threaded or nondeterministic program with a
//! known outcome, assembled with the code builder.

use anyhow::Result;
use strand_vm::{ClassDecl, ClassId, CodeBuilder, Modifiers, NondetSource, Opcode, Program};

pub const MAIN: &str = "demo/Main";
const WORKER: &str = "demo/Worker";
const OBJECT: &str = "java/lang/Object";
const THREAD: &str = "java/lang/Thread";
const LOCK: &str = "Ljava/lang/Object;";

pub struct Demo {
    pub name: &'static str,
    pub about: &'static str,
    build: fn() -> Result<Program>,
}

impl Demo {
    pub fn build(&self) -> Result<Program> {
        (self.build)()
    }
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "racy-counter",
        about: "two threads increment a shared counter without a lock",
        build: racy_counter,
    },
    Demo {
        name: "sync-counter",
        about: "the same counter, incremented in a static synchronized method",
        build: sync_counter,
    },
    Demo {
        name: "deadlock",
        about: "two threads take two locks in opposite order",
        build: deadlock,
    },
    Demo {
        name: "nondet",
        about: "main picks three values in [0, 2] and asserts they are not all equal",
        build: nondet,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|d| d.name == name)
}

fn main_class(p: &mut Program, statics: &[(&str, &str)]) -> Result<ClassId> {
    let decl = statics
        .iter()
        .fold(ClassDecl::new(MAIN), |d, (name, desc)| d.field(name, desc, Modifiers::STATIC));
    Ok(p.declare_class(decl)?)
}

fn define(
    p: &mut Program,
    class: ClassId,
    name: &str,
    modifiers: Modifiers,
    max_locals: u16,
    body: impl FnOnce(&mut CodeBuilder),
) -> Result<()> {
    p.define_method(class, name, "()V", modifiers, max_locals, 4, body)?;
    Ok(())
}

fn worker(p: &mut Program, class: &str, body: impl FnOnce(&mut CodeBuilder)) -> Result<()> {
    let id = p.declare_class(ClassDecl::new(class).extends(THREAD))?;
    define(p, id, "run", Modifiers::PUBLIC, 1, body)
}

fn new_lock(cb: &mut CodeBuilder, field: &str) {
    cb.new_object(OBJECT)
        .op(Opcode::Dup)
        .invoke(Opcode::InvokeSpecial, OBJECT, "<init>", "()V")
        .field(Opcode::PutStatic, MAIN, field, LOCK);
}

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

/// Assert that comparing the top two ints with `op` takes the branch.
fn assert_branch(cb: &mut CodeBuilder, op: Opcode, message: &str) {
    let taken = cb.new_label();
    let done = cb.new_label();
    cb.branch(op, taken).iconst(0).goto(done);
    cb.bind(taken);
    cb.iconst(1);
    cb.bind(done);
    cb.assert_true(message);
}

fn increment(cb: &mut CodeBuilder) {
    cb.field(Opcode::GetStatic, MAIN, "count", "I")
        .iconst(1)
        .op(Opcode::IAdd)
        .field(Opcode::PutStatic, MAIN, "count", "I");
}

fn counter_main(cb: &mut CodeBuilder) {
    start_and_join(cb, &[WORKER, WORKER]);
    cb.field(Opcode::GetStatic, MAIN, "count", "I").iconst(2);
    assert_branch(cb, Opcode::IfICmpEq, "count == 2");
    cb.op(Opcode::Return);
}

fn racy_counter() -> Result<Program> {
    let mut p = Program::new();
    let main = main_class(&mut p, &[("count", "I")])?;
    worker(&mut p, WORKER, |cb| {
        increment(cb);
        cb.op(Opcode::Return);
    })?;
    define(&mut p, main, "main", Modifiers::PUBLIC | Modifiers::STATIC, 2, counter_main)?;
    Ok(p)
}

fn sync_counter() -> Result<Program> {
    let mut p = Program::new();
    let main = main_class(&mut p, &[("count", "I")])?;
    define(
        &mut p,
        main,
        "inc",
        Modifiers::STATIC | Modifiers::SYNCHRONIZED,
        0,
        |cb| {
            increment(cb);
            cb.op(Opcode::Return);
        },
    )?;
    worker(&mut p, WORKER, |cb| {
        cb.invoke(Opcode::InvokeStatic, MAIN, "inc", "()V").op(Opcode::Return);
    })?;
    define(&mut p, main, "main", Modifiers::PUBLIC | Modifiers::STATIC, 2, counter_main)?;
    Ok(p)
}

fn deadlock() -> Result<Program> {
    let mut p = Program::new();
    let main = main_class(&mut p, &[("left", LOCK), ("right", LOCK)])?;
    for (class, first, second) in [
        ("demo/LeftFirst", "left", "right"),
        ("demo/RightFirst", "right", "left"),
    ] {
        worker(&mut p, class, |cb| {
            for field in [first, second] {
                cb.field(Opcode::GetStatic, MAIN, field, LOCK).op(Opcode::MonitorEnter);
            }
            for field in [second, first] {
                cb.field(Opcode::GetStatic, MAIN, field, LOCK).op(Opcode::MonitorExit);
            }
            cb.op(Opcode::Return);
        })?;
    }
    define(&mut p, main, "main", Modifiers::PUBLIC | Modifiers::STATIC, 2, |cb| {
        new_lock(cb, "left");
        new_lock(cb, "right");
        start_and_join(cb, &["demo/LeftFirst", "demo/RightFirst"]);
        cb.op(Opcode::Return);
    })?;
    Ok(p)
}

fn nondet() -> Result<Program> {
    let mut p = Program::new();
    let main = main_class(&mut p, &[])?;
    let verify = p.declare_class(ClassDecl::new("demo/Verify"))?;
    let mut random_int = p.new_method(
        verify,
        "randomInt",
        "(II)I",
        2,
        0,
        Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::NATIVE,
    )?;
    random_int.ext_mut().insert(NondetSource::default());
    p.add_method(random_int)?;

    define(&mut p, main, "main", Modifiers::PUBLIC | Modifiers::STATIC, 3, |cb| {
        for slot in 0..3 {
            cb.iconst(0)
                .iconst(2)
                .invoke(Opcode::InvokeStatic, "demo/Verify", "randomInt", "(II)I")
                .local(Opcode::IStore, slot);
        }
        // a == b && b == c fails
        let differ = cb.new_label();
        let done = cb.new_label();
        cb.local(Opcode::ILoad, 0)
            .local(Opcode::ILoad, 1)
            .branch(Opcode::IfICmpNe, differ)
            .local(Opcode::ILoad, 1)
            .local(Opcode::ILoad, 2)
            .branch(Opcode::IfICmpNe, differ)
            .iconst(0)
            .goto(done);
        cb.bind(differ);
        cb.iconst(1);
        cb.bind(done);
        cb.assert_true("values not all equal").op(Opcode::Return);
    })?;
    Ok(p)
}
