//! Calls made by the embedder through firewalled stubs.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use strand_vm::{builtin, ClassDecl, MethodInfo, Modifiers, Opcode, Program, Vm, VmError};

struct Calc {
    vm: Vm,
    div: Arc<MethodInfo>,
    safe_div: Arc<MethodInfo>,
    widen: Arc<MethodInfo>,
    next: Arc<MethodInfo>,
}

fn calc() -> Calc {
    let mut p = Program::new();
    let class = p
        .declare_class(ClassDecl::new("app/Calc").field("base", "I", Modifiers::empty()))
        .unwrap();
    let statik = Modifiers::PUBLIC | Modifiers::STATIC;
    let div = p
        .define_method(class, "div", "(II)I", statik, 2, 2, |cb| {
            cb.local(Opcode::ILoad, 0)
                .local(Opcode::ILoad, 1)
                .op(Opcode::IDiv)
                .op(Opcode::IReturn);
        })
        .unwrap();
    let safe_div = p
        .define_method(class, "safeDiv", "(II)I", statik, 2, 2, |cb| {
            let start = cb.new_label();
            let end = cb.new_label();
            let handler = cb.new_label();
            cb.bind(start);
            cb.local(Opcode::ILoad, 0)
                .local(Opcode::ILoad, 1)
                .invoke(Opcode::InvokeStatic, "app/Calc", "div", "(II)I");
            cb.bind(end);
            cb.op(Opcode::IReturn);
            cb.bind(handler);
            cb.op(Opcode::Pop).iconst(-1).op(Opcode::IReturn);
            cb.handler(start, end, handler, Some(builtin::ARITHMETIC));
        })
        .unwrap();
    let widen = p
        .define_method(class, "widen", "(I)J", statik, 1, 2, |cb| {
            cb.local(Opcode::ILoad, 0).op(Opcode::I2L).op(Opcode::LReturn);
        })
        .unwrap();
    let next = p
        .define_method(class, "next", "()I", Modifiers::PUBLIC, 1, 2, |cb| {
            cb.local(Opcode::ALoad, 0)
                .field(Opcode::GetField, "app/Calc", "base", "I")
                .iconst(1)
                .op(Opcode::IAdd)
                .op(Opcode::IReturn);
        })
        .unwrap();
    Calc {
        vm: common::vm(p),
        div,
        safe_div,
        widen,
        next,
    }
}

fn int_slot(v: i32) -> u64 {
    v as i64 as u64
}

#[test]
fn test_direct_call_returns_result_slots() {
    let Calc { mut vm, div, widen, .. } = calc();
    let t = vm.attach_thread().unwrap();
    let got = vm.call_direct(t, &div, &[int_slot(-9), int_slot(3)]).unwrap();
    assert_eq!(got, vec![int_slot(-3)]);

    let got = vm.call_direct(t, &widen, &[int_slot(-2)]).unwrap();
    assert_eq!(got, vec![-2i64 as u64, 0]);
    assert_eq!(vm.thread(t).unwrap().count_stack_frames(), 1);
}

#[test]
fn test_handled_exception_stays_inside_the_call() {
    let Calc { mut vm, safe_div, .. } = calc();
    let t = vm.attach_thread().unwrap();
    let got = vm.call_reflective(t, &safe_div, &[int_slot(4), 0]).unwrap();
    assert_eq!(got, vec![int_slot(-1)]);
}

#[test]
fn test_escaping_exception_becomes_unhandled() {
    let Calc { mut vm, div, .. } = calc();
    let t = vm.attach_thread().unwrap();
    let err = vm.call_direct(t, &div, &[int_slot(4), 0]).unwrap_err();
    match err {
        VmError::UnhandledException { class, message } => {
            assert_eq!(class, "java.lang.ArithmeticException");
            assert_eq!(message.as_deref(), Some("/ by zero"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    // The host thread survives and can call again.
    assert!(vm.thread(t).unwrap().is_runnable());
    assert_eq!(vm.thread(t).unwrap().count_stack_frames(), 1);
    assert!(vm.uncaught_exception().is_none());
    assert_eq!(vm.call_direct(t, &div, &[int_slot(8), int_slot(2)]).unwrap(), vec![int_slot(4)]);
}

#[test]
fn test_virtual_call_on_an_instance() {
    let Calc { mut vm, next, .. } = calc();
    let t = vm.attach_thread().unwrap();
    let obj = vm.new_object(t, "app/Calc").unwrap();
    let got = vm.call_direct(t, &next, &[obj.to_slot()]).unwrap();
    assert_eq!(got, vec![1]);

    let err = vm.call_direct(t, &next, &[0]).unwrap_err();
    assert!(matches!(
        err,
        VmError::UnhandledException { ref class, .. } if class == "java.lang.NullPointerException"
    ));
}
