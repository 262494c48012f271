//! Snapshot and restore.

mod common;

use pretty_assertions::assert_eq;
use strand_vm::{ChoiceGenerator, TransitionEnd, Vm, VmSnapshot};

/// Alternate between the last and the first choice.
fn zigzag(step: usize, cg: &ChoiceGenerator) -> usize {
    if step % 2 == 0 {
        cg.total_choices() - 1
    } else {
        0
    }
}

/// Take `root`'s zigzag choice and `steps - 1` more after it.
fn forward(vm: &mut Vm, root: &ChoiceGenerator, steps: usize) -> VmSnapshot {
    let mut cg = root.clone();
    for step in 0..steps {
        cg.select(zigzag(step, &cg)).unwrap();
        let end = vm.execute_transition(&cg).unwrap();
        match vm.take_pending_choice() {
            Some(next) if end == TransitionEnd::ChoicePoint => cg = next,
            _ => break,
        }
    }
    vm.snapshot()
}

fn fresh() -> (Vm, ChoiceGenerator) {
    let mut vm = common::started(common::racy_counter());
    let root = vm.take_pending_choice().unwrap();
    (vm, root)
}

#[test]
fn test_replay_after_restore_is_identical() {
    for steps in [1, 3, 6, 50] {
        let (mut vm, root) = fresh();
        let before = vm.snapshot();
        let first = forward(&mut vm, &root, steps);

        vm.restore(&before);
        assert_eq!(vm.snapshot(), before);
        let replayed = forward(&mut vm, &root, steps);
        assert_eq!(replayed, first, "steps = {}", steps);

        let (mut untouched, root) = fresh();
        let direct = forward(&mut untouched, &root, steps);
        assert_eq!(direct, first, "steps = {}", steps);
        assert_eq!(direct.fingerprint(), first.fingerprint());
    }
}

#[test]
fn test_restore_discards_later_state() {
    let (mut vm, root) = fresh();
    let before = vm.snapshot();
    let objects = vm.kernel().heap.len();
    let threads = vm.kernel().threads.len();

    forward(&mut vm, &root, 50);
    assert!(vm.kernel().heap.len() > objects);
    assert!(vm.kernel().threads.len() > threads);
    assert!(vm.path_length() > 0);

    vm.restore(&before);
    assert_eq!(vm.kernel().heap.len(), objects);
    assert_eq!(vm.kernel().threads.len(), threads);
    assert_eq!(vm.path_length(), 0);
    assert!(!vm.has_pending_choice());
    assert_eq!(vm.fingerprint(), before.fingerprint());
}

#[test]
fn test_snapshot_records_path_length() {
    let (mut vm, root) = fresh();
    let snap = forward(&mut vm, &root, 3);
    assert_eq!(snap.path_length(), vm.path_length());
    assert_eq!(snap.path_length(), vm.trail().len());
    assert_eq!(&*vm.trail()[0].cg_id, "root");
}

#[test]
fn test_fingerprint_separates_different_paths() {
    let (mut a, root) = fresh();
    let mut cg = root.clone();
    cg.select(0).unwrap();
    a.execute_transition(&cg).unwrap();
    let mut next = a.take_pending_choice().unwrap();
    assert!(next.total_choices() > 1);
    let at_choice = a.snapshot();

    next.select(0).unwrap();
    a.execute_transition(&next).unwrap();
    let left = a.fingerprint();

    a.restore(&at_choice);
    next.select(1).unwrap();
    a.execute_transition(&next).unwrap();
    assert_ne!(a.fingerprint(), left);
}
