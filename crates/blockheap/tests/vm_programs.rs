//! End-to-end bytecode programs.

use blockheap::Error;
use blockheap::vm::{Machine, Op, assemble};

/// Computes `n!` by unrolling the multiplication into straight-line code.
fn factorial_program(n: u8) -> Vec<u8> {
    let mut ops = vec![Op::Enter(1), Op::Push(1), Op::Store(0)];
    for i in 1..=i64::from(n) {
        ops.extend([Op::Load(0), Op::Push(i), Op::Mul, Op::Store(0)]);
    }
    ops.extend([Op::Load(0), Op::Leave, Op::Halt]);
    assemble(&ops)
}

#[test]
fn test_factorial() {
    let mut machine = Machine::new().unwrap();
    assert_eq!(machine.run(&factorial_program(10)).unwrap(), Some(3_628_800));
    assert_eq!(machine.frame_depth(), 0);
    assert_eq!(machine.depth(), 1);
}

#[test]
fn test_factorial_overflow() {
    let mut machine = Machine::new().unwrap();
    assert_eq!(machine.run(&factorial_program(21)).unwrap_err(), Error::Overflow);
}

#[test]
fn test_deep_frames_unwind() {
    let mut machine = Machine::new().unwrap();
    let mut ops = Vec::new();
    for depth in 0..500 {
        ops.extend([Op::Enter(4), Op::Push(depth), Op::Store(3)]);
    }
    for _ in 0..500 {
        ops.extend([Op::Load(3), Op::Leave]);
    }
    ops.extend([Op::Add, Op::Halt]);

    assert_eq!(machine.run(&assemble(&ops)).unwrap(), Some(1));
    assert_eq!(machine.frame_depth(), 0);
    assert_eq!(machine.depth(), 499);
}

#[test]
fn test_state_carries_over_until_reset() {
    let mut machine = Machine::new().unwrap();
    machine.run(&assemble(&[Op::Push(40)])).unwrap();
    assert_eq!(machine.run(&assemble(&[Op::Push(2), Op::Add])).unwrap(), Some(42));

    machine.reset();
    assert_eq!(machine.run(&assemble(&[Op::Nop])).unwrap(), None);
}

#[test]
fn test_truncated_program() {
    let mut code = assemble(&[Op::Push(1), Op::Push(2)]);
    code.pop();

    let mut machine = Machine::new().unwrap();
    assert_eq!(machine.run(&code).unwrap_err(), Error::Truncated);
    assert_eq!(machine.depth(), 1);
}
