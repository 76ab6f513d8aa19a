//! Invariants the handlers must hold over ranges of inputs, exercised
//! through real bytecode rather than by poking the helpers directly.

mod common;

use common::{make_vm, run, static_flags};
use dex::build::ContainerBuilder;
use dex::MethodFlags;
use interpreter::object::Value;
use interpreter::Vm;

fn binop_vm(op_unit: u16) -> Vm {
    let mut b = ContainerBuilder::new();
    // <op> v0, v1, v2; return v0
    b.method(
        "LT;",
        "op",
        &["I", "I"],
        "I",
        static_flags(),
        3,
        2,
        vec![op_unit, 0x0201, 0x000f],
    );
    make_vm(b)
}

fn eval(vm: &mut Vm, a: i32, b: i32) -> i32 {
    run(vm, "LT;->op(II)I", vec![Value::Int(a), Value::Int(b)])
        .unwrap()
        .unwrap()
        .int()
        .unwrap()
}

#[test]
fn add_wraps_in_two_complement() {
    let mut vm = binop_vm(0x0090);
    let samples = [0, 1, -1, 7, -7, 1337, i32::MAX, i32::MIN, i32::MAX - 1];

    for a in samples {
        for b in samples {
            assert_eq!(eval(&mut vm, a, b), a.wrapping_add(b), "{a} + {b}");
        }
    }
}

#[test]
fn mul_wraps_in_two_complement() {
    let mut vm = binop_vm(0x0092);
    let samples = [0, 1, -1, 3, 65537, i32::MAX, i32::MIN];

    for a in samples {
        for b in samples {
            assert_eq!(eval(&mut vm, a, b), a.wrapping_mul(b), "{a} * {b}");
        }
    }
}

#[test]
fn shifts_mask_to_five_bits() {
    let mut shl = binop_vm(0x0098);
    let mut shr = binop_vm(0x0099);
    let mut ushr = binop_vm(0x009a);

    for value in [1, -1, 0x1234_5678, i32::MIN] {
        for count in 0..70 {
            assert_eq!(
                eval(&mut shl, value, count),
                value.wrapping_shl(count as u32 & 0x1f),
                "{value} shl {count}"
            );
            assert_eq!(
                eval(&mut shr, value, count),
                value.wrapping_shr(count as u32 & 0x1f),
                "{value} shr {count}"
            );
            assert_eq!(
                eval(&mut ushr, value, count),
                ((value as u32).wrapping_shr(count as u32 & 0x1f)) as i32,
                "{value} ushr {count}"
            );
        }
    }
}

#[test]
fn division_rounds_toward_zero_and_min_by_minus_one_wraps() {
    let mut div = binop_vm(0x0093);

    assert_eq!(eval(&mut div, 7, 2), 3);
    assert_eq!(eval(&mut div, -7, 2), -3);
    assert_eq!(eval(&mut div, i32::MIN, -1), i32::MIN);
}

#[test]
fn sput_sget_round_trip_and_reset() {
    let mut b = ContainerBuilder::new();
    let field = b.field("LT;", "slot", "I");

    // put: sput p0, LT;->slot:I; return-void
    b.method(
        "LT;",
        "put",
        &["I"],
        "V",
        static_flags(),
        1,
        1,
        vec![0x0067, field, 0x000e],
    );
    // get: sget v0, LT;->slot:I; return v0
    b.method(
        "LT;",
        "get",
        &[],
        "I",
        static_flags(),
        1,
        0,
        vec![0x0060, field, 0x000f],
    );

    let mut vm = make_vm(b);

    for value in [0, 42, -1, i32::MIN] {
        run(&mut vm, "LT;->put(I)V", vec![Value::Int(value)]).unwrap();
        let got = run(&mut vm, "LT;->get()I", vec![]).unwrap().unwrap();
        assert_eq!(got.int().unwrap(), value);
    }

    vm.reset();
    let key = interpreter::object::statics::StaticFieldRef::new("LT;", "slot");
    assert!(!vm.statics.has_field(&key));
}

#[test]
fn clinit_runs_at_most_once_per_session() {
    let mut b = ContainerBuilder::new();
    let count = b.field("LT;", "count", "I");

    // <clinit>: sget v0, count (defaults to 0); add-int/lit8 v0, v0, #1;
    // sput v0, count; return-void
    b.method(
        "LT;",
        "<clinit>",
        &[],
        "V",
        MethodFlags::STATIC | MethodFlags::CONSTRUCTOR,
        1,
        0,
        vec![0x0060, count, 0x00d8, 0x0100, 0x0067, count, 0x000e],
    );
    // k: sget v0, count; return v0
    b.method(
        "LT;",
        "k",
        &[],
        "I",
        static_flags(),
        1,
        0,
        vec![0x0060, count, 0x000f],
    );

    let mut vm = make_vm(b);

    let first = run(&mut vm, "LT;->k()I", vec![]).unwrap().unwrap();
    let second = run(&mut vm, "LT;->k()I", vec![]).unwrap().unwrap();
    assert_eq!(first.int().unwrap(), 1);
    assert_eq!(second.int().unwrap(), 1);

    // A fresh session runs it again, exactly once
    vm.reset();
    let after_reset = run(&mut vm, "LT;->k()I", vec![]).unwrap().unwrap();
    assert_eq!(after_reset.int().unwrap(), 1);
}

#[test]
fn explicit_clinit_call_is_idempotent() {
    let mut b = ContainerBuilder::new();
    let count = b.field("LT;", "count", "I");
    b.method(
        "LT;",
        "<clinit>",
        &[],
        "V",
        MethodFlags::STATIC | MethodFlags::CONSTRUCTOR,
        1,
        0,
        vec![0x0060, count, 0x00d8, 0x0100, 0x0067, count, 0x000e],
    );

    let mut vm = make_vm(b);
    vm.initialise_class("LT;").unwrap();
    vm.initialise_class("LT;").unwrap();

    let key = interpreter::object::statics::StaticFieldRef::new("LT;", "count");
    assert_eq!(vm.statics.get_field(&key).unwrap().int().unwrap(), 1);
}

#[test]
fn cmp_nan_bias_differs_between_l_and_g() {
    let mut b = ContainerBuilder::new();
    // cmpl-float v0, v1, v2; return v0
    b.method(
        "LT;",
        "cmpl",
        &["F", "F"],
        "I",
        static_flags(),
        3,
        2,
        vec![0x002d, 0x0201, 0x000f],
    );
    // cmpg-float v0, v1, v2; return v0
    b.method(
        "LT;",
        "cmpg",
        &["F", "F"],
        "I",
        static_flags(),
        3,
        2,
        vec![0x002e, 0x0201, 0x000f],
    );

    let mut vm = make_vm(b);
    let nan = Value::Float(f32::NAN);

    let l = run(&mut vm, "LT;->cmpl(FF)I", vec![nan.clone(), Value::Float(0.0)])
        .unwrap()
        .unwrap();
    let g = run(&mut vm, "LT;->cmpg(FF)I", vec![nan, Value::Float(0.0)])
        .unwrap()
        .unwrap();

    assert_eq!(l.int().unwrap(), -1);
    assert_eq!(g.int().unwrap(), 1);

    let eq = run(
        &mut vm,
        "LT;->cmpl(FF)I",
        vec![Value::Float(1.5), Value::Float(1.5)],
    )
    .unwrap()
    .unwrap();
    assert_eq!(eq.int().unwrap(), 0);
}

#[test]
fn float_to_int_saturates_and_zeroes_nan() {
    let mut b = ContainerBuilder::new();
    // float-to-int v0, v1; return v0
    b.method(
        "LT;",
        "f2i",
        &["F"],
        "I",
        static_flags(),
        2,
        1,
        vec![0x1087, 0x000f],
    );

    let mut vm = make_vm(b);
    let f2i = |vm: &mut Vm, f: f32| {
        run(vm, "LT;->f2i(F)I", vec![Value::Float(f)])
            .unwrap()
            .unwrap()
            .int()
            .unwrap()
    };

    assert_eq!(f2i(&mut vm, 2.9), 2);
    assert_eq!(f2i(&mut vm, -2.9), -2);
    assert_eq!(f2i(&mut vm, f32::NAN), 0);
    assert_eq!(f2i(&mut vm, f32::INFINITY), i32::MAX);
    assert_eq!(f2i(&mut vm, f32::NEG_INFINITY), i32::MIN);
}
