//! End-to-end scenarios exercising the full pipeline: build IR with
//! `core_ir::Builder`, lower it, and run it through `core_vm::invoke`.

use core_ir::builder::{instr1, instr2, instr3};
use core_ir::{Builder, InstrArg, IrProgram, Opcode, Reference};
use core_types::ty::{CallConv, NumericKind, INTERNER};
use core_types::Value;
use core_vm::{invoke, BcProgram};

#[test]
fn arithmetic_round_trip_add() {
    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let args_t = INTERNER.get_tuple(&[i64_t, i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t, i64_t], i64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let fid = b.start_function("add", fn_t);
    let a = b.make_arg_ref(0, i64_t);
    let c = b.make_arg_ref(1, i64_t);
    let ret = b.make_ret_ref(i64_t);
    b.gen(instr3(Opcode::Add, InstrArg::Ref(ret), InstrArg::Ref(a), InstrArg::Ref(c)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);
    let mut result: i64 = 0;
    let mut args_storage: [i64; 2] = [40, 2];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };

    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn foreign_call_sqrt_via_libm() {
    let f64_t = INTERNER.get_numeric(NumericKind::F64);
    let args_t = INTERNER.get_tuple(&[f64_t]);
    let sqrt_ty = INTERNER.get_procedure(&[f64_t], f64_t, CallConv::Cdecl, false);
    let wrapper_ty = INTERNER.get_procedure(&[f64_t], f64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let so = b.declare_shared_object("libm.so.6");
    let sqrt_ext = b.declare_extern_proc("sqrt", sqrt_ty, so);

    let fid = b.start_function("call_sqrt", wrapper_ty);
    let x = b.make_arg_ref(0, f64_t);
    let call_args = b.make_local_var(args_t);
    let call_args_field0 = Reference::new(core_ir::RefKind::Frame, call_args.index, f64_t);
    b.gen(instr2(Opcode::Mov, InstrArg::Ref(call_args_field0), InstrArg::Ref(x)));
    let callee = b.make_extern_proc_ref(sqrt_ext, sqrt_ty);
    let ret = b.make_ret_ref(f64_t);
    b.call_foreign(ret, callee, call_args);
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);
    let mut result: f64 = 0.0;
    let mut args_storage: [f64; 1] = [4.0];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut f64 as *mut u8, f64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };

    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 2.0);
}

/// Builds `abs(x): i64 -> i64` with a two-way branch, used by both
/// control-flow cases below.
fn build_abs() -> (IrProgram, core_ir::FunctionId, &'static core_types::Type, &'static core_types::Type) {
    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let i8_t = INTERNER.get_numeric(NumericKind::I8);
    let args_t = INTERNER.get_tuple(&[i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t], i64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let fid = {
        let mut b = Builder::new(&mut program);
        let fid = b.start_function("abs", fn_t);
        let x = b.make_arg_ref(0, i64_t);
        let ret = b.make_ret_ref(i64_t);
        let zero = b.make_rodata_ref(i64_t, &0i64.to_ne_bytes());
        let is_neg = b.make_local_var(i8_t);

        let negate_block = b.create_label("negate");
        let positive_block = b.create_label("positive");

        b.gen(instr3(Opcode::Lt, InstrArg::Ref(is_neg), InstrArg::Ref(x), InstrArg::Ref(zero)));
        b.gen(instr2(Opcode::Jmpnz, InstrArg::Block(negate_block), InstrArg::Ref(is_neg)));
        b.gen(instr1(Opcode::Jmp, InstrArg::Block(positive_block)));

        b.start_block(negate_block);
        b.gen(instr2(Opcode::Neg, InstrArg::Ref(ret), InstrArg::Ref(x)));
        b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));

        b.start_block(positive_block);
        b.gen(instr2(Opcode::Mov, InstrArg::Ref(ret), InstrArg::Ref(x)));
        b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
        b.finish_function();
        fid
    };
    (program, fid, i64_t, args_t)
}

#[test]
fn control_flow_abs_negative() {
    let (program, fid, i64_t, args_t) = build_abs();
    let bc = BcProgram::new(&program);
    let mut result: i64 = 0;
    let mut args_storage: [i64; 1] = [-7];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };
    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 7);
}

#[test]
fn control_flow_abs_positive() {
    let (program, fid, i64_t, args_t) = build_abs();
    let bc = BcProgram::new(&program);
    let mut result: i64 = 0;
    let mut args_storage: [i64; 1] = [7];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };
    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 7);
}

#[test]
fn recursive_factorial() {
    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let i8_t = INTERNER.get_numeric(NumericKind::I8);
    let args_t = INTERNER.get_tuple(&[i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t], i64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let fid = b.start_function("fact", fn_t);
    let n = b.make_arg_ref(0, i64_t);
    let ret = b.make_ret_ref(i64_t);
    let one = b.make_rodata_ref(i64_t, &1i64.to_ne_bytes());
    let le_one = b.make_local_var(i8_t);
    let call_args = b.make_local_var(args_t);
    let sub_ret = b.make_local_var(i64_t);
    let nm1 = b.make_local_var(i64_t);

    let base_block = b.create_label("base");
    let recurse_block = b.create_label("recurse");

    b.gen(instr3(Opcode::Le, InstrArg::Ref(le_one), InstrArg::Ref(n), InstrArg::Ref(one)));
    b.gen(instr2(Opcode::Jmpnz, InstrArg::Block(base_block), InstrArg::Ref(le_one)));
    b.gen(instr1(Opcode::Jmp, InstrArg::Block(recurse_block)));

    b.start_block(base_block);
    b.gen(instr2(Opcode::Mov, InstrArg::Ref(ret), InstrArg::Ref(one)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));

    b.start_block(recurse_block);
    b.gen(instr3(Opcode::Sub, InstrArg::Ref(nm1), InstrArg::Ref(n), InstrArg::Ref(one)));
    let call_args_field0 = Reference::new(core_ir::RefKind::Frame, call_args.index, i64_t);
    b.gen(instr2(Opcode::Mov, InstrArg::Ref(call_args_field0), InstrArg::Ref(nm1)));
    b.call_native(sub_ret, fid, call_args);
    b.gen(instr3(Opcode::Mul, InstrArg::Ref(ret), InstrArg::Ref(n), InstrArg::Ref(sub_ret)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);
    let mut result: i64 = 0;
    let mut args_storage: [i64; 1] = [10];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };

    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 3628800);
}

#[test]
fn type_interning_is_pointer_equal_across_calls() {
    let i32_t = INTERNER.get_numeric(NumericKind::I32);
    let a = INTERNER.get_tuple(&[i32_t, i32_t]);
    let b = INTERNER.get_tuple(&[i32_t, i32_t]);
    assert!(std::ptr::eq(a, b));
}

/// After every outermost return, this thread's interpreter context must be
/// fully unwound: no saved caller activations left on the control stack and
/// no space left in use on the call-stack allocator.
#[test]
fn stack_and_control_are_empty_after_outermost_return() {
    assert!(core_vm::is_idle());

    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let args_t = INTERNER.get_tuple(&[i64_t, i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t, i64_t], i64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let fid = b.start_function("add_for_idle_check", fn_t);
    let a = b.make_arg_ref(0, i64_t);
    let c = b.make_arg_ref(1, i64_t);
    let ret = b.make_ret_ref(i64_t);
    b.gen(instr3(Opcode::Add, InstrArg::Ref(ret), InstrArg::Ref(a), InstrArg::Ref(c)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);
    let mut result: i64 = 0;
    let mut args_storage: [i64; 2] = [1, 2];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };

    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 3);
    assert!(core_vm::is_idle());

    // A second, independent top-level call must leave the same invariant.
    args_storage = [10, 20];
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };
    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 30);
    assert!(core_vm::is_idle());
}

/// `cast` specialization as actually run by the interpreter, across a
/// representative sample of numeric-kind pairs: integer truncation,
/// integer-to-float, and float-to-int truncation toward zero.
#[test]
fn cast_truncates_and_converts_across_kinds() {
    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let i32_t = INTERNER.get_numeric(NumericKind::I32);
    let f64_t = INTERNER.get_numeric(NumericKind::F64);
    let args_t = INTERNER.get_tuple(&[i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t], i32_t, CallConv::Native, false);

    // truncate an i64 argument to i32, then widen it to f64, then
    // truncate that back down to i32 — round trips through three casts.
    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let fid = b.start_function("cast_chain", fn_t);
    let n = b.make_arg_ref(0, i64_t);
    let as_i32 = b.make_local_var(i32_t);
    let as_f64 = b.make_local_var(f64_t);
    let ret = b.make_ret_ref(i32_t);
    b.gen(instr2(Opcode::Cast, InstrArg::Ref(as_i32), InstrArg::Ref(n)));
    b.gen(instr2(Opcode::Cast, InstrArg::Ref(as_f64), InstrArg::Ref(as_i32)));
    b.gen(instr2(Opcode::Cast, InstrArg::Ref(ret), InstrArg::Ref(as_f64)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);
    let mut result: i32 = 0;
    // 0x1_0000_0007 truncated to i32 is 7; the round trip through f64
    // must preserve that truncated value exactly.
    let mut args_storage: [i64; 1] = [0x1_0000_0007];
    let mut ret_value = unsafe { Value::new((&mut result) as *mut i32 as *mut u8, i32_t) };
    let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };

    invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
    assert_eq!(result, 7);
}

/// `fact(0)` and `fact(1)` both take the base-case block on the very first
/// call, never touching `call_native` self-recursion at all — the boundary
/// of the recursive-factorial scenario where the self-loop never fires.
#[test]
fn recursive_factorial_base_case_never_recurses() {
    let i64_t = INTERNER.get_numeric(NumericKind::I64);
    let i8_t = INTERNER.get_numeric(NumericKind::I8);
    let args_t = INTERNER.get_tuple(&[i64_t]);
    let fn_t = INTERNER.get_procedure(&[i64_t], i64_t, CallConv::Native, false);

    let mut program = IrProgram::new();
    let mut b = Builder::new(&mut program);
    let fid = b.start_function("fact_base_case", fn_t);
    let n = b.make_arg_ref(0, i64_t);
    let ret = b.make_ret_ref(i64_t);
    let one = b.make_rodata_ref(i64_t, &1i64.to_ne_bytes());
    let le_one = b.make_local_var(i8_t);
    let call_args = b.make_local_var(args_t);
    let sub_ret = b.make_local_var(i64_t);
    let nm1 = b.make_local_var(i64_t);

    let base_block = b.create_label("base");
    let recurse_block = b.create_label("recurse");

    b.gen(instr3(Opcode::Le, InstrArg::Ref(le_one), InstrArg::Ref(n), InstrArg::Ref(one)));
    b.gen(instr2(Opcode::Jmpnz, InstrArg::Block(base_block), InstrArg::Ref(le_one)));
    b.gen(instr1(Opcode::Jmp, InstrArg::Block(recurse_block)));

    b.start_block(base_block);
    b.gen(instr2(Opcode::Mov, InstrArg::Ref(ret), InstrArg::Ref(one)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));

    b.start_block(recurse_block);
    b.gen(instr3(Opcode::Sub, InstrArg::Ref(nm1), InstrArg::Ref(n), InstrArg::Ref(one)));
    let call_args_field0 = Reference::new(core_ir::RefKind::Frame, call_args.index, i64_t);
    b.gen(instr2(Opcode::Mov, InstrArg::Ref(call_args_field0), InstrArg::Ref(nm1)));
    b.call_native(sub_ret, fid, call_args);
    b.gen(instr3(Opcode::Mul, InstrArg::Ref(ret), InstrArg::Ref(n), InstrArg::Ref(sub_ret)));
    b.gen(instr1(Opcode::Ret, InstrArg::Ref(ret)));
    b.finish_function();

    let bc = BcProgram::new(&program);

    for (n_in, expected) in [(0i64, 1i64), (1i64, 1i64)] {
        let mut result: i64 = 0;
        let mut args_storage: [i64; 1] = [n_in];
        let mut ret_value = unsafe { Value::new((&mut result) as *mut i64 as *mut u8, i64_t) };
        let args_value = unsafe { Value::new(args_storage.as_mut_ptr() as *mut u8, args_t) };
        invoke(&program, &bc, fid, &mut ret_value, &args_value).unwrap();
        assert_eq!(result, expected);
        assert!(core_vm::is_idle());
    }
}
