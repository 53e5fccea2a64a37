//! End-to-end interpreter tests driven through the public VM interface.

use wasmvm::parser::module::ValueType;
use wasmvm::parser::opcode;
use wasmvm::runtime::test_utils::{BodyBuilder, ModuleBuilder, run_to_string};
use wasmvm::runtime::{Value, Vm};

#[test]
fn main_returning_a_constant() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(0, &[], BodyBuilder::new().i32_const(42).finish())
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &[]), "42\n");
}

#[test]
fn main_adding_two_f64_arguments() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::F64, ValueType::F64], &[ValueType::F64])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .local_get(0)
                .local_get(1)
                .op(opcode::F64_ADD)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &["1.5", "2.25"]), "3.750000\n");
}

#[test]
fn main_branching_on_its_argument() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .local_get(0)
                .op(opcode::I32_EQZ)
                .if_()
                .i32_const(1)
                .else_()
                .i32_const(2)
                .end()
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &["0"]), "1\n");
    assert_eq!(run_to_string(&module, &["5"]), "2\n");
}

#[test]
fn main_summing_one_to_ten_in_a_loop() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[(2, ValueType::I32)],
            BodyBuilder::new()
                .loop_()
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_ADD)
                .local_set(0)
                .local_get(1)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_set(1)
                .local_get(0)
                .i32_const(10)
                .op(opcode::I32_LT_S)
                .br_if(0)
                .end()
                .local_get(1)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &[]), "55\n");
}

#[test]
fn main_hitting_unreachable_prints_only_the_trap_marker() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(42)
                .op(opcode::UNREACHABLE)
                .finish(),
        )
        .export_main(0)
        .build();
    // No result lines, exactly one marker.
    assert_eq!(run_to_string(&module, &[]), "!trap\n");
}

#[test]
fn call_indirect_with_mismatched_signature_traps() {
    // Slot 0 holds a () -> i32 function while the immediate names the
    // (i32) -> i32 type.
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new().local_get(0).call_indirect(0, 0).finish(),
        )
        .func(1, &[], BodyBuilder::new().i32_const(7).finish())
        .export_main(0)
        .table(1)
        .elem(0, &[1])
        .build();
    assert_eq!(run_to_string(&module, &["0"]), "!trap\n");
}

#[test]
fn multi_value_results_print_one_per_line_in_order() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32, ValueType::I64, ValueType::F64])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(-7)
                .i64_const(1 << 40)
                .f64_const(0.5)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &[]), "-7\n1099511627776\n0.500000\n");
}

#[test]
fn void_main_prints_nothing() {
    let module = ModuleBuilder::new()
        .sig(&[], &[])
        .func(0, &[], BodyBuilder::new().op(opcode::NOP).finish())
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &[]), "");
}

#[test]
fn load_at_the_memory_boundary() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .local_get(0)
                .mem_op(opcode::I32_LOAD, 2, 0)
                .finish(),
        )
        .export_main(0)
        .memory(1)
        .build();
    assert_eq!(run_to_string(&module, &["65532"]), "0\n");
    assert_eq!(run_to_string(&module, &["65533"]), "!trap\n");
}

#[test]
fn negative_base_address_traps_even_if_offset_compensates() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(-4)
                .mem_op(opcode::I32_LOAD, 2, 8)
                .finish(),
        )
        .export_main(0)
        .memory(1)
        .build();
    assert_eq!(run_to_string(&module, &[]), "!trap\n");
}

#[test]
fn if_with_no_else_and_false_condition_skips_the_region() {
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[(1, ValueType::I32)],
            BodyBuilder::new()
                .i32_const(0)
                .if_()
                .i32_const(9)
                .local_set(0)
                .end()
                .local_get(0)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &[]), "0\n");
}

#[test]
fn untaken_br_if_behaves_like_drop() {
    let drop_module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .block()
                .i32_const(0)
                .op(opcode::DROP)
                .end()
                .i32_const(8)
                .finish(),
        )
        .export_main(0)
        .build();
    let br_if_module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .block()
                .i32_const(0)
                .br_if(0)
                .end()
                .i32_const(8)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(
        run_to_string(&drop_module, &[]),
        run_to_string(&br_if_module, &[])
    );
}

#[test]
fn nested_calls_preserve_caller_stacks() {
    // main pushes sentinels around a call; the callee's own stack traffic
    // must not disturb them.
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(30)
                .i32_const(4)
                .call(1)
                .op(opcode::I32_ADD)
                .finish(),
        )
        .func(
            1,
            &[],
            BodyBuilder::new()
                .i32_const(2)
                .i32_const(3)
                .op(opcode::I32_MUL)
                .local_get(0)
                .op(opcode::I32_ADD)
                .op(opcode::RETURN)
                .finish(),
        )
        .export_main(0)
        .build();
    // 30 + (2*3 + 4)
    assert_eq!(run_to_string(&module, &[]), "40\n");
}

#[test]
fn indirect_recursion_through_the_table() {
    // countdown(n): n == 0 ? 0 : call_indirect countdown(n - 1)
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .local_get(0)
                .op(opcode::I32_EQZ)
                .if_()
                .i32_const(0)
                .else_()
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_SUB)
                .i32_const(0)
                .call_indirect(0, 0)
                .end()
                .finish(),
        )
        .export_main(0)
        .table(1)
        .elem(0, &[0])
        .build();
    assert_eq!(run_to_string(&module, &["6"]), "0\n");
}

#[test]
fn repeated_runs_are_deterministic() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[(1, ValueType::I32)],
            BodyBuilder::new()
                .i32_const(100)
                .i32_const(25)
                .op(opcode::I32_SUB)
                .local_tee(0)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_ADD)
                .local_get(0)
                .op(opcode::I32_SUB)
                .local_get(0)
                .op(opcode::I32_ADD)
                .finish(),
        )
        .export_main(0)
        .build();
    let mut vm = Vm::new(&module);
    let first = vm.invoke_main(&["0".to_string()]).unwrap();
    let second = vm.invoke_main(&["0".to_string()]).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![Value::I32(750)]);
}

#[test]
fn memory_persists_within_a_run_but_not_across_runs() {
    // Bump a counter at address 0 and return it.
    let module = ModuleBuilder::new()
        .sig(&[], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(0)
                .i32_const(0)
                .mem_op(opcode::I32_LOAD, 2, 0)
                .i32_const(1)
                .op(opcode::I32_ADD)
                .mem_op(opcode::I32_STORE, 2, 0)
                .i32_const(0)
                .mem_op(opcode::I32_LOAD, 2, 0)
                .finish(),
        )
        .export_main(0)
        .memory(1)
        .build();
    let mut vm = Vm::new(&module);
    assert_eq!(vm.invoke_main(&[]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(vm.invoke_main(&[]).unwrap(), vec![Value::I32(1)]);
}

#[test]
fn i64_and_f64_paths_round_trip_through_memory() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I64], &[ValueType::I64])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .i32_const(16)
                .local_get(0)
                .mem_op(opcode::I64_STORE, 3, 0)
                .i32_const(16)
                .mem_op(opcode::I64_LOAD, 3, 0)
                .finish(),
        )
        .export_main(0)
        .memory(1)
        .build();
    assert_eq!(
        run_to_string(&module, &["-123456789012345"]),
        "-123456789012345\n"
    );
}

#[test]
fn select_picks_between_computed_values() {
    let module = ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::F64])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .f64_const(1.25)
                .f64_const(-1.25)
                .local_get(0)
                .op(opcode::SELECT)
                .finish(),
        )
        .export_main(0)
        .build();
    assert_eq!(run_to_string(&module, &["1"]), "1.250000\n");
    assert_eq!(run_to_string(&module, &["0"]), "-1.250000\n");
}
