//! Execution benchmarks for the interpreter.
//!
//! These measure instruction dispatch, branch resolution through the
//! pre-indexed control map, and call overhead.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use wasmvm::parser::module::{Module, ValueType};
use wasmvm::parser::opcode;
use wasmvm::runtime::test_utils::{BodyBuilder, ModuleBuilder};
use wasmvm::runtime::{Value, Vm};

/// `main(n)`: count n down to zero in a loop.
fn countdown_module() -> Module {
    ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[],
            BodyBuilder::new()
                .loop_()
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_SUB)
                .local_set(0)
                .local_get(0)
                .i32_const(0)
                .op(opcode::I32_GT_S)
                .br_if(0)
                .end()
                .local_get(0)
                .finish(),
        )
        .export_main(0)
        .build()
}

/// `main(n)`: iterative Fibonacci.
fn fib_module() -> Module {
    ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[(2, ValueType::I32)], // local 1 = a, local 2 = b
            BodyBuilder::new()
                .i32_const(1)
                .local_set(2)
                .block()
                .local_get(0)
                .op(opcode::I32_EQZ)
                .br_if(0)
                .loop_()
                // (a, b) = (b, a + b)
                .local_get(2)
                .local_get(1)
                .local_get(2)
                .op(opcode::I32_ADD)
                .local_set(2)
                .local_set(1)
                // n -= 1, continue while n > 0
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_SUB)
                .local_tee(0)
                .i32_const(0)
                .op(opcode::I32_GT_S)
                .br_if(0)
                .end()
                .end()
                .local_get(1)
                .finish(),
        )
        .export_main(0)
        .build()
}

/// `main(n)`: n calls of a tiny helper function.
fn call_heavy_module() -> Module {
    ModuleBuilder::new()
        .sig(&[ValueType::I32], &[ValueType::I32])
        .sig(&[ValueType::I32], &[ValueType::I32])
        .func(
            0,
            &[(1, ValueType::I32)],
            BodyBuilder::new()
                .loop_()
                .local_get(1)
                .call(1)
                .local_set(1)
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_SUB)
                .local_tee(0)
                .i32_const(0)
                .op(opcode::I32_GT_S)
                .br_if(0)
                .end()
                .local_get(1)
                .finish(),
        )
        .func(
            1,
            &[],
            BodyBuilder::new()
                .local_get(0)
                .i32_const(1)
                .op(opcode::I32_ADD)
                .finish(),
        )
        .export_main(0)
        .build()
}

fn run_main(module: &Module, n: i32) -> Vec<Value> {
    let mut vm = Vm::new(module);
    vm.invoke_main(&[n.to_string()]).expect("benchmark module runs")
}

/// Verify module correctness before benchmarking.
fn verify_modules() {
    assert_eq!(run_main(&countdown_module(), 1000), vec![Value::I32(0)]);

    let fib = fib_module();
    for (n, expected) in [(1, 1), (2, 1), (3, 2), (10, 55), (20, 6765)] {
        assert_eq!(run_main(&fib, n), vec![Value::I32(expected)], "fib({n})");
    }

    assert_eq!(run_main(&call_heavy_module(), 500), vec![Value::I32(500)]);
}

fn bench_execution(c: &mut Criterion) {
    verify_modules();

    let mut group = c.benchmark_group("execution");

    let countdown = countdown_module();
    for n in [1_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("countdown", n), &n, |b, &n| {
            b.iter(|| black_box(run_main(&countdown, n)));
        });
    }

    let fib = fib_module();
    group.bench_with_input(BenchmarkId::new("fib_iterative", 30), &30, |b, &n| {
        b.iter(|| black_box(run_main(&fib, n)));
    });

    let calls = call_heavy_module();
    group.bench_with_input(BenchmarkId::new("call_loop", 10_000), &10_000, |b, &n| {
        b.iter(|| black_box(run_main(&calls, n)));
    });

    group.finish();
}

criterion_group!(benches, bench_execution);
criterion_main!(benches);
