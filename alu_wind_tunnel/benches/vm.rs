// Copyright 2026 the Alu Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use alu::asm::Asm;
use alu::bytecode::{EvalMask, Instr};
use alu::host::Host;
use alu::vm::State;

struct NopHost;

impl Host for NopHost {
    fn write_line(&mut self, _line: &str) {}

    fn sleep_ms(&mut self, _ms: u32) {}
}

/// `chain_len` repetitions of push/push/sumstack.
fn build_sum_chain(chain_len: u32) -> Vec<Instr> {
    let mut a = Asm::new();
    a.push_num(0.0);
    for _ in 0..chain_len {
        a.push_num(1.0);
        a.sum_stack();
    }
    a.ret();
    a.finish().unwrap()
}

/// A register-accumulator loop that iterates `limit` times.
fn build_eval_loop(limit: f64) -> Vec<Instr> {
    let mut a = Asm::new();
    a.push_num(0.0);
    a.load(0);
    let top = a.label();
    a.place(top).unwrap();
    a.unload(0);
    a.push_num(1.0);
    a.sum_stack();
    a.load(0);
    a.unload(0);
    a.push_num(limit);
    a.eval(EvalMask::SMALLER);
    a.jfa_to(top);
    a.ret();
    a.finish().unwrap()
}

fn feed(state: &mut State, instrs: &[Instr]) {
    let bytes = alu::bytecode::encode_stream(instrs).unwrap();
    state.feed(&bytes).unwrap();
}

fn bench_sum_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_chain");
    for &chain_len in &[10_u32, 100, 1000] {
        let instrs = build_sum_chain(chain_len);
        let mut state = State::new();
        feed(&mut state, &instrs);
        let mut host = NopHost;
        group.bench_with_input(BenchmarkId::from_parameter(chain_len), &chain_len, |b, _| {
            b.iter(|| {
                state.execute(&mut host).unwrap();
                black_box(state.stack().len());
                state.stackclose();
            });
        });
    }
    group.finish();
}

fn bench_eval_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval_loop");
    for &limit in &[10_u32, 100, 1000] {
        let instrs = build_eval_loop(f64::from(limit));
        let mut state = State::new();
        feed(&mut state, &instrs);
        let mut host = NopHost;
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, _| {
            b.iter(|| {
                state.execute(&mut host).unwrap();
                black_box(state.stack().len());
                state.stackclose();
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &chain_len in &[100_u32, 1000] {
        let bytes = alu::bytecode::encode_stream(&build_sum_chain(chain_len)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(chain_len), &bytes, |b, bytes| {
            b.iter(|| {
                let instrs = alu::bytecode::decode_stream(black_box(bytes)).unwrap();
                black_box(instrs.len());
            });
        });
    }
    group.finish();
}

fn bench_vm(c: &mut Criterion) {
    bench_sum_chain(c);
    bench_eval_loop(c);
    bench_decode(c);
}

criterion_group!(benches, bench_vm);
criterion_main!(benches);
