//! Benchmarks for anchor resolution and descriptor application.
//!
//! Host bodies are synthetic: a padded straight-line body with a guarded
//! exit, sized like the larger instrumented host methods.

extern crate hostpatch;

use criterion::{criterion_group, criterion_main, Criterion};
use hostpatch::prelude::*;
use std::hint::black_box;

fn host() -> TypeRef {
    TypeRef::new("Game", "Host")
}

/// `ldarg.1; brfalse.s RET; (ldarg.0; pop) * n; ldarg.1; pop; RET: ret`
fn padded_body(n: usize) -> InstructionBuffer {
    let ret = Label::new(0);
    let mut instructions = vec![
        Instruction::new(Opcode::Ldarg1),
        Instruction::with_operand(Opcode::BrfalseS, Operand::Label(ret)),
    ];
    for _ in 0..n {
        instructions.push(Instruction::new(Opcode::Ldarg0));
        instructions.push(Instruction::new(Opcode::Pop));
    }
    instructions.push(Instruction::new(Opcode::Ldarg1));
    instructions.push(Instruction::new(Opcode::Pop));
    instructions.push(Instruction::new(Opcode::Ret).with_label(ret));
    InstructionBuffer::from_instructions(instructions)
}

fn descriptor() -> PatchDescriptor {
    let args = TypeRef::new("Events", "PokeEventArgs");
    let binding = EventBinding::new(
        args.clone(),
        2,
        MethodRef::new(TypeRef::new("Handlers", "Host"), "OnPoke").with_params(1),
    );
    PatchDescriptor::new(MethodRef::instance(host(), "Poke").with_params(1))
        .declare_local("ev", args)
        .label_exit("ret", AnchorRule::opcode(Opcode::Ret).last())
        .raise_event(
            EventSite::new(AnchorRule::opcode(Opcode::Ldarg1).last(), binding, "ev", "ret")
                .with_arguments(Fragment::new().ldarg(1)),
        )
}

/// Benchmark resolving the last match of an opcode anchor.
fn bench_anchor_last(c: &mut Criterion) {
    let body = padded_body(500);
    let rule = AnchorRule::opcode(Opcode::Ldarg1).last();

    c.bench_function("anchor_last_1k", |b| {
        b.iter(|| black_box(rule.resolve(black_box(&body)).unwrap()));
    });
}

/// Benchmark applying an event-raising descriptor, including validation.
fn bench_apply_event_site(c: &mut Criterion) {
    let body = padded_body(500);
    let descriptor = descriptor();
    let instrumenter = Instrumenter::new();

    c.bench_function("apply_event_site_1k", |b| {
        b.iter(|| {
            let patched = instrumenter
                .apply(black_box(body.clone()), black_box(&descriptor))
                .unwrap();
            black_box(patched)
        });
    });
}

/// Benchmark buffer validation alone.
fn bench_validate(c: &mut Criterion) {
    let body = padded_body(500);

    c.bench_function("validate_1k", |b| {
        b.iter(|| black_box(&body).validate().unwrap());
    });
}

criterion_group!(benches, bench_anchor_last, bench_apply_event_site, bench_validate);
criterion_main!(benches);
