#![allow(unused)]
extern crate swfscope;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use swfscope::{
    abc::ConstantPool,
    assembly::{Code, Instruction, OpCode},
    deobfuscation::Deobfuscator,
};

/// A long body of guarded blocks: each block is folded away by the deobfuscator.
fn guarded_body(blocks: usize) -> Vec<u8> {
    let mut instructions = vec![
        Instruction::Bare(OpCode::GetLocal0),
        Instruction::Bare(OpCode::PushScope),
    ];
    let mut branches = Vec::new();
    for block in 0..blocks {
        instructions.push(Instruction::Bare(OpCode::PushTrue));
        branches.push(instructions.len());
        instructions.push(Instruction::branch(OpCode::IfTrue));
        instructions.push(Instruction::PushByte((block % 100) as u8));
        instructions.push(Instruction::Bare(OpCode::Pop));
        instructions.push(Instruction::get_local(1));
        instructions.push(Instruction::set_local(2));
    }
    instructions.push(Instruction::Bare(OpCode::ReturnVoid));

    let mut code = Code::from(instructions);
    for branch in branches {
        code.set_jump_exit(branch, branch + 3).unwrap();
    }
    code.encode().unwrap()
}

/// Decode and re-encode a body with many branch exits.
fn bench_codec(c: &mut Criterion) {
    let data = guarded_body(2_000);

    let mut group = c.benchmark_group("code");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(Code::decode(black_box(&data)).unwrap()));
    });

    let code = Code::decode(&data).unwrap();
    group.bench_function("encode", |b| {
        b.iter(|| black_box(code.encode().unwrap()));
    });
    group.finish();
}

/// Fold every constant guard of the body.
fn bench_deobfuscate(c: &mut Criterion) {
    let data = guarded_body(500);
    let pool = ConstantPool::default();
    let deobfuscator = Deobfuscator::new();

    c.bench_function("deobfuscate", |b| {
        b.iter(|| {
            let mut code = Code::decode(&data).unwrap();
            black_box(deobfuscator.run_on_code(&mut code, &pool).unwrap())
        });
    });
}

criterion_group!(benches, bench_codec, bench_deobfuscate);
criterion_main!(benches);
