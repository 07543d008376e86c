//! Benchmarks for instruction decoding, graph construction and lowering.

extern crate cilfront;

use std::hint::black_box;

use cilfront::{
    assembly::{decode_stream, opcodes::*, CilGraph},
    builder::{il_body, ImageBuilder},
    metadata::signatures::{ElementType, MethodSig, TypeSig},
    CompileOptions, Session,
};
use criterion::{criterion_group, criterion_main, Criterion};

/// A counting loop repeated `blocks` times:
/// `ldc.i4.0; stloc.0; ldloc.0; ldc.i4.1; add; stloc.0; ldloc.0; ldarg.0; blt.s -8`
fn loop_body(blocks: usize) -> Vec<u8> {
    let mut code = Vec::new();
    for _ in 0..blocks {
        code.extend_from_slice(&[
            LDC_I4_0, STLOC_0, LDLOC_0, LDC_I4_1, ADD, STLOC_0, LDLOC_0, LDARG_0, BLT_S, 0xF8,
        ]);
    }
    code.extend_from_slice(&[LDLOC_0, RET]);
    code
}

fn bench_decode(c: &mut Criterion) {
    let code = loop_body(200);

    c.bench_function("graph_decode_2k", |b| {
        b.iter(|| black_box(decode_stream(black_box(&code), false).unwrap()));
    });
}

fn bench_build(c: &mut Criterion) {
    let code = loop_body(200);

    c.bench_function("graph_build_2k", |b| {
        b.iter(|| black_box(CilGraph::build(black_box(&code), &[], false).unwrap()));
    });
}

fn bench_lower(c: &mut Criterion) {
    let int32 = TypeSig::Primitive(ElementType::I4);

    let mut corlib = ImageBuilder::new("mscorlib");
    corlib.type_def("System", "Object", 0x0001, None).unwrap();

    let mut image = ImageBuilder::new("Loops");
    let mscorlib = image.assembly_ref("mscorlib");
    let object = image.type_ref(mscorlib, "System", "Object").unwrap();
    image.type_def("Bench", "Loops", 0x0001, Some(object)).unwrap();
    let locals = image.local_signature(&[int32.clone()]).unwrap();
    for index in 0..32 {
        let body = cilfront::metadata::method::MethodBody {
            local_var_sig_token: locals,
            init_locals: true,
            is_fat: true,
            ..il_body(2, loop_body(16))
        };
        image
            .method(
                &format!("Count{index}"),
                0x0096,
                &MethodSig::new(int32.clone(), vec![int32.clone()]),
                Some(body),
            )
            .unwrap();
    }

    let session = Session::new(CompileOptions::default());
    session.load_bytes(corlib.build().unwrap()).unwrap();
    let module = session.load_bytes(image.build().unwrap()).unwrap();

    c.bench_function("graph_lower_all_32", |b| {
        b.iter(|| black_box(session.lower_all(module).unwrap()));
    });
}

criterion_group!(benches, bench_decode, bench_build, bench_lower);
criterion_main!(benches);
