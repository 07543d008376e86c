//! Benchmarks for the signature algebra.
//!
//! - Blob parsing for method, field, local variable and type specification signatures
//! - Structural comparison and generic substitution
//! - Mangling and demangling of symbol names

extern crate cilfront;

use std::hint::black_box;

use cilfront::{
    metadata::{
        signatures::{
            compare_method_sigs, parse_field_signature, parse_local_var_signature,
            parse_method_signature, parse_method_spec_signature, parse_type_spec_signature,
            ArrayShape, ElementType, GenericContext, ObjectToMangle, TypeSig,
        },
        typesystem::ModuleId,
    },
    CompileOptions, Session,
};
use criterion::{criterion_group, criterion_main, Criterion};

const MODULE: ModuleId = ModuleId(0);

/// Signature: void Method()
fn bench_method_void(c: &mut Criterion) {
    let signature = [0x00, 0x00, 0x01];

    c.bench_function("sig_method_void", |b| {
        b.iter(|| black_box(parse_method_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: instance void Method(int32&, string&)
fn bench_method_byref(c: &mut Criterion) {
    let signature = [0x20, 0x02, 0x01, 0x10, 0x08, 0x10, 0x0E];

    c.bench_function("sig_method_byref", |b| {
        b.iter(|| black_box(parse_method_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: !!0 Method<T>(!!0)
fn bench_method_generic(c: &mut Criterion) {
    let signature = [0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00];

    c.bench_function("sig_method_generic", |b| {
        b.iter(|| black_box(parse_method_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: void Method(int32, string, bool, int64, float64, object, char, uint8)
fn bench_method_many_params(c: &mut Criterion) {
    let signature = [
        0x00, 0x08, 0x01, 0x08, 0x0E, 0x02, 0x0A, 0x0D, 0x1C, 0x03, 0x05,
    ];

    c.bench_function("sig_method_many_params", |b| {
        b.iter(|| black_box(parse_method_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: field int32[]
fn bench_field_array(c: &mut Criterion) {
    let signature = [0x06, 0x1D, 0x08];

    c.bench_function("sig_field_array", |b| {
        b.iter(|| black_box(parse_field_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: locals (int32, string, bool, object, pinned int32&)
fn bench_locals(c: &mut Criterion) {
    let signature = [0x07, 0x05, 0x08, 0x0E, 0x02, 0x1C, 0x45, 0x10, 0x08];

    c.bench_function("sig_locals", |b| {
        b.iter(|| black_box(parse_local_var_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: class List`1<int32> (TypeRef row 18)
fn bench_type_spec_generic(c: &mut Criterion) {
    let signature = [0x15, 0x12, 0x49, 0x01, 0x08];

    c.bench_function("sig_type_spec_generic", |b| {
        b.iter(|| black_box(parse_type_spec_signature(black_box(&signature), MODULE).unwrap()));
    });
}

/// Signature: method instantiation <int32, string>
fn bench_method_spec(c: &mut Criterion) {
    let signature = [0x0A, 0x02, 0x08, 0x0E];

    c.bench_function("sig_method_spec", |b| {
        b.iter(|| {
            black_box(parse_method_spec_signature(black_box(&signature), MODULE).unwrap())
        });
    });
}

fn bench_compare(c: &mut Criterion) {
    let session = Session::new(CompileOptions::default());
    let blob = [
        0x20, 0x04, 0x08, 0x1D, 0x08, 0x10, 0x0E, 0x0F, 0x02, 0x14, 0x0D, 0x02, 0x00, 0x00,
    ];
    let a = parse_method_signature(&blob, MODULE).unwrap();
    let b_sig = parse_method_signature(&blob, MODULE).unwrap();

    c.bench_function("sig_compare_method", |b| {
        b.iter(|| black_box(compare_method_sigs(black_box(&a), black_box(&b_sig), &session)));
    });
}

fn bench_substitute(c: &mut Criterion) {
    let args = [
        TypeSig::Primitive(ElementType::I4),
        TypeSig::SzArray(Box::new(TypeSig::Primitive(ElementType::String))),
    ];
    let context = GenericContext::from_args(Some(&args), None);
    let ty = TypeSig::SzArray(Box::new(TypeSig::Ptr(Box::new(TypeSig::Var(1)))));

    c.bench_function("sig_substitute", |b| {
        b.iter(|| black_box(context.substitute_type(black_box(&ty)).unwrap()));
    });
}

fn bench_mangle(c: &mut Criterion) {
    let session = Session::new(CompileOptions::default());
    let ty = TypeSig::Array(Box::new(ArrayShape {
        elem: TypeSig::SzArray(Box::new(TypeSig::Primitive(ElementType::R8))),
        rank: 3,
        sizes: vec![4, 4],
        lo_bounds: vec![0, 0, 1],
    }));
    let object = ObjectToMangle::TypeInfo(ty);
    let symbol = session.mangle(&object).unwrap();

    c.bench_function("sig_mangle", |b| {
        b.iter(|| black_box(session.mangle(black_box(&object)).unwrap()));
    });
    c.bench_function("sig_demangle", |b| {
        b.iter(|| black_box(session.mangler().demangle(black_box(&symbol)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_method_void,
    bench_method_byref,
    bench_method_generic,
    bench_method_many_params,
    bench_field_array,
    bench_locals,
    bench_type_spec_generic,
    bench_method_spec,
    bench_compare,
    bench_substitute,
    bench_mangle,
);
criterion_main!(benches);
