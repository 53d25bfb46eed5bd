use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semweave_bytecode::module::{method_attrs, type_attrs};
use semweave_bytecode::{
    verify_module, FieldRef, Instruction, MethodBody, MethodDef, Module, Opcode, Operand, TypeDef,
    TypeSig,
};

fn build_module(type_count: usize) -> Module {
    let mut module = Module::new("Bench");
    for t in 0..type_count {
        let name = format!("Type{}", t);
        let this = TypeSig::class(None, &format!("Bench.{}", name));
        let mut ty = TypeDef::new("Bench", &name, type_attrs::PUBLIC, Some(TypeSig::Object));
        for m in 0..8 {
            let field = FieldRef::new(this.clone(), &format!("_f{}", m), TypeSig::I32);
            let mut method = MethodDef::new(&format!("get_F{}", m), method_attrs::PUBLIC, TypeSig::I32);
            method.body = Some(MethodBody::new(
                vec![
                    Instruction::new(Opcode::Ldarg0),
                    Instruction::with(Opcode::Ldfld, Operand::Field(field)),
                    Instruction::new(Opcode::Ret),
                ],
                1,
            ));
            ty.add_method(method);
        }
        module.types.push(ty);
    }
    module
}

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("module");

    for size in [10usize, 100] {
        let module = build_module(size);
        let bytes = module.encode();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &module, |b, module| {
            b.iter(|| black_box(module).encode());
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| Module::decode(black_box(bytes)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("verify", size), &module, |b, module| {
            b.iter(|| verify_module(black_box(module)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encoding);
criterion_main!(benches);
