use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use opcheck_core::graph::{Argument, FakeValue, Graph, TensorMeta};
use opcheck_core::{DType, Kwargs, Shape};
use opcheck_gen::{generate, seeded_rng, wrap_args};

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let shape = Shape::new(vec![256, 256]);

    for dtype in [DType::Bool, DType::U8, DType::I64, DType::F32, DType::F64] {
        group.bench_function(BenchmarkId::new("256x256", dtype), |bench| {
            let mut rng = seeded_rng(Some(0));
            bench.iter(|| generate(black_box(&shape), dtype, &mut rng).expect("generate"));
        });
    }

    group.finish();
}

fn bench_wrap(c: &mut Criterion) {
    let mut g = Graph::new();
    let x = g.add_placeholder("x", FakeValue::Tensor(TensorMeta::new(vec![64, 64], DType::F32)));
    let idx = g.add_placeholder("idx", FakeValue::Tensor(TensorMeta::new(vec![16], DType::I64)));
    let tree = vec![
        g.arg(x).expect("x"),
        Argument::Int(0),
        Argument::Seq(vec![g.arg(idx).expect("idx"), Argument::Float(0.5)]),
    ];

    c.bench_function("wrap_args_mixed", |bench| {
        let mut rng = seeded_rng(Some(0));
        bench.iter(|| wrap_args(black_box(&tree), Kwargs::new(), &mut rng));
    });
}

criterion_group!(benches, bench_generate, bench_wrap);
criterion_main!(benches);
