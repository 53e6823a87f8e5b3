use criterion::{criterion_group, criterion_main, Criterion};

use lazarr::prelude::*;

fn ramp(shape: &[usize], chunks: &[usize]) -> Expression {
    let n: usize = shape.iter().product();
    let arr = MemArray::from_cells(
        shape.to_vec(),
        chunks.to_vec(),
        Buffer::F64((0..n).map(|i| i as f64).collect()),
    )
    .unwrap();
    Expression::from_store(arr).unwrap()
}

fn bench_elementwise(c: &mut Criterion) {
    let a = ramp(&[512, 512], &[128, 128]);
    let b = ramp(&[512], &[128]);
    let expr = a.add(&b).unwrap().sin().unwrap().mul(2.0).unwrap();
    let engine = Engine::default();
    c.bench_function("elementwise_512x512", |bch| {
        bch.iter(|| engine.compute(&expr).unwrap())
    });
}

fn bench_elementwise_parallel(c: &mut Criterion) {
    let a = ramp(&[512, 512], &[128, 128]);
    let expr = a.sqrt().unwrap().add(1.0).unwrap();
    let engine = Engine::new(EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    });
    c.bench_function("elementwise_512x512_4workers", |bch| {
        bch.iter(|| engine.compute(&expr).unwrap())
    });
}

fn bench_reduction(c: &mut Criterion) {
    let a = ramp(&[512, 512], &[128, 128]);
    let engine = Engine::default();
    c.bench_function("sum_all_512x512", |bch| {
        bch.iter(|| {
            let expr = a.sum(Axes::All).unwrap();
            engine.compute(&expr).unwrap()
        })
    });
}

fn bench_axis_reduction(c: &mut Criterion) {
    let a = ramp(&[512, 512], &[128, 128]);
    let engine = Engine::default();
    c.bench_function("mean_axis0_512x512", |bch| {
        bch.iter(|| {
            let expr = a.mean(Axes::Axes(vec![0])).unwrap();
            engine.compute(&expr).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_elementwise,
    bench_elementwise_parallel,
    bench_reduction,
    bench_axis_reduction
);
criterion_main!(benches);
