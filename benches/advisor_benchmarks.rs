//! Benchmarks for the estimators and the preset search.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use compress_advisor::entropy::shannon_entropy;
use compress_advisor::{classify, DeflateCodec, OptimizationLimits, Optimizer, Predictor, Strategy};

fn text_data(size: usize) -> Vec<u8> {
    let phrase = b"The quick brown fox jumps over the lazy dog. ";
    phrase.iter().copied().cycle().take(size).collect()
}

fn random_data(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}

fn bench_entropy(c: &mut Criterion) {
    let mut group = c.benchmark_group("entropy");
    for size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| shannon_entropy(black_box(data)))
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let text = text_data(4096);
    let binary = random_data(4096);
    c.bench_function("classify_text", |b| b.iter(|| classify(black_box(&text))));
    c.bench_function("classify_binary", |b| b.iter(|| classify(black_box(&binary))));
}

fn bench_predict(c: &mut Criterion) {
    let predictor = Predictor::default();
    let mut group = c.benchmark_group("predict");
    for (name, data) in [("text", text_data(256 * 1024)), ("random", random_data(256 * 1024))] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("balanced", name), &data, |b, data| {
            b.iter(|| predictor.predict(black_box(data), Strategy::Balanced))
        });
    }
    group.finish();
}

fn bench_optimizer(c: &mut Criterion) {
    let sample = text_data(64 * 1024);
    let mut group = c.benchmark_group("optimizer");
    group.sample_size(10);
    for strategy in [Strategy::Speed, Strategy::Ratio] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{strategy:?}")),
            &strategy,
            |b, &strategy| {
                let mut optimizer = Optimizer::default();
                b.iter(|| {
                    optimizer.analyze(&DeflateCodec, black_box(&sample), strategy, OptimizationLimits::default())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_entropy, bench_classify, bench_predict, bench_optimizer);
criterion_main!(benches);
