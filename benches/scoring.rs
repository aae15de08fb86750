//! Serving benchmarks for additive tree models, plus metric swap deltas.
//!
//! Models are generated from a fixed seed so runs are comparable.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use ltrkit::ranklib::MetricKind;
use ltrkit::repr::{Comparator, NodeId, Tree, TreeBuilder};
use ltrkit::{AdditiveModel, LtrRanker, Normalizer, Parallelism};

const N_FEATURES: usize = 100;

// =============================================================================
// Generated inputs
// =============================================================================

fn random_subtree(builder: &mut TreeBuilder, rng: &mut Xoshiro256PlusPlus, depth: usize) -> NodeId {
    if depth == 0 {
        return builder.push_leaf(rng.gen_range(-1.0..1.0));
    }
    let id = builder.reserve();
    let left = random_subtree(builder, rng, depth - 1);
    let right = random_subtree(builder, rng, depth - 1);
    let feature = rng.gen_range(0..N_FEATURES as u32);
    builder.set_split(id, feature, rng.gen(), left, right, Comparator::DefaultLeft);
    id
}

fn random_model(n_trees: usize, depth: usize, seed: u64) -> AdditiveModel {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let trees: Vec<Tree> = (0..n_trees)
        .map(|_| {
            let mut builder = TreeBuilder::new();
            random_subtree(&mut builder, &mut rng, depth);
            builder.build().expect("generated tree is valid")
        })
        .collect();
    AdditiveModel::unweighted(trees, N_FEATURES, Normalizer::Noop)
        .expect("generated model is valid")
}

fn random_rows(n_rows: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n_rows)
        .map(|_| (0..N_FEATURES).map(|_| rng.gen()).collect())
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_model_size(c: &mut Criterion) {
    let rows = random_rows(1_000, 7);
    let mut group = c.benchmark_group("additive/model_size");
    group.throughput(Throughput::Elements(rows.len() as u64));

    for (n_trees, depth) in [(100, 4), (500, 6), (1000, 8)] {
        let model = random_model(n_trees, depth, 42);
        group.bench_with_input(
            BenchmarkId::new("score_row", format!("{n_trees}x{depth}")),
            &rows,
            |b, rows| {
                b.iter(|| {
                    for row in rows {
                        black_box(model.score_row(black_box(row)));
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_parallelism(c: &mut Criterion) {
    let model = random_model(500, 6, 42);
    let rows = random_rows(10_000, 7);
    let mut group = c.benchmark_group("additive/batch");
    group.throughput(Throughput::Elements(rows.len() as u64));

    for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
        group.bench_with_input(
            BenchmarkId::new("score_batch", format!("{parallelism:?}")),
            &rows,
            |b, rows| b.iter(|| black_box(model.score_batch(black_box(rows), parallelism))),
        );
    }
    group.finish();
}

/// Per-document scoring through the serving interface, sparse writes included.
fn bench_feature_vector(c: &mut Criterion) {
    let model = random_model(500, 6, 42);
    let rows = random_rows(1_000, 7);
    let mut group = c.benchmark_group("additive/feature_vector");
    group.throughput(Throughput::Elements(rows.len() as u64));

    group.bench_function("score", |b| {
        let mut vector = model.new_feature_vector();
        b.iter(|| {
            for row in &rows {
                for (ordinal, &value) in row.iter().enumerate().step_by(3) {
                    vector.set_feature_score(ordinal, value);
                }
                black_box(model.score(vector.as_ref()));
            }
        })
    });
    group.finish();
}

fn bench_swap_change(c: &mut Criterion) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
    let labels: Vec<f32> = (0..100).map(|_| rng.gen_range(0..5) as f32).collect();
    let mut group = c.benchmark_group("metric/swap_change");

    for metric in ["NDCG@10", "ERR@10", "MAP"] {
        let scorer = metric.parse::<MetricKind>().expect("known metric").scorer();
        group.bench_with_input(BenchmarkId::from_parameter(metric), &labels, |b, labels| {
            b.iter(|| black_box(scorer.swap_change(black_box(labels))))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_model_size,
    bench_parallelism,
    bench_feature_vector,
    bench_swap_change
);
criterion_main!(benches);
