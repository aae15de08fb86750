//! Seeded training runs are deterministic.

use std::num::NonZeroUsize;

use crate::common::letor_samples;
use ltrkit::ranklib::{
    CoorAscent, CoorAscentParams, LambdaMart, LambdaMartParams, RandomForest, RandomForestParams,
    Ranker, Trainer, TrainingConfig,
};
use rstest::rstest;

fn train_text(mut ranker: Box<dyn Ranker>, seed: u64, n_threads: usize) -> String {
    let samples = letor_samples(6, 8, 5);
    let config = TrainingConfig::builder()
        .seed(seed)
        .n_threads(NonZeroUsize::new(n_threads).unwrap())
        .build()
        .unwrap();
    Trainer::new(config)
        .train(ranker.as_mut(), &samples, None, None)
        .unwrap();
    ranker.model()
}

fn coor_ascent() -> Box<dyn Ranker> {
    Box::new(CoorAscent::new(
        CoorAscentParams::builder().n_restart(2).max_iteration(5).build().unwrap(),
    ))
}

fn random_forest() -> Box<dyn Ranker> {
    Box::new(RandomForest::new(
        RandomForestParams::builder().n_bag(3).n_tree_leaves(4).build().unwrap(),
    ))
}

#[rstest]
#[case::coordinate_ascent(coor_ascent as fn() -> Box<dyn Ranker>)]
#[case::random_forest(random_forest as fn() -> Box<dyn Ranker>)]
fn same_seed_same_model(#[case] make: fn() -> Box<dyn Ranker>) {
    assert_eq!(train_text(make(), 3, 1), train_text(make(), 3, 1));
}

#[test]
fn lambdamart_ignores_thread_count() {
    let make = || -> Box<dyn Ranker> {
        Box::new(LambdaMart::new(
            LambdaMartParams::builder().n_trees(5).n_tree_leaves(4).build().unwrap(),
        ))
    };
    assert_eq!(train_text(make(), 3, 1), train_text(make(), 3, 4));
}
