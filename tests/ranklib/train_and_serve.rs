//! Every ranker trains, writes its model, reloads, and serves through
//! `model/ranklib` with the same scores.

use std::num::NonZeroUsize;

use crate::common::{feature_set, letor_samples};
use ltrkit::ranklib::{
    AdaRank, AdaRankParams, CoorAscent, CoorAscentParams, DataPoint, LambdaMart, LambdaMartParams,
    LinearReg, ListNet, ListNetParams, RandomForest, RandomForestParams, RankBoost, RankBoostParams,
    RankList, RankNet, RankNetParams, Ranker, RankerFactory, RankerKind, Trainer, TrainingConfig,
};
use ltrkit::{assert_approx_eq, assert_approx_eq_f64, LtrRanker, ParserFactory};
use rstest::rstest;

fn mart_params() -> LambdaMartParams {
    LambdaMartParams::builder()
        .n_trees(10)
        .n_tree_leaves(4)
        .learning_rate(0.1)
        .build()
        .unwrap()
}

fn net_params() -> RankNetParams {
    RankNetParams::builder()
        .n_iteration(10)
        .n_hidden_nodes(4)
        .learning_rate(0.001)
        .build()
        .unwrap()
}

/// Small, fast parameters for each kind.
fn small_ranker(kind: RankerKind) -> Box<dyn Ranker> {
    match kind {
        RankerKind::Mart => Box::new(LambdaMart::mart(mart_params())),
        RankerKind::LambdaMart => Box::new(LambdaMart::new(mart_params())),
        RankerKind::RandomForests => Box::new(RandomForest::new(
            RandomForestParams::builder()
                .n_bag(4)
                .n_tree_leaves(4)
                .build()
                .unwrap(),
        )),
        RankerKind::RankNet => Box::new(RankNet::new(net_params())),
        RankerKind::LambdaRank => Box::new(RankNet::lambda_rank(net_params())),
        RankerKind::ListNet => Box::new(ListNet::new(
            ListNetParams::builder()
                .n_iteration(30)
                .learning_rate(0.01)
                .build()
                .unwrap(),
        )),
        RankerKind::CoordinateAscent => Box::new(CoorAscent::new(
            CoorAscentParams::builder()
                .n_restart(1)
                .max_iteration(5)
                .build()
                .unwrap(),
        )),
        RankerKind::LinearRegression => Box::new(LinearReg::new(Default::default())),
        RankerKind::AdaRank => Box::new(AdaRank::new(
            AdaRankParams::builder().n_iteration(20).build().unwrap(),
        )),
        RankerKind::RankBoost => Box::new(RankBoost::new(
            RankBoostParams::builder().n_iteration(20).build().unwrap(),
        )),
    }
}

fn config(n_threads: usize) -> TrainingConfig {
    TrainingConfig::builder()
        .seed(7)
        .n_threads(NonZeroUsize::new(n_threads).unwrap())
        .build()
        .unwrap()
}

fn train(kind: RankerKind) -> (Box<dyn Ranker>, Vec<RankList>) {
    let samples = letor_samples(8, 8, 11);
    let validation = letor_samples(3, 8, 12);
    let mut ranker = small_ranker(kind);
    let report = Trainer::new(config(2))
        .train(ranker.as_mut(), &samples, Some(&validation), None)
        .unwrap_or_else(|e| panic!("{kind}: {}", e.chain()));

    assert_eq!(report.metric, "NDCG@10");
    assert!((0.0..=1.0).contains(&report.train_score), "{kind}: {report:?}");
    let validation_score = report.validation_score.unwrap();
    assert!((0.0..=1.0).contains(&validation_score), "{kind}: {report:?}");
    (ranker, samples)
}

fn points(samples: &[RankList]) -> impl Iterator<Item = &DataPoint> {
    samples.iter().flat_map(RankList::points)
}

#[rstest]
fn model_text_reloads(
    #[values(
        RankerKind::Mart,
        RankerKind::RankBoost,
        RankerKind::RankNet,
        RankerKind::AdaRank,
        RankerKind::CoordinateAscent,
        RankerKind::LambdaRank,
        RankerKind::LambdaMart,
        RankerKind::ListNet,
        RankerKind::RandomForests,
        RankerKind::LinearRegression
    )]
    kind: RankerKind,
) {
    let (ranker, samples) = train(kind);
    let text = ranker.model();
    assert!(text.starts_with(&format!("## {}", kind.name())), "{text}");

    let reloaded = RankerFactory
        .load_ranker_from_string(&text)
        .unwrap_or_else(|e| panic!("{kind}: {}", e.chain()));
    assert_eq!(reloaded.kind(), kind);
    for p in points(&samples) {
        let expected = ranker.eval(p);
        assert_approx_eq_f64!(reloaded.eval(p), expected, 1e-9 * (1.0 + expected.abs()));
    }
}

#[rstest]
fn trained_models_serve(
    #[values(
        RankerKind::Mart,
        RankerKind::RankBoost,
        RankerKind::RankNet,
        RankerKind::AdaRank,
        RankerKind::CoordinateAscent,
        RankerKind::LambdaRank,
        RankerKind::LambdaMart,
        RankerKind::ListNet,
        RankerKind::RandomForests,
        RankerKind::LinearRegression
    )]
    kind: RankerKind,
) {
    let (ranker, samples) = train(kind);
    let served = ParserFactory::default()
        .parse("model/ranklib", &feature_set(&["f1", "f2", "f3"]), &ranker.model())
        .unwrap_or_else(|e| panic!("{kind}: {}", e.chain()));

    for p in points(&samples) {
        let mut v = served.new_feature_vector();
        for fid in 1..=3 {
            v.set_feature_score(fid - 1, p.feature_value(fid));
        }
        let expected = ranker.eval(p) as f32;
        assert_approx_eq!(served.score(v.as_ref()), expected, 1e-5 * (1.0 + expected.abs()));
    }
}

#[rstest]
#[case(RankerKind::LinearRegression)]
#[case(RankerKind::LambdaMart)]
fn training_learns_the_labels(#[case] kind: RankerKind) {
    let samples = letor_samples(20, 10, 21);
    let mut ranker = match kind {
        RankerKind::LambdaMart => Box::new(LambdaMart::new(
            LambdaMartParams::builder()
                .n_trees(50)
                .n_tree_leaves(8)
                .build()
                .unwrap(),
        )) as Box<dyn Ranker>,
        kind => RankerFactory.create(kind),
    };
    let report = Trainer::new(config(2))
        .train(ranker.as_mut(), &samples, None, None)
        .unwrap();
    assert!(report.train_score > 0.9, "{kind}: {report:?}");
    assert_eq!(report.validation_score, None);
}
