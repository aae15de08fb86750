//! Sample parsing and metric behaviour on generated data.

use crate::common::{letor_samples, letor_text};
use ltrkit::assert_approx_eq_f64;
use ltrkit::ranklib::{parse_samples, MetricKind, RankLibError};
use ltrkit::WorkerPool;
use rstest::rstest;

#[test]
fn samples_group_by_query() {
    let lists = letor_samples(5, 7, 1);
    assert_eq!(lists.len(), 5);
    for (q, list) in lists.iter().enumerate() {
        assert_eq!(list.len(), 7);
        assert_eq!(list.id(), (q + 1).to_string());
        assert!(list.get(0).description().starts_with("# q"));
        assert_eq!(list.get(0).max_feature_id(), 3);
    }
}

#[test]
fn samples_reparse_from_display() {
    let lists = letor_samples(2, 3, 4);
    let text: String = lists
        .iter()
        .flat_map(|l| l.points())
        .map(|p| format!("{p}\n"))
        .collect();
    let reparsed = parse_samples(&text).unwrap();
    assert_eq!(reparsed.len(), lists.len());
    let expected = lists.iter().flat_map(|l| l.points());
    for (a, b) in reparsed.iter().flat_map(|l| l.points()).zip(expected) {
        assert_eq!(a.label(), b.label());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.description(), b.description());
        for fid in 1..=3 {
            assert_eq!(a.feature_value(fid), b.feature_value(fid));
        }
    }
}

#[test]
fn blank_and_comment_lines_are_skipped() {
    let text = format!("# header\n\n{}", letor_text(1, 2, 9));
    assert_eq!(parse_samples(&text).unwrap().len(), 1);
}

#[test]
fn negative_label_is_rejected() {
    let err = parse_samples("-1 qid:1 1:0.5\n").unwrap_err();
    assert!(matches!(err, RankLibError::Context { .. }), "{err:?}");
}

#[rstest]
#[case("NDCG@10")]
#[case("DCG@5")]
#[case("ERR@10")]
#[case("P@3")]
#[case("MAP")]
#[case("RR@10")]
fn ideal_ranking_is_never_beaten(#[case] metric: &str) {
    let scorer = metric.parse::<MetricKind>().unwrap().scorer();
    assert_eq!(scorer.name(), metric);
    for list in letor_samples(6, 8, 3) {
        let ideal = scorer.score(&list.correct_ranking().labels());
        for fid in 1..=3 {
            assert!(scorer.score(&list.ranking_by_feature(fid).labels()) <= ideal + 1e-12);
        }
    }
}

#[test]
fn ndcg_of_ideal_ranking_is_one() {
    let lists: Vec<_> = letor_samples(6, 8, 3)
        .iter()
        .map(|l| l.correct_ranking())
        .filter(|l| l.labels().iter().any(|&y| y > 0.0))
        .collect();
    let scorer = MetricKind::Ndcg(10).scorer();
    let sequential = scorer.score_all(&lists, &WorkerPool::sequential());
    assert_approx_eq_f64!(sequential, 1.0, 1e-12);
    let pool = WorkerPool::new(4).unwrap();
    assert_eq!(scorer.score_all(&lists, &pool), sequential);
}
