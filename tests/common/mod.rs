//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use ltrkit::ranklib::{parse_samples, RankList};
use ltrkit::{FeatureSet, LtrRanker};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Directory holding the model fixtures.
pub fn models_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/models")
}

pub fn read_model(name: &str) -> String {
    let path = models_dir().join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()))
}

pub fn feature_set(names: &[&str]) -> FeatureSet {
    FeatureSet::new(names.iter().copied()).expect("feature names are distinct")
}

/// Score one document given `(ordinal, value)` pairs; unset features are 0.
pub fn score(ranker: &dyn LtrRanker, values: &[(usize, f32)]) -> f32 {
    let mut v = ranker.new_feature_vector();
    for &(ordinal, value) in values {
        v.set_feature_score(ordinal, value);
    }
    ranker.score(v.as_ref())
}

/// Synthetic judged queries in SVMLight text.
///
/// Three features per document in `[0, 1)`. The label is
/// `round(2 * f1 + f2)` clamped to `0..=3`; `f3` is noise.
pub fn letor_text(n_queries: usize, docs_per_query: usize, seed: u64) -> String {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut out = String::new();
    for q in 1..=n_queries {
        for d in 0..docs_per_query {
            let f: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];
            let label = (2.0 * f[0] + f[1]).round().clamp(0.0, 3.0);
            out += &format!(
                "{label} qid:{q} 1:{:.4} 2:{:.4} 3:{:.4} # q{q}d{d}\n",
                f[0], f[1], f[2]
            );
        }
    }
    out
}

pub fn letor_samples(n_queries: usize, docs_per_query: usize, seed: u64) -> Vec<RankList> {
    parse_samples(&letor_text(n_queries, docs_per_query, seed)).expect("generated samples parse")
}
