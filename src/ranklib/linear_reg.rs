//! Linear regression on the relevance labels (ridge-regularised least squares).

use ndarray::{Array1, Array2};

use super::config::LinearRegParams;
use super::data::FeatureLookup;
use super::error::{parse_num, RankLibError, Result};
use super::model_text::{content_lines, parse_pairs, FeatureResolver, FeatureType};
use super::ranker::{Ranker, RankerKind, TrainingContext};

/// `score = bias + Σ w[i] · x[features[i]]`.
#[derive(Debug, Clone, Default)]
pub struct LinearReg {
    params: LinearRegParams,
    features: Vec<usize>,
    weights: Vec<f64>,
    bias: f64,
}

impl LinearReg {
    pub fn new(params: LinearRegParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl Ranker for LinearReg {
    fn kind(&self) -> RankerKind {
        RankerKind::LinearRegression
    }

    fn features(&self) -> &[usize] {
        &self.features
    }

    fn init(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        self.features = ctx.features.to_vec();
        self.weights = vec![0.0; self.features.len()];
        self.bias = 0.0;
        Ok(())
    }

    fn learn(&mut self, ctx: &TrainingContext<'_>) -> Result<()> {
        let n_var = self.features.len() + 1;
        let mut xtx = Array2::<f64>::zeros((n_var, n_var));
        let mut xty = Array1::<f64>::zeros(n_var);
        let mut x = Array1::<f64>::zeros(n_var);

        for point in ctx.samples.iter().flat_map(|rl| rl.points()) {
            for (slot, &fid) in x.iter_mut().zip(&self.features) {
                *slot = point.feature_value(fid) as f64;
            }
            x[n_var - 1] = 1.0;
            let label = point.label() as f64;
            for i in 0..n_var {
                for j in 0..n_var {
                    xtx[[i, j]] += x[i] * x[j];
                }
                xty[i] += x[i] * label;
            }
        }
        for i in 0..n_var {
            xtx[[i, i]] += self.params.lambda;
        }

        let solution = solve(xtx, xty)?;
        self.weights = solution.iter().take(n_var - 1).copied().collect();
        self.bias = solution[n_var - 1];

        let train = ctx.training_score(&*self);
        ctx.logger
            .round(1, &ctx.scorer.name(), train, ctx.validation_score(&*self));
        Ok(())
    }

    fn eval(&self, point: &dyn FeatureLookup) -> f64 {
        self.bias
            + self
                .features
                .iter()
                .zip(&self.weights)
                .map(|(&fid, w)| w * point.feature_value(fid) as f64)
                .sum::<f64>()
    }

    /// The bias is written as feature `0`.
    fn model(&self) -> String {
        let mut out = format!("## {}\n## Lambda = {:?}\n", self.name(), self.params.lambda);
        let mut pairs = vec![format!("0:{:?}", self.bias)];
        pairs.extend(
            self.features
                .iter()
                .zip(&self.weights)
                .map(|(fid, w)| format!("{fid}:{w:?}")),
        );
        out += &pairs.join(" ");
        out
    }

    fn load_from_string(&mut self, text: &str, resolver: &FeatureResolver<'_>) -> Result<()> {
        let load = || -> Result<(Vec<usize>, Vec<f64>, f64)> {
            let line = content_lines(text)
                .next()
                .ok_or_else(|| RankLibError::InvalidModel("Model has no weights.".into()))?;
            let mut features = Vec::new();
            let mut weights = Vec::new();
            let mut bias = 0.0;
            for (key, value) in parse_pairs(line) {
                let weight: f64 = parse_num(value, "weight")?;
                let is_bias = match resolver.kind() {
                    FeatureType::Ordinal => parse_num::<usize>(key, "feature id")? == 0,
                    FeatureType::Named => key == "0",
                };
                if is_bias {
                    bias = weight;
                } else {
                    features.push(resolver.resolve(key)?);
                    weights.push(weight);
                }
            }
            Ok((features, weights, bias))
        };
        let (features, weights, bias) =
            load().map_err(|e| e.context("Error in LinearRegRank::load()"))?;
        self.features = features;
        self.weights = weights;
        self.bias = bias;
        Ok(())
    }
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]] == 0.0 {
            return Err(RankLibError::InvalidData(
                "Linear system is singular; set lambda > 0.".into(),
            ));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
