//! Feed-forward networks of sigmoid neurons.
//!
//! Neurons live in one flat arena, numbered layer by layer; the input layer
//! ends with a bias neuron whose output is always 1. Synapses are stored
//! once and referenced by index from both of their endpoints.

use std::ops::Range;

use rand::Rng;

use super::super::data::FeatureLookup;
use super::super::error::{parse_num, RankLibError, Result};
use super::super::model_text::{content_lines, FeatureResolver};

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Slope used by back-propagation, evaluated at a neuron's *output*.
#[inline]
fn derivative(output: f64) -> f64 {
    let s = sigmoid(output);
    s * (1.0 - s)
}

/// Weight draw for a new synapse: uniform magnitude in `[0, 0.1)`, random sign.
pub(crate) fn random_weight<R: Rng>(rng: &mut R) -> f64 {
    let sign = if rng.gen_range(0..2) == 0 { 1.0f32 } else { -1.0 };
    f64::from(sign * rng.gen::<f32>() / 10.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synapse {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// How a pair's error signal is computed at the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLoss {
    /// RankNet cross-entropy gradient.
    CrossEntropy,
    /// LambdaRank: target probability minus the modelled one, metric-weighted.
    Lambda,
}

/// Document `other` paired with the document being updated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub other: usize,
    pub weight: f32,
    /// `1` when the current document should rank above `other`.
    pub target: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    /// First neuron of each layer, then the neuron count.
    offsets: Vec<usize>,
    synapses: Vec<Synapse>,
    in_links: Vec<Vec<usize>>,
    out_links: Vec<Vec<usize>>,
}

impl Network {
    /// `n_inputs` inputs plus the bias, the `hidden` layers, then `n_outputs`.
    ///
    /// Synapse weights are drawn from `init` in wiring order: inputs to the
    /// first layer, each layer to the next, then the bias to every neuron.
    pub fn new(
        n_inputs: usize,
        hidden: &[usize],
        n_outputs: usize,
        mut init: impl FnMut() -> f64,
    ) -> Self {
        let mut offsets = vec![0, n_inputs + 1];
        for &size in hidden.iter().chain(std::iter::once(&n_outputs)) {
            offsets.push(offsets[offsets.len() - 1] + size);
        }
        let n = offsets[offsets.len() - 1];
        let mut net = Self {
            offsets,
            synapses: Vec::new(),
            in_links: vec![Vec::new(); n],
            out_links: vec![Vec::new(); n],
        };

        for i in 0..n_inputs {
            for j in net.layer(1) {
                net.connect(i, j, init());
            }
        }
        for l in 1..net.n_layers() - 1 {
            for j in net.layer(l) {
                for k in net.layer(l + 1) {
                    net.connect(j, k, init());
                }
            }
        }
        let bias = net.bias();
        for l in 1..net.n_layers() {
            for j in net.layer(l) {
                net.connect(bias, j, init());
            }
        }
        net
    }

    fn connect(&mut self, source: usize, target: usize, weight: f64) {
        let id = self.synapses.len();
        self.synapses.push(Synapse {
            source,
            target,
            weight,
        });
        self.out_links[source].push(id);
        self.in_links[target].push(id);
    }

    pub fn n_layers(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn n_neurons(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Neuron ids of layer `l`.
    pub fn layer(&self, l: usize) -> Range<usize> {
        self.offsets[l]..self.offsets[l + 1]
    }

    pub fn n_hidden_layers(&self) -> usize {
        self.n_layers() - 2
    }

    fn bias(&self) -> usize {
        self.offsets[1] - 1
    }

    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn weights(&self) -> Vec<f64> {
        self.synapses.iter().map(|s| s.weight).collect()
    }

    pub fn set_weights(&mut self, weights: &[f64]) {
        for (s, &w) in self.synapses.iter_mut().zip(weights) {
            s.weight = w;
        }
    }

    /// Outputs of every neuron for one document.
    pub fn forward(&self, point: &dyn FeatureLookup, features: &[usize]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_neurons()];
        for (k, &fid) in features.iter().enumerate() {
            out[k] = f64::from(point.feature_value(fid));
        }
        out[self.bias()] = 1.0;
        for l in 1..self.n_layers() {
            for j in self.layer(l) {
                let wsum: f64 = self.in_links[j]
                    .iter()
                    .map(|&s| out[self.synapses[s].source] * self.synapses[s].weight)
                    .sum();
                out[j] = sigmoid(wsum);
            }
        }
        out
    }

    /// Output of the first output neuron.
    pub fn eval(&self, point: &dyn FeatureLookup, features: &[usize]) -> f64 {
        let out = self.forward(point, features);
        out[self.offsets[self.n_layers() - 1]]
    }

    /// One pairwise back-propagation step for document `current`.
    ///
    /// `outputs[d]` holds every neuron's output for document `d` of the list.
    /// All deltas are computed with the weights as they stand before any
    /// of them is updated.
    pub fn pairwise_update(
        &mut self,
        outputs: &[Vec<f64>],
        current: usize,
        pairs: &[Pair],
        loss: PairLoss,
        learning_rate: f64,
    ) {
        let n = self.n_neurons();
        let last = self.n_layers() - 1;
        let mut delta_i = vec![0.0; n];
        let mut deltas_j: Vec<Vec<f64>> = vec![Vec::new(); n];

        for j in self.layer(last) {
            let oi = outputs[current][j];
            let mut di = 0.0;
            let mut dj = vec![0.0; pairs.len()];
            for (k, pair) in pairs.iter().enumerate() {
                let oj = outputs[pair.other][j];
                let pij = match loss {
                    PairLoss::CrossEntropy => 1.0 / (1.0 + (oi - oj).exp()),
                    PairLoss::Lambda => f64::from(pair.target) - sigmoid(oi - oj),
                };
                let lambda = f64::from(pair.weight) * pij;
                di += lambda;
                dj[k] = lambda * derivative(oj);
            }
            delta_i[j] = di * derivative(oi);
            deltas_j[j] = dj;
        }

        for l in (1..last).rev() {
            for j in self.layer(l) {
                let mut di = 0.0;
                let mut dj = vec![0.0; pairs.len()];
                for (k, pair) in pairs.iter().enumerate() {
                    let mut error_sum = 0.0;
                    for &s in &self.out_links[j] {
                        let syn = &self.synapses[s];
                        error_sum += deltas_j[syn.target][k] * syn.weight;
                        if k == 0 {
                            di += delta_i[syn.target] * syn.weight;
                        }
                    }
                    let w = f64::from(pair.weight);
                    if k == 0 {
                        di *= w * derivative(outputs[current][j]);
                    }
                    dj[k] = error_sum * w * derivative(outputs[pair.other][j]);
                }
                delta_i[j] = di;
                deltas_j[j] = dj;
            }
        }

        for j in self.offsets[1]..n {
            for &s in &self.in_links[j] {
                let source = self.synapses[s].source;
                let sum_j: f64 = pairs
                    .iter()
                    .zip(&deltas_j[j])
                    .map(|(pair, d)| d * outputs[pair.other][source])
                    .sum();
                let gradient = delta_i[j] * outputs[current][source] - sum_j;
                self.synapses[s].weight += learning_rate * gradient;
            }
        }
    }

    /// One listwise step: moves the top-one distribution of the outputs
    /// towards that of the labels. Only the output layer is updated.
    pub fn listwise_update(&mut self, outputs: &[Vec<f64>], labels: &[f32], learning_rate: f64) {
        let label_exp: Vec<f64> = labels.iter().map(|&l| f64::from(l).exp()).collect();
        let label_sum: f64 = label_exp.iter().sum();
        for j in self.layer(self.n_layers() - 1) {
            let score_exp: Vec<f64> = outputs.iter().map(|o| o[j].exp()).collect();
            let score_sum: f64 = score_exp.iter().sum();
            let diff: Vec<f64> = label_exp
                .iter()
                .zip(&score_exp)
                .map(|(l, s)| l / label_sum - s / score_sum)
                .collect();
            for &s in &self.in_links[j] {
                let source = self.synapses[s].source;
                let dw: f64 = diff.iter().zip(outputs).map(|(d, o)| d * o[source]).sum();
                self.synapses[s].weight += learning_rate * dw;
            }
        }
    }

    /// `layer neuron w1 w2 ...` lines: the out-going weights of every
    /// neuron outside the output layer.
    pub fn write_weights(&self, out: &mut String) {
        for l in 0..self.n_layers() - 1 {
            for (j, id) in self.layer(l).enumerate() {
                let weights: Vec<String> = self.out_links[id]
                    .iter()
                    .map(|&s| format!("{:?}", self.synapses[s].weight))
                    .collect();
                out.push_str(&format!("{l} {j} {}\n", weights.join(" ")));
            }
        }
    }

    fn set_out_weights(&mut self, layer: usize, neuron: usize, weights: &[f64]) -> Result<()> {
        if layer + 1 >= self.n_layers() || neuron >= self.layer(layer).len() {
            return Err(RankLibError::InvalidModel(format!(
                "No neuron {neuron} in layer {layer} with out-going weights."
            )));
        }
        let id = self.offsets[layer] + neuron;
        let links = &self.out_links[id];
        if weights.len() < links.len() {
            return Err(RankLibError::InvalidModel(format!(
                "Neuron {neuron} in layer {layer} needs {} weights, found {}.",
                links.len(),
                weights.len()
            )));
        }
        for (&s, &w) in links.iter().zip(weights) {
            self.synapses[s].weight = w;
        }
        Ok(())
    }
}

/// Features and network of a neural-net model text.
///
/// Layout after the `##` header: the feature line, the hidden layer count,
/// one size per hidden layer, then [`Network::write_weights`] lines.
pub(crate) fn load_network(
    text: &str,
    resolver: &FeatureResolver<'_>,
) -> Result<(Vec<usize>, Network)> {
    let lines: Vec<&str> = content_lines(text).collect();
    let missing = |what: &str| RankLibError::InvalidModel(format!("Model has no {what} line."));

    let features = lines
        .first()
        .ok_or_else(|| missing("feature"))?
        .split_whitespace()
        .map(|token| resolver.resolve(token))
        .collect::<Result<Vec<_>>>()?;
    let n_hidden: usize = parse_num(
        lines.get(1).ok_or_else(|| missing("hidden layer count"))?,
        "hidden layer count",
    )?;
    let hidden = (0..n_hidden)
        .map(|h| parse_num(lines.get(2 + h).ok_or_else(|| missing("layer size"))?, "layer size"))
        .collect::<Result<Vec<usize>>>()?;

    let mut network = Network::new(features.len(), &hidden, 1, || 0.0);
    for line in lines.iter().skip(2 + n_hidden) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [layer, neuron, weights @ ..] = tokens.as_slice() else {
            return Err(RankLibError::InvalidModel(format!("Malformed weight line [{line}]")));
        };
        let weights = weights
            .iter()
            .map(|w| parse_num(w, "weight"))
            .collect::<Result<Vec<f64>>>()?;
        let (layer, neuron) = (parse_num(layer, "layer")?, parse_num(neuron, "neuron")?);
        network.set_out_weights(layer, neuron, &weights)?;
    }
    Ok((features, network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq_f64;
    use crate::ranklib::data::DataPoint;

    fn counter() -> impl FnMut() -> f64 {
        let mut next = 0.0;
        move || {
            next += 0.1;
            next
        }
    }

    #[test]
    fn wiring_order_and_shape() {
        let net = Network::new(2, &[3], 1, counter());
        assert_eq!(net.n_layers(), 3);
        assert_eq!(net.n_neurons(), 3 + 3 + 1);
        // 2 inputs x 3 hidden, 3 hidden x 1 output, bias to 4 neurons
        assert_eq!(net.synapses().len(), 6 + 3 + 4);
        assert_eq!(net.synapses()[0].source, 0);
        assert_eq!(net.synapses()[0].target, 3);
        let bias = net.synapses()[9];
        assert_eq!((bias.source, bias.target), (2, 3));
    }

    #[test]
    fn forward_without_hidden_layer_is_a_logistic_unit() {
        let mut net = Network::new(2, &[], 1, || 0.0);
        net.set_weights(&[0.5, -1.0, 0.25]);
        let p = DataPoint::from_features(0.0, "q", &[2.0, 1.0]);
        assert_approx_eq_f64!(net.eval(&p, &[1, 2]), sigmoid(0.5 * 2.0 - 1.0 + 0.25), 1e-12);
    }

    #[test]
    fn pairwise_step_widens_the_gap() {
        let mut net = Network::new(1, &[2], 1, counter());
        let hi = DataPoint::from_features(1.0, "q", &[1.0]);
        let lo = DataPoint::from_features(0.0, "q", &[0.0]);
        let features = [1];
        let gap = |net: &Network| net.eval(&hi, &features) - net.eval(&lo, &features);

        let before = gap(&net);
        let outputs = vec![net.forward(&hi, &features), net.forward(&lo, &features)];
        let pairs = [Pair {
            other: 1,
            weight: 1.0,
            target: 1.0,
        }];
        net.pairwise_update(&outputs, 0, &pairs, PairLoss::CrossEntropy, 1.0);
        assert!(gap(&net) > before);
    }

    #[test]
    fn listwise_step_follows_the_labels() {
        let mut net = Network::new(1, &[], 1, || 0.0);
        let hi = DataPoint::from_features(2.0, "q", &[1.0]);
        let lo = DataPoint::from_features(0.0, "q", &[-1.0]);
        let features = [1];
        let outputs = vec![net.forward(&hi, &features), net.forward(&lo, &features)];
        net.listwise_update(&outputs, &[2.0, 0.0], 0.5);
        assert!(net.eval(&hi, &features) > net.eval(&lo, &features));
    }

    #[test]
    fn weight_lines_reload() {
        let net = Network::new(2, &[2], 1, counter());
        let mut text = String::from("1 2\n1\n2\n");
        net.write_weights(&mut text);
        let (features, loaded) = load_network(&text, &FeatureResolver::ordinal()).unwrap();
        assert_eq!(features, vec![1, 2]);
        assert_eq!(loaded.weights(), net.weights());
    }

    #[test]
    fn short_weight_lines_are_rejected() {
        let err = load_network("1\n0\n0 0\n", &FeatureResolver::ordinal()).unwrap_err();
        assert!(err.to_string().contains("needs 1 weights"));
        assert!(load_network("1\n0\n5 0 1.0\n", &FeatureResolver::ordinal()).is_err());
    }
}
