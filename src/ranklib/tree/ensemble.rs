//! Weighted tree ensembles and their `<ensemble>` XML form.

use std::collections::BTreeSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::super::data::FeatureLookup;
use super::super::error::{parse_num, RankLibError, Result};
use super::super::model_text::FeatureResolver;
use super::regression_tree::{NodeIndex, RegressionTree, TreeNode};

/// `Σ weight · tree(x)`, accumulated in `f32`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ensemble {
    trees: Vec<RegressionTree>,
    weights: Vec<f32>,
}

impl Ensemble {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tree: RegressionTree, weight: f32) {
        self.trees.push(tree);
        self.weights.push(weight);
    }

    /// Keep only the first `n` trees.
    pub fn truncate(&mut self, n: usize) {
        self.trees.truncate(n);
        self.weights.truncate(n);
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.trees.iter().map(RegressionTree::n_leaves).sum()
    }

    pub fn tree(&self, k: usize) -> &RegressionTree {
        &self.trees[k]
    }

    pub fn weight(&self, k: usize) -> f32 {
        self.weights[k]
    }

    pub fn eval(&self, point: &dyn FeatureLookup) -> f32 {
        self.trees
            .iter()
            .zip(&self.weights)
            .fold(0.0f32, |s, (tree, &w)| {
                (f64::from(s) + f64::from(tree.eval(point)) * f64::from(w)) as f32
            })
    }

    /// Distinct feature ids used by any split, ascending.
    pub fn features(&self) -> Vec<usize> {
        self.trees
            .iter()
            .flat_map(RegressionTree::split_features)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<ensemble>\n");
        for (i, (tree, w)) in self.trees.iter().zip(&self.weights).enumerate() {
            out.push_str(&format!("\t<tree id=\"{}\" weight=\"{w:?}\">\n", i + 1));
            tree.write_xml(&mut out, "\t\t");
            out.push_str("\t</tree>\n");
        }
        out.push_str("</ensemble>\n");
        out
    }

    /// Parse an `<ensemble>` block; feature references go through `resolver`.
    pub fn parse(xml: &str, resolver: &FeatureResolver<'_>) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut ensemble = Ensemble::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"tree" => {
                    let weight: f32 = parse_num(&attribute(&e, b"weight")?, "tree weight")?;
                    let mut nodes = Vec::new();
                    loop {
                        match reader.read_event()? {
                            Event::Start(e) if e.name().as_ref() == b"split" => {
                                parse_split(&mut reader, &mut nodes, resolver)?;
                            }
                            Event::End(e) if e.name().as_ref() == b"tree" => break,
                            Event::Eof => return Err(truncated()),
                            _ => {}
                        }
                    }
                    if nodes.is_empty() {
                        return Err(RankLibError::InvalidModel(
                            "Tree without a <split> root.".into(),
                        ));
                    }
                    ensemble.add(RegressionTree::from_nodes(nodes), weight);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        tracing::trace!(n_trees = ensemble.tree_count(), "ensemble parsed");
        Ok(ensemble)
    }
}

fn truncated() -> RankLibError {
    RankLibError::InvalidModel("Unexpected end of ensemble XML.".into())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<String> {
    let attr = e
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
        .ok_or_else(|| {
            RankLibError::InvalidModel(format!(
                "Missing attribute [{}]",
                String::from_utf8_lossy(name)
            ))
        })?;
    Ok(attr.unescape_value()?.into_owned())
}

/// Text content of the element just opened, up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(truncated()),
            _ => {}
        }
    }
}

/// Parse the body of a `<split>` whose start tag was just read.
///
/// The node's slot is reserved before its children so the root stays at 0.
fn parse_split(
    reader: &mut Reader<&[u8]>,
    nodes: &mut Vec<TreeNode>,
    resolver: &FeatureResolver<'_>,
) -> Result<NodeIndex> {
    let id = nodes.len();
    nodes.push(TreeNode::Leaf { output: 0.0 });

    let mut feature = None;
    let mut threshold = None;
    let mut output = None;
    let mut children = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"feature" => feature = Some(read_text(reader)?),
                b"threshold" => threshold = Some(read_text(reader)?),
                b"output" => output = Some(read_text(reader)?),
                b"split" => children.push(parse_split(reader, nodes, resolver)?),
                other => {
                    return Err(RankLibError::InvalidModel(format!(
                        "Unexpected element <{}>",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(e) if e.name().as_ref() == b"split" => break,
            Event::Eof => return Err(truncated()),
            _ => {}
        }
    }

    nodes[id] = match (feature, threshold, output, children.as_slice()) {
        (Some(feature), Some(threshold), None, &[left, right]) => TreeNode::Split {
            feature: resolver.resolve(&feature)?,
            threshold: parse_num(&threshold, "threshold")?,
            left,
            right,
        },
        (None, None, Some(output), &[]) => TreeNode::Leaf {
            output: parse_num(&output, "output")?,
        },
        _ => return Err(RankLibError::InvalidModel("Malformed <split> node.".into())),
    };
    Ok(id)
}
