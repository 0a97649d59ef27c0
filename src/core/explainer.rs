//! Exact path-dependent TreeSHAP (Lundberg et al., "Consistent Individualized
//! Feature Attribution for Tree Ensembles", algorithm 2) over the margin.
//!
//! Every call allocates its own path buffers; the explainer itself is
//! immutable and can be shared across threads.

use crate::core::ensemble::{NodeKind, Tree, TreeEnsemble};
use crate::domain::model::{AttributionResult, Feature, FeatureContribution, FeatureVector, FEATURE_COUNT};
use crate::utils::error::{Result, RiskError};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TreeExplainer {
    model: Arc<TreeEnsemble>,
    baseline: f64,
}

impl TreeExplainer {
    pub fn new(model: Arc<TreeEnsemble>) -> Result<Self> {
        for (t, tree) in model.trees().iter().enumerate() {
            for (n, node) in tree.nodes().iter().enumerate() {
                match node.cover {
                    Some(cover) if cover.is_finite() && cover > 0.0 => {}
                    _ => {
                        return Err(RiskError::ExplainerUnavailable {
                            reason: format!("tree {} node {} has no positive cover", t, n),
                        })
                    }
                }
            }
        }

        let baseline = model.base_margin()
            + model
                .trees()
                .iter()
                .map(|tree| expected_value(tree, 0))
                .sum::<f64>();
        if !baseline.is_finite() {
            return Err(RiskError::ExplainerUnavailable {
                reason: "expected model output is not finite".to_string(),
            });
        }

        Ok(Self { model, baseline })
    }

    /// Expected margin over the training distribution (the attribution baseline).
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn explain(&self, x: &FeatureVector) -> AttributionResult {
        let mut phi = [0.0; FEATURE_COUNT];
        for tree in self.model.trees() {
            let mut walk = ShapWalk {
                tree,
                x: x.as_slice(),
                phi: &mut phi,
            };
            walk.recurse(0, &[], 0, 1.0, 1.0, None);
        }

        AttributionResult {
            baseline: self.baseline,
            margin: self.model.margin(x),
            contributions: Feature::ALL
                .iter()
                .map(|&feature| FeatureContribution {
                    feature,
                    contribution: phi[feature.index()],
                })
                .collect(),
        }
    }
}

fn cover(tree: &Tree, index: usize) -> f64 {
    tree.node(index).cover.unwrap_or(0.0)
}

fn expected_value(tree: &Tree, index: usize) -> f64 {
    match tree.node(index).kind {
        NodeKind::Leaf { value } => value,
        NodeKind::Split { yes, no, .. } => {
            let parent = cover(tree, index);
            (cover(tree, yes) * expected_value(tree, yes) + cover(tree, no) * expected_value(tree, no))
                / parent
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// `path[..=depth]` is live after the call.
fn extend_path(path: &mut [PathElement], depth: usize, zero: f64, one: f64, feature: Option<usize>) {
    path[depth] = PathElement {
        feature,
        zero_fraction: zero,
        one_fraction: one,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    };
    let d = depth as f64;
    for i in (0..depth).rev() {
        let fi = i as f64;
        path[i + 1].weight += one * path[i].weight * (fi + 1.0) / (d + 1.0);
        path[i].weight = zero * path[i].weight * (d - fi) / (d + 1.0);
    }
}

/// Undoes the extension for `path[index]`; `path[..depth]` is live afterwards.
fn unwind_path(path: &mut [PathElement], depth: usize, index: usize) {
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next_one_portion * (d + 1.0) / ((fi + 1.0) * one);
            next_one_portion = tmp - path[i].weight * zero * (d - fi) / (d + 1.0);
        } else {
            path[i].weight = path[i].weight * (d + 1.0) / (zero * (d - fi));
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
}

/// Total permutation weight of `path` with `path[index]` removed.
fn unwound_path_sum(path: &[PathElement], depth: usize, index: usize) -> f64 {
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let d = depth as f64;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one != 0.0 {
            let tmp = next_one_portion * (d + 1.0) / ((fi + 1.0) * one);
            total += tmp;
            next_one_portion = path[i].weight - tmp * zero * ((d - fi) / (d + 1.0));
        } else if zero != 0.0 {
            total += (path[i].weight / zero) / ((d - fi) / (d + 1.0));
        }
    }
    total
}

struct ShapWalk<'a> {
    tree: &'a Tree,
    x: &'a [f64],
    phi: &'a mut [f64; FEATURE_COUNT],
}

impl ShapWalk<'_> {
    fn recurse(
        &mut self,
        index: usize,
        parent_path: &[PathElement],
        depth: usize,
        zero: f64,
        one: f64,
        feature: Option<usize>,
    ) {
        let mut path = Vec::with_capacity(depth + 1);
        path.extend_from_slice(&parent_path[..depth]);
        path.push(PathElement::default());
        extend_path(&mut path, depth, zero, one, feature);

        let node = self.tree.node(index);
        match node.kind {
            NodeKind::Leaf { value } => {
                for i in 1..=depth {
                    let w = unwound_path_sum(&path, depth, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        self.phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                    }
                }
            }
            NodeKind::Split {
                feature: split,
                yes,
                no,
                ..
            } => {
                let hot = node.next(self.x[split]).unwrap_or(yes);
                let cold = if hot == yes { no } else { yes };
                let node_cover = cover(self.tree, index);
                let hot_zero = cover(self.tree, hot) / node_cover;
                let cold_zero = cover(self.tree, cold) / node_cover;

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                let mut depth = depth;

                // a feature already on the path is folded into one element
                if let Some(k) = (1..=depth).find(|&k| path[k].feature == Some(split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, depth, k);
                    depth -= 1;
                }

                self.recurse(hot, &path, depth + 1, hot_zero * incoming_zero, incoming_one, Some(split));
                self.recurse(cold, &path, depth + 1, cold_zero * incoming_zero, 0.0, Some(split));
            }
        }
    }
}
