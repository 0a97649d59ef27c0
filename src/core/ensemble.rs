//! Gradient-boosted tree ensemble: artifact parsing and margin evaluation.
//!
//! The artifact is a JSON document whose `trees` use the XGBoost JSON dump
//! node layout (`nodeid`, `split`, `split_condition`, `yes`, `no`,
//! `missing`, `leaf`, `cover`, `children`). Nested nodes are flattened into
//! an arena per tree with the root at index 0.

use crate::domain::model::{Feature, FeatureVector, FEATURE_COUNT};
use crate::utils::error::{Result, RiskError};
use serde::Deserialize;

pub const SUPPORTED_OBJECTIVE: &str = "binary:logistic";
const MAX_TREE_DEPTH: usize = 64;

fn default_objective() -> String {
    SUPPORTED_OBJECTIVE.to_string()
}

fn default_base_score() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default = "default_objective")]
    objective: String,
    #[serde(default = "default_base_score")]
    base_score: f64,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    trees: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    nodeid: usize,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    split_condition: Option<f64>,
    #[serde(default)]
    yes: Option<usize>,
    #[serde(default)]
    no: Option<usize>,
    #[serde(default)]
    missing: Option<usize>,
    #[serde(default)]
    leaf: Option<f64>,
    #[serde(default)]
    cover: Option<f64>,
    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Training-sample weight that reached this node. Only needed for attribution.
    pub cover: Option<f64>,
}

impl Node {
    /// Child taken by a row whose split feature equals `value`.
    pub fn next(&self, value: f64) -> Option<usize> {
        match self.kind {
            NodeKind::Leaf { .. } => None,
            NodeKind::Split {
                threshold,
                yes,
                no,
                missing,
                ..
            } => Some(if !value.is_finite() {
                missing
            } else if value < threshold {
                yes
            } else {
                no
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            match node.kind {
                NodeKind::Leaf { value } => return value,
                NodeKind::Split { feature, .. } => {
                    // compile() guarantees split nodes always have a next child
                    index = node.next(x[feature]).unwrap_or(index);
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(tree: &Tree, index: usize) -> usize {
            match tree.nodes[index].kind {
                NodeKind::Leaf { .. } => 0,
                NodeKind::Split { yes, no, .. } => 1 + walk(tree, yes).max(walk(tree, no)),
            }
        }
        walk(self, 0)
    }
}

#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    base_margin: f64,
    model_version: String,
}

impl TreeEnsemble {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawArtifact = serde_json::from_slice(bytes)
            .map_err(|e| RiskError::model_unavailable(format!("artifact is not valid: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArtifact) -> Result<Self> {
        if raw.objective != SUPPORTED_OBJECTIVE {
            return Err(RiskError::model_unavailable(format!(
                "unsupported objective '{}', expected '{}'",
                raw.objective, SUPPORTED_OBJECTIVE
            )));
        }

        if !(raw.base_score > 0.0 && raw.base_score < 1.0) {
            return Err(RiskError::model_unavailable(format!(
                "base_score must lie strictly between 0 and 1, got {}",
                raw.base_score
            )));
        }

        if let Some(names) = &raw.feature_names {
            let expected: Vec<&str> = Feature::ALL.iter().map(|f| f.key()).collect();
            if names.iter().map(String::as_str).ne(expected.iter().copied()) {
                return Err(RiskError::model_unavailable(format!(
                    "feature_names {:?} do not match the expected order {:?}",
                    names, expected
                )));
            }
        }

        if raw.trees.is_empty() {
            return Err(RiskError::model_unavailable("artifact contains no trees"));
        }

        let trees = raw
            .trees
            .iter()
            .enumerate()
            .map(|(i, root)| {
                let mut nodes = Vec::new();
                compile(root, 0, &mut nodes)
                    .map_err(|reason| RiskError::model_unavailable(format!("tree {}: {}", i, reason)))?;
                Ok(Tree { nodes })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trees,
            base_margin: (raw.base_score / (1.0 - raw.base_score)).ln(),
            model_version: raw
                .model_version
                .unwrap_or_else(|| "unversioned".to_string()),
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }

    /// Raw log-odds output for one row.
    pub fn margin(&self, x: &FeatureVector) -> f64 {
        let values = x.as_slice();
        self.base_margin + self.trees.iter().map(|t| t.predict(values)).sum::<f64>()
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn resolve_feature(split: &str) -> std::result::Result<usize, String> {
    let index = match split.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        Some(index) => index,
        None => Feature::ALL
            .iter()
            .position(|f| f.key() == split)
            .ok_or_else(|| format!("unknown split feature '{}'", split))?,
    };
    if index >= FEATURE_COUNT {
        return Err(format!(
            "split feature index {} out of range (model has {} features)",
            index, FEATURE_COUNT
        ));
    }
    Ok(index)
}

/// Flattens `raw` into `nodes` and returns its arena index.
fn compile(raw: &RawNode, depth: usize, nodes: &mut Vec<Node>) -> std::result::Result<usize, String> {
    if depth > MAX_TREE_DEPTH {
        return Err(format!("tree deeper than {} levels", MAX_TREE_DEPTH));
    }
    if let Some(cover) = raw.cover {
        if !cover.is_finite() || cover < 0.0 {
            return Err(format!("node {} has invalid cover {}", raw.nodeid, cover));
        }
    }

    let index = nodes.len();
    if let Some(value) = raw.leaf {
        if !value.is_finite() {
            return Err(format!("leaf {} has non-finite value", raw.nodeid));
        }
        if !raw.children.is_empty() {
            return Err(format!("leaf {} has children", raw.nodeid));
        }
        nodes.push(Node {
            kind: NodeKind::Leaf { value },
            cover: raw.cover,
        });
        return Ok(index);
    }

    let split = raw
        .split
        .as_deref()
        .ok_or_else(|| format!("node {} is neither a leaf nor a split", raw.nodeid))?;
    let feature = resolve_feature(split)?;
    let threshold = raw
        .split_condition
        .filter(|t| t.is_finite())
        .ok_or_else(|| format!("node {} has no finite split_condition", raw.nodeid))?;
    let (yes_id, no_id) = match (raw.yes, raw.no) {
        (Some(yes), Some(no)) if yes != no => (yes, no),
        _ => return Err(format!("node {} needs distinct yes/no children", raw.nodeid)),
    };
    let missing_id = raw.missing.unwrap_or(yes_id);
    if missing_id != yes_id && missing_id != no_id {
        return Err(format!(
            "node {} routes missing values to unknown node {}",
            raw.nodeid, missing_id
        ));
    }
    if raw.children.len() != 2 {
        return Err(format!(
            "node {} has {} children, expected 2",
            raw.nodeid,
            raw.children.len()
        ));
    }
    let find = |id: usize| {
        raw.children
            .iter()
            .find(|c| c.nodeid == id)
            .ok_or_else(|| format!("node {} references missing child {}", raw.nodeid, id))
    };
    let yes_raw = find(yes_id)?;
    let no_raw = find(no_id)?;

    // placeholder until the children have indices
    nodes.push(Node {
        kind: NodeKind::Leaf { value: 0.0 },
        cover: raw.cover,
    });
    let yes = compile(yes_raw, depth + 1, nodes)?;
    let no = compile(no_raw, depth + 1, nodes)?;
    let missing = if missing_id == yes_id { yes } else { no };

    nodes[index].kind = NodeKind::Split {
        feature,
        threshold,
        yes,
        no,
        missing,
    };
    Ok(index)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FIXTURE: &str = include_str!("../../tests/fixtures/cardio_model.json");

    fn vector(values: [f64; FEATURE_COUNT]) -> FeatureVector {
        FeatureVector(values)
    }

    #[test]
    fn test_parse_fixture_model() {
        let model = TreeEnsemble::from_json_slice(FIXTURE.as_bytes()).unwrap();
        assert_eq!(model.trees().len(), 5);
        assert_eq!(model.model_version(), "xgb_v1.0.0");
        assert_eq!(model.base_margin(), 0.0);
        assert_eq!(model.max_depth(), 2);
    }

    #[test]
    fn test_margin_follows_xgboost_split_rule() {
        let model = TreeEnsemble::from_json_slice(FIXTURE.as_bytes()).unwrap();
        // 0.4 - 0.3 - 0.25 + 0.05 - 0.05
        let x = vector([45.0, 2.0, 28.5, 110.0, 2.0, 1.0, 0.0, 0.0, 1.0]);
        assert!((model.margin(&x) - (-0.15)).abs() < 1e-12);

        // map == 105 is not < 105, so it takes the "no" branch
        let at_threshold = vector([45.0, 2.0, 28.5, 105.0, 2.0, 1.0, 0.0, 0.0, 1.0]);
        assert!((model.margin(&at_threshold) - (-0.15)).abs() < 1e-12);
    }

    #[test]
    fn test_split_by_feature_name_and_missing_branch() {
        let json = r#"{
            "trees": [{"nodeid": 0, "split": "bmi", "split_condition": 30.0,
                       "yes": 1, "no": 2, "missing": 2,
                       "children": [{"nodeid": 1, "leaf": -1.0}, {"nodeid": 2, "leaf": 1.0}]}]
        }"#;
        let model = TreeEnsemble::from_json_slice(json.as_bytes()).unwrap();
        let mut x = vector([50.0, 1.0, 25.0, 90.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.margin(&x), -1.0);
        x.0[2] = f64::NAN;
        assert_eq!(model.margin(&x), 1.0);
    }

    #[test]
    fn test_rejects_wrong_feature_order() {
        let json = r#"{
            "feature_names": ["gender", "age_years", "bmi", "map", "cholesterol", "gluc", "smoke", "alco", "active"],
            "trees": [{"nodeid": 0, "leaf": 0.1}]
        }"#;
        let err = TreeEnsemble::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(matches!(err, RiskError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_rejects_dangling_child_and_bad_feature() {
        let dangling = r#"{"trees": [{"nodeid": 0, "split": "f1", "split_condition": 1.5,
            "yes": 1, "no": 7, "children": [{"nodeid": 1, "leaf": 0.0}, {"nodeid": 2, "leaf": 0.0}]}]}"#;
        assert!(TreeEnsemble::from_json_slice(dangling.as_bytes()).is_err());

        let out_of_range = r#"{"trees": [{"nodeid": 0, "split": "f9", "split_condition": 1.5,
            "yes": 1, "no": 2, "children": [{"nodeid": 1, "leaf": 0.0}, {"nodeid": 2, "leaf": 0.0}]}]}"#;
        assert!(TreeEnsemble::from_json_slice(out_of_range.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_garbage_and_empty_models() {
        assert!(TreeEnsemble::from_json_slice(b"\x00\x01not json").is_err());
        assert!(TreeEnsemble::from_json_slice(br#"{"trees": []}"#).is_err());
        assert!(TreeEnsemble::from_json_slice(
            br#"{"objective": "reg:squarederror", "trees": [{"nodeid": 0, "leaf": 0.1}]}"#
        )
        .is_err());
    }

    #[test]
    fn test_sigmoid_stays_in_unit_interval() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(1000.0) <= 1.0);
    }
}
