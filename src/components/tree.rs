//! CART decision tree (gini for classification, variance for regression)

use super::{argmax_labels, check_fit_input, check_n_features, encode_classes, Estimator};
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_usize, Hyperparameters};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    /// Class distribution (classification) or a single mean (regression)
    Leaf { value: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A split candidate: feature, threshold and impurity decrease
type SplitChoice = (usize, f64, f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub max_depth: usize,
    pub min_samples_split: usize,
    classification: bool,
    classes: Vec<f64>,
    n_features: usize,
    root: Option<TreeNode>,
}

impl DecisionTree {
    pub fn new(max_depth: usize, min_samples_split: usize, classification: bool) -> Self {
        Self {
            max_depth,
            min_samples_split,
            classification,
            classes: Vec::new(),
            n_features: 0,
            root: None,
        }
    }

    pub fn from_params(params: &Hyperparameters, classification: bool) -> Result<Self> {
        let max_depth = param_usize(params, "max_depth", 6)?;
        let min_samples_split = param_usize(params, "min_samples_split", 2)?;
        if max_depth == 0 {
            return Err(KolosalError::invalid_param("max_depth", max_depth, "must be at least 1"));
        }
        if min_samples_split < 2 {
            return Err(KolosalError::invalid_param(
                "min_samples_split",
                min_samples_split,
                "must be at least 2",
            ));
        }
        Ok(Self::new(max_depth, min_samples_split, classification))
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        self.root.as_ref().map(depth_of).unwrap_or(0)
    }

    /// Gini impurity over class codes, or variance over values
    fn impurity(&self, targets: &[f64]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let n = targets.len() as f64;
        if self.classification {
            let mut counts = vec![0usize; self.classes.len()];
            for t in targets {
                counts[*t as usize] += 1;
            }
            1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
        } else {
            let mean = targets.iter().sum::<f64>() / n;
            targets.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n
        }
    }

    fn leaf(&self, targets: &[f64]) -> TreeNode {
        let n = targets.len().max(1) as f64;
        let value = if self.classification {
            let mut dist = vec![0.0; self.classes.len()];
            for t in targets {
                dist[*t as usize] += 1.0 / n;
            }
            dist
        } else {
            vec![targets.iter().sum::<f64>() / n]
        };
        TreeNode::Leaf { value }
    }

    fn best_split(&self, x: &Array2<f64>, targets: &[f64], rows: &[usize]) -> Option<SplitChoice> {
        let parent = self.impurity(targets);
        let n = rows.len() as f64;

        let per_feature: Vec<Option<SplitChoice>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature| {
                let mut order: Vec<usize> = (0..rows.len()).collect();
                order.sort_by(|&a, &b| x[[rows[a], feature]].total_cmp(&x[[rows[b], feature]]));

                let mut best: Option<SplitChoice> = None;
                for cut in 1..order.len() {
                    let lo = x[[rows[order[cut - 1]], feature]];
                    let hi = x[[rows[order[cut]], feature]];
                    if lo == hi {
                        continue;
                    }
                    let left: Vec<f64> = order[..cut].iter().map(|&i| targets[i]).collect();
                    let right: Vec<f64> = order[cut..].iter().map(|&i| targets[i]).collect();
                    let weighted = (left.len() as f64 * self.impurity(&left)
                        + right.len() as f64 * self.impurity(&right))
                        / n;
                    let gain = parent - weighted;
                    if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                        best = Some((feature, (lo + hi) / 2.0, gain));
                    }
                }
                best
            })
            .collect();

        // Lowest feature index wins ties
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitChoice>, cand| match best {
                Some(b) if b.2 >= cand.2 => Some(b),
                _ => Some(cand),
            })
    }

    fn build(&self, x: &Array2<f64>, targets: &[f64], rows: &[usize], depth: usize) -> TreeNode {
        let pure = targets.windows(2).all(|w| w[0] == w[1]);
        if depth >= self.max_depth || rows.len() < self.min_samples_split || pure {
            return self.leaf(targets);
        }

        let Some((feature, threshold, _)) = self.best_split(x, targets, rows) else {
            return self.leaf(targets);
        };

        let (mut left_rows, mut right_rows) = (Vec::new(), Vec::new());
        let (mut left_targets, mut right_targets) = (Vec::new(), Vec::new());
        for (&row, &t) in rows.iter().zip(targets.iter()) {
            if x[[row, feature]] <= threshold {
                left_rows.push(row);
                left_targets.push(t);
            } else {
                right_rows.push(row);
                right_targets.push(t);
            }
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build(x, &left_targets, &left_rows, depth + 1)),
            right: Box::new(self.build(x, &right_targets, &right_rows, depth + 1)),
        }
    }

    fn leaf_values(&self, x: &Array2<f64>) -> Result<Vec<&[f64]>> {
        let root = self.root.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value } => return value.as_slice(),
                        TreeNode::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        } => {
                            // NaN goes right
                            node = if row[*feature] <= *threshold { &**left } else { &**right };
                        }
                    }
                }
            })
            .collect())
    }
}

impl Estimator for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let targets: Vec<f64> = if self.classification {
            let (classes, codes) = encode_classes(y)?;
            self.classes = classes;
            codes.into_iter().map(|c| c as f64).collect()
        } else {
            y.to_vec()
        };
        self.n_features = x.ncols();

        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, &targets, &rows, 0));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classification {
            let proba = self.predict_proba(x)?;
            return Ok(argmax_labels(&proba, &self.classes));
        }
        Ok(self.leaf_values(x)?.into_iter().map(|v| v[0]).collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.classification {
            return Err(KolosalError::Unsupported(
                "predict_proba on a regression tree".to_string(),
            ));
        }
        let leaves = self.leaf_values(x)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (i, dist) in leaves.into_iter().enumerate() {
            for (c, p) in dist.iter().enumerate() {
                proba[[i, c]] = *p;
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}
