//! Classification objectives

use super::{check_lengths, labels, Objective, Predictions};
use crate::error::{KolosalError, Result};
use crate::problem::ProblemType;
use ndarray::Array1;
use std::collections::BTreeMap;

const EPS: f64 = 1e-15;

fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut tn = 0;
    let mut fn_ = 0;

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    (tp, fp, tn, fn_)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Fraction of exactly matching labels
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Objective for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_classification()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
        Ok(ratio(correct, y_true.len()))
    }
}

/// Mean per-class recall
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedAccuracy;

impl Objective for BalancedAccuracy {
    fn name(&self) -> &str {
        "balanced_accuracy"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_classification()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;

        // class label bits -> (hits, support)
        let mut per_class: BTreeMap<u64, (usize, usize)> = BTreeMap::new();
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let entry = per_class.entry(t.to_bits()).or_insert((0, 0));
            entry.1 += 1;
            if t == p {
                entry.0 += 1;
            }
        }

        let recalls: Vec<f64> = per_class.values().map(|(hits, n)| ratio(*hits, *n)).collect();
        Ok(recalls.iter().sum::<f64>() / recalls.len() as f64)
    }
}

/// Binary F1 score on the positive class
#[derive(Debug, Clone, Copy, Default)]
pub struct F1;

impl Objective for F1 {
    fn name(&self) -> &str {
        "f1"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn is_thresholded(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_binary()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        let (tp, fp, _, fn_) = confusion_counts(y_true, y_pred);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        if precision + recall > 0.0 {
            Ok(2.0 * precision * recall / (precision + recall))
        } else {
            Ok(0.0)
        }
    }
}

/// Binary precision on the positive class
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision;

impl Objective for Precision {
    fn name(&self) -> &str {
        "precision"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn is_thresholded(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_binary()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        let (tp, fp, _, _) = confusion_counts(y_true, y_pred);
        Ok(ratio(tp, tp + fp))
    }
}

/// Binary recall on the positive class
#[derive(Debug, Clone, Copy, Default)]
pub struct Recall;

impl Objective for Recall {
    fn name(&self) -> &str {
        "recall"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn is_thresholded(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_binary()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        let (tp, _, _, fn_) = confusion_counts(y_true, y_pred);
        Ok(ratio(tp, tp + fn_))
    }
}

/// Area under the ROC curve, computed from ranks (Mann-Whitney U)
#[derive(Debug, Clone, Copy, Default)]
pub struct AucBinary;

impl Objective for AucBinary {
    fn name(&self) -> &str {
        "auc"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn needs_proba(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_binary()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let scores = y_pred.class_probability(1.0)?;
        check_lengths(y_true, scores.len())?;

        let n_pos = y_true.iter().filter(|t| **t > 0.5).count();
        let n_neg = y_true.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(KolosalError::ComputationError(
                "AUC is undefined when only one class is present".to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        // Average ranks over tied scores
        let mut ranks = vec![0.0; scores.len()];
        let mut i = 0;
        while i < order.len() {
            let mut j = i;
            while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
                j += 1;
            }
            let rank = (i + j) as f64 / 2.0 + 1.0;
            for k in i..=j {
                ranks[order[k]] = rank;
            }
            i = j + 1;
        }

        let pos_rank_sum: f64 = y_true
            .iter()
            .zip(ranks.iter())
            .filter(|(t, _)| **t > 0.5)
            .map(|(_, r)| r)
            .sum();
        let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
        Ok(u / (n_pos * n_neg) as f64)
    }
}

/// Binary cross-entropy of the positive-class probability
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLossBinary;

impl Objective for LogLossBinary {
    fn name(&self) -> &str {
        "log_loss_binary"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn needs_proba(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_binary()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let p = y_pred.class_probability(1.0)?;
        check_lengths(y_true, p.len())?;
        let total: f64 = y_true
            .iter()
            .zip(p.iter())
            .map(|(t, p)| {
                let p = p.clamp(EPS, 1.0 - EPS);
                if *t > 0.5 {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();
        Ok(total / y_true.len() as f64)
    }
}

/// Multiclass cross-entropy
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLossMulticlass;

impl Objective for LogLossMulticlass {
    fn name(&self) -> &str {
        "log_loss_multiclass"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn needs_proba(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_multiclass()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let (classes, proba) = match y_pred {
            Predictions::Probabilities { classes, proba } => (classes, proba),
            Predictions::Labels(_) => {
                return Err(KolosalError::Unsupported(
                    "log_loss_multiclass needs probabilities".to_string(),
                ))
            }
        };
        check_lengths(y_true, proba.nrows())?;

        let total: f64 = y_true
            .iter()
            .enumerate()
            .map(|(row, t)| {
                let p = classes
                    .iter()
                    .position(|c| c == t)
                    .map(|col| proba[[row, col]])
                    .unwrap_or(0.0);
                -p.clamp(EPS, 1.0).ln()
            })
            .sum();
        Ok(total / y_true.len() as f64)
    }
}
