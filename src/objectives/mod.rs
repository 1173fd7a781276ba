//! Objective functions used to score and compare pipelines
//!
//! An [`Objective`] pairs a scoring function with its optimization
//! direction. Binary objectives may also be *thresholded*: they score hard
//! labels obtained by cutting the positive-class probability, and can search
//! for the cut that serves them best.

mod classification;
mod regression;

pub use classification::{
    Accuracy, AucBinary, BalancedAccuracy, F1, LogLossBinary, LogLossMulticlass, Precision, Recall,
};
pub use regression::{MeanAbsoluteError, MeanSquaredError, RSquared, RootMeanSquaredError};

use crate::error::{KolosalError, Result};
use crate::problem::ProblemType;
use ndarray::{Array1, Array2};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Decision threshold applied to positive-class probabilities by default
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Label of the positive class for binary problems
pub const POSITIVE_CLASS: f64 = 1.0;

/// Predictions handed to an objective
#[derive(Debug, Clone)]
pub enum Predictions {
    /// Hard labels (classification) or values (regression)
    Labels(Array1<f64>),
    /// Class probabilities, one column per entry of `classes` (ascending)
    Probabilities { classes: Vec<f64>, proba: Array2<f64> },
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Labels(labels) => labels.len(),
            Predictions::Probabilities { proba, .. } => proba.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probability of `class` for every row; zeros when the class was never seen
    pub fn class_probability(&self, class: f64) -> Result<Array1<f64>> {
        match self {
            Predictions::Probabilities { classes, proba } => {
                match classes.iter().position(|c| *c == class) {
                    Some(col) => Ok(proba.column(col).to_owned()),
                    None => Ok(Array1::zeros(proba.nrows())),
                }
            }
            Predictions::Labels(_) => Err(KolosalError::Unsupported(
                "probabilities requested from label predictions".to_string(),
            )),
        }
    }
}

/// A scoring function with a direction.
pub trait Objective: Send + Sync + fmt::Debug {
    /// Registry name, e.g. `"log_loss_binary"`
    fn name(&self) -> &str;

    fn greater_is_better(&self) -> bool;

    /// Whether `score` expects [`Predictions::Probabilities`]
    fn needs_proba(&self) -> bool {
        false
    }

    /// Whether this is a binary objective scored on thresholded probabilities
    fn is_thresholded(&self) -> bool {
        false
    }

    fn supports(&self, problem_type: ProblemType) -> bool;

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64>;

    /// Threshold on positive-class scores that optimizes this objective.
    ///
    /// Scans 0.00..=1.00 in steps of 0.01; ties keep the lowest threshold.
    fn optimal_threshold(&self, y_true: &Array1<f64>, y_scores: &Array1<f64>) -> Result<f64> {
        if !self.is_thresholded() {
            return Err(KolosalError::Unsupported(format!(
                "objective '{}' is not thresholded",
                self.name()
            )));
        }
        if y_true.len() != y_scores.len() || y_true.is_empty() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} scores", y_true.len()),
                actual: format!("{}", y_scores.len()),
            });
        }

        let mut best: Option<(f64, f64)> = None;
        for step in 0..=100 {
            let threshold = step as f64 / 100.0;
            let labels = apply_threshold(y_scores, threshold);
            let score = self.score(y_true, &Predictions::Labels(labels))?;
            if !score.is_finite() {
                continue;
            }
            let improves = match best {
                None => true,
                Some((_, best_score)) => self.is_better(score, best_score),
            };
            if improves {
                best = Some((threshold, score));
            }
        }

        best.map(|(t, _)| t).ok_or_else(|| {
            KolosalError::ComputationError(format!(
                "objective '{}' produced no finite score for any threshold",
                self.name()
            ))
        })
    }

    /// Strictly better in this objective's direction
    fn is_better(&self, a: f64, b: f64) -> bool {
        if self.greater_is_better() {
            a > b
        } else {
            a < b
        }
    }

    /// Orders scores best-first
    fn compare(&self, a: f64, b: f64) -> Ordering {
        if self.greater_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }
}

/// Binary labels from positive-class scores: `1.0` where `score >= threshold`
pub fn apply_threshold(scores: &Array1<f64>, threshold: f64) -> Array1<f64> {
    scores.mapv(|s| if s >= threshold { 1.0 } else { 0.0 })
}

/// Every objective name the registry knows
pub fn objective_names() -> &'static [&'static str] {
    &[
        "accuracy",
        "balanced_accuracy",
        "f1",
        "precision",
        "recall",
        "auc",
        "log_loss_binary",
        "log_loss_multiclass",
        "r2",
        "mse",
        "mae",
        "rmse",
    ]
}

/// Look an objective up by name (case-insensitive, `-`/space tolerant)
pub fn objective_by_name(name: &str) -> Result<Arc<dyn Objective>> {
    let key = name.trim().to_lowercase().replace(['-', ' '], "_");
    let objective: Arc<dyn Objective> = match key.as_str() {
        "accuracy" => Arc::new(Accuracy),
        "balanced_accuracy" => Arc::new(BalancedAccuracy),
        "f1" => Arc::new(F1),
        "precision" => Arc::new(Precision),
        "recall" => Arc::new(Recall),
        "auc" => Arc::new(AucBinary),
        "log_loss_binary" => Arc::new(LogLossBinary),
        "log_loss_multiclass" => Arc::new(LogLossMulticlass),
        "r2" => Arc::new(RSquared),
        "mse" => Arc::new(MeanSquaredError),
        "mae" => Arc::new(MeanAbsoluteError),
        "rmse" => Arc::new(RootMeanSquaredError),
        _ => {
            return Err(KolosalError::ConfigError(format!(
                "Unknown objective '{}'",
                name
            )))
        }
    };
    Ok(objective)
}

/// Objective used when the caller does not pick one
pub fn default_objective(problem_type: ProblemType) -> Arc<dyn Objective> {
    if problem_type.is_binary() {
        Arc::new(LogLossBinary)
    } else if problem_type.is_multiclass() {
        Arc::new(LogLossMulticlass)
    } else {
        Arc::new(RSquared)
    }
}

pub(crate) fn check_lengths(y_true: &Array1<f64>, n_pred: usize) -> Result<()> {
    if y_true.len() != n_pred {
        return Err(KolosalError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{}", n_pred),
        });
    }
    if y_true.is_empty() {
        return Err(KolosalError::ValidationError(
            "cannot score an empty target".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn labels<'a>(objective: &str, y_pred: &'a Predictions) -> Result<&'a Array1<f64>> {
    match y_pred {
        Predictions::Labels(labels) => Ok(labels),
        Predictions::Probabilities { .. } => Err(KolosalError::Unsupported(format!(
            "objective '{}' scores labels, got probabilities",
            objective
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_registry_round_trip() {
        for name in objective_names() {
            let objective = objective_by_name(name).unwrap();
            assert_eq!(objective.name(), *name);
        }
        assert_eq!(objective_by_name("Log Loss Binary").unwrap().name(), "log_loss_binary");
        assert!(objective_by_name("fraud_cost").is_err());
    }

    #[test]
    fn test_defaults_support_their_problem() {
        for problem in ProblemType::ALL {
            assert!(default_objective(problem).supports(problem), "{}", problem);
        }
    }

    #[test]
    fn test_compare_direction() {
        let r2 = RSquared;
        assert_eq!(r2.compare(0.9, 0.5), Ordering::Less);
        let mse = MeanSquaredError;
        assert_eq!(mse.compare(0.9, 0.5), Ordering::Greater);
        assert!(mse.is_better(0.1, 0.2));
    }

    #[test]
    fn test_optimal_threshold_f1() {
        // Positives all score >= 0.3, negatives all score < 0.3
        let y_true = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let scores = array![0.05, 0.1, 0.2, 0.3, 0.35, 0.4];
        let threshold = F1.optimal_threshold(&y_true, &scores).unwrap();
        assert!(threshold > 0.2 && threshold <= 0.3, "threshold = {}", threshold);
    }

    #[test]
    fn test_optimal_threshold_requires_thresholded() {
        let y = array![0.0, 1.0];
        assert!(LogLossBinary.optimal_threshold(&y, &y).is_err());
    }
}
