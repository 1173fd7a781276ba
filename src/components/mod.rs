//! Reference pipeline components
//!
//! Components come in two roles: transformers that rewrite the feature matrix
//! and estimators that produce predictions. A pipeline is described by
//! [`ComponentKind`] + hyperparameters and only materializes the components
//! when it is fitted, so a description can be cloned and shipped to workers
//! without carrying fitted state.
//!
//! The estimators here are deliberately small. They exist to give the search
//! something real to rank, not to compete with a full model zoo.

mod baseline;
mod knn;
mod linear;
mod naive_bayes;
mod transformers;
mod tree;

pub use baseline::{BaselineClassifier, BaselineRegressor, TimeSeriesBaseline};
pub use knn::KNearestNeighbors;
pub use linear::{LinearRegression, LogisticRegression};
pub use naive_bayes::GaussianNaiveBayes;
pub use transformers::{SimpleImputer, StandardScaler};
pub use tree::DecisionTree;

use crate::error::{KolosalError, Result};
use crate::pipeline::{hyperparameters, HyperparameterRange, Hyperparameters, ParamValue};
use crate::problem::ProblemType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Fits on a feature matrix and rewrites it
pub trait Transformer: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }
}

/// Final pipeline step that produces predictions
pub trait Estimator: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities, one column per entry of [`Estimator::classes`]
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(KolosalError::Unsupported(
            "predict_proba is only available for classifiers".to_string(),
        ))
    }

    /// Sorted class labels seen during fit; empty for regressors
    fn classes(&self) -> &[f64] {
        &[]
    }
}

/// A built component, ready to fit
#[derive(Debug)]
pub enum BuiltComponent {
    Transformer(Box<dyn Transformer>),
    Estimator(Box<dyn Estimator>),
}

/// Role of a component inside a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRole {
    Transformer,
    Estimator,
}

/// Estimator families the search knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Baseline,
    LinearModel,
    NaiveBayes,
    KNearestNeighbors,
    DecisionTree,
}

impl ModelFamily {
    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::Baseline => "baseline",
            ModelFamily::LinearModel => "linear_model",
            ModelFamily::NaiveBayes => "naive_bayes",
            ModelFamily::KNearestNeighbors => "k_nearest_neighbors",
            ModelFamily::DecisionTree => "decision_tree",
        }
    }

    pub fn supports(self, problem_type: ProblemType) -> bool {
        match self {
            ModelFamily::NaiveBayes => problem_type.is_classification(),
            _ => true,
        }
    }

    /// The estimator that represents this family for a problem type
    pub fn estimator(self, problem_type: ProblemType) -> Result<ComponentKind> {
        if !self.supports(problem_type) {
            return Err(KolosalError::Setup(format!(
                "Unrecognized model family '{}' for problem type {}",
                self.name(),
                problem_type
            )));
        }
        let kind = match self {
            ModelFamily::Baseline if problem_type.is_time_series() => ComponentKind::TimeSeriesBaseline,
            ModelFamily::Baseline if problem_type.is_classification() => ComponentKind::BaselineClassifier,
            ModelFamily::Baseline => ComponentKind::BaselineRegressor,
            ModelFamily::LinearModel if problem_type.is_classification() => {
                ComponentKind::LogisticRegression
            }
            ModelFamily::LinearModel => ComponentKind::LinearRegression,
            ModelFamily::NaiveBayes => ComponentKind::GaussianNaiveBayes,
            ModelFamily::KNearestNeighbors => ComponentKind::KNearestNeighbors,
            ModelFamily::DecisionTree => ComponentKind::DecisionTree,
        };
        Ok(kind)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "baseline" => Ok(ModelFamily::Baseline),
            "linear_model" | "linear" => Ok(ModelFamily::LinearModel),
            "naive_bayes" => Ok(ModelFamily::NaiveBayes),
            "k_nearest_neighbors" | "knn" => Ok(ModelFamily::KNearestNeighbors),
            "decision_tree" | "tree" => Ok(ModelFamily::DecisionTree),
            other => Err(KolosalError::ConfigError(format!("Unknown model family '{}'", other))),
        }
    }
}

/// Non-baseline model families valid for a problem type
pub fn list_model_families(problem_type: ProblemType) -> Vec<ModelFamily> {
    [
        ModelFamily::LinearModel,
        ModelFamily::NaiveBayes,
        ModelFamily::KNearestNeighbors,
        ModelFamily::DecisionTree,
    ]
    .into_iter()
    .filter(|family| family.supports(problem_type))
    .collect()
}

/// Every component the reference pipelines are assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    SimpleImputer,
    StandardScaler,
    BaselineClassifier,
    BaselineRegressor,
    TimeSeriesBaseline,
    LogisticRegression,
    LinearRegression,
    GaussianNaiveBayes,
    KNearestNeighbors,
    DecisionTree,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::SimpleImputer,
        ComponentKind::StandardScaler,
        ComponentKind::BaselineClassifier,
        ComponentKind::BaselineRegressor,
        ComponentKind::TimeSeriesBaseline,
        ComponentKind::LogisticRegression,
        ComponentKind::LinearRegression,
        ComponentKind::GaussianNaiveBayes,
        ComponentKind::KNearestNeighbors,
        ComponentKind::DecisionTree,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::SimpleImputer => "Simple Imputer",
            ComponentKind::StandardScaler => "Standard Scaler",
            ComponentKind::BaselineClassifier => "Baseline Classifier",
            ComponentKind::BaselineRegressor => "Baseline Regressor",
            ComponentKind::TimeSeriesBaseline => "Time Series Baseline Estimator",
            ComponentKind::LogisticRegression => "Logistic Regression Classifier",
            ComponentKind::LinearRegression => "Linear Regressor",
            ComponentKind::GaussianNaiveBayes => "Gaussian Naive Bayes Classifier",
            ComponentKind::KNearestNeighbors => "K Nearest Neighbors",
            ComponentKind::DecisionTree => "Decision Tree",
        }
    }

    pub fn role(self) -> ComponentRole {
        match self {
            ComponentKind::SimpleImputer | ComponentKind::StandardScaler => ComponentRole::Transformer,
            _ => ComponentRole::Estimator,
        }
    }

    pub fn model_family(self) -> Option<ModelFamily> {
        match self {
            ComponentKind::SimpleImputer | ComponentKind::StandardScaler => None,
            ComponentKind::BaselineClassifier
            | ComponentKind::BaselineRegressor
            | ComponentKind::TimeSeriesBaseline => Some(ModelFamily::Baseline),
            ComponentKind::LogisticRegression | ComponentKind::LinearRegression => {
                Some(ModelFamily::LinearModel)
            }
            ComponentKind::GaussianNaiveBayes => Some(ModelFamily::NaiveBayes),
            ComponentKind::KNearestNeighbors => Some(ModelFamily::KNearestNeighbors),
            ComponentKind::DecisionTree => Some(ModelFamily::DecisionTree),
        }
    }

    /// Whether this component works on the given problem type
    pub fn supports(self, problem_type: ProblemType) -> bool {
        match self {
            ComponentKind::BaselineClassifier
            | ComponentKind::LogisticRegression
            | ComponentKind::GaussianNaiveBayes => problem_type.is_classification(),
            ComponentKind::BaselineRegressor | ComponentKind::LinearRegression => {
                problem_type.is_regression()
            }
            _ => true,
        }
    }

    /// Distance- and gradient-based estimators want standardized inputs
    pub fn needs_scaling(self) -> bool {
        matches!(
            self,
            ComponentKind::LogisticRegression
                | ComponentKind::LinearRegression
                | ComponentKind::KNearestNeighbors
        )
    }

    pub fn default_parameters(self) -> Hyperparameters {
        match self {
            ComponentKind::SimpleImputer => hyperparameters([("impute_strategy", "mean")]),
            ComponentKind::StandardScaler => Hyperparameters::new(),
            ComponentKind::BaselineClassifier => hyperparameters([("strategy", "mode")]),
            ComponentKind::BaselineRegressor => hyperparameters([("strategy", "mean")]),
            ComponentKind::TimeSeriesBaseline => Hyperparameters::new(),
            ComponentKind::LogisticRegression => hyperparameters([
                ("alpha", ParamValue::Float(0.01)),
                ("learning_rate", ParamValue::Float(0.1)),
                ("max_iter", ParamValue::Int(300)),
            ]),
            ComponentKind::LinearRegression => hyperparameters([("alpha", ParamValue::Float(0.0))]),
            ComponentKind::GaussianNaiveBayes => {
                hyperparameters([("var_smoothing", ParamValue::Float(1e-9))])
            }
            ComponentKind::KNearestNeighbors => hyperparameters([
                ("n_neighbors", ParamValue::Int(5)),
                ("weights", ParamValue::from("uniform")),
            ]),
            ComponentKind::DecisionTree => hyperparameters([
                ("max_depth", ParamValue::Int(6)),
                ("min_samples_split", ParamValue::Int(2)),
            ]),
        }
    }

    /// Ranges the tuner may explore; components without any are left untouched
    pub fn hyperparameter_ranges(self) -> BTreeMap<String, HyperparameterRange> {
        let ranges: Vec<(&str, HyperparameterRange)> = match self {
            ComponentKind::SimpleImputer => vec![(
                "impute_strategy",
                HyperparameterRange::categorical(["mean", "median", "most_frequent"]),
            )],
            ComponentKind::LogisticRegression => vec![
                ("alpha", HyperparameterRange::log_float(1e-4, 10.0)),
                ("learning_rate", HyperparameterRange::log_float(1e-3, 1.0)),
                ("max_iter", HyperparameterRange::int(100, 1000)),
            ],
            ComponentKind::LinearRegression => {
                vec![("alpha", HyperparameterRange::log_float(1e-4, 100.0))]
            }
            ComponentKind::GaussianNaiveBayes => {
                vec![("var_smoothing", HyperparameterRange::log_float(1e-12, 1e-3))]
            }
            ComponentKind::KNearestNeighbors => vec![
                ("n_neighbors", HyperparameterRange::int(1, 30)),
                ("weights", HyperparameterRange::categorical(["uniform", "distance"])),
            ],
            ComponentKind::DecisionTree => vec![
                ("max_depth", HyperparameterRange::int(1, 12)),
                ("min_samples_split", HyperparameterRange::int(2, 20)),
            ],
            _ => Vec::new(),
        };
        ranges
            .into_iter()
            .map(|(name, range)| (name.to_string(), range))
            .collect()
    }

    /// Materialize the component, validating its hyperparameters
    pub fn build(self, params: &Hyperparameters, problem_type: ProblemType) -> Result<BuiltComponent> {
        if !self.supports(problem_type) {
            return Err(KolosalError::Setup(format!(
                "{} does not support {}",
                self.name(),
                problem_type
            )));
        }
        let classification = problem_type.is_classification();
        let built = match self {
            ComponentKind::SimpleImputer => {
                BuiltComponent::Transformer(Box::new(SimpleImputer::from_params(params)?))
            }
            ComponentKind::StandardScaler => BuiltComponent::Transformer(Box::new(StandardScaler::new())),
            ComponentKind::BaselineClassifier => {
                BuiltComponent::Estimator(Box::new(BaselineClassifier::from_params(params)?))
            }
            ComponentKind::BaselineRegressor => {
                BuiltComponent::Estimator(Box::new(BaselineRegressor::from_params(params)?))
            }
            ComponentKind::TimeSeriesBaseline => {
                BuiltComponent::Estimator(Box::new(TimeSeriesBaseline::new(classification)))
            }
            ComponentKind::LogisticRegression => {
                BuiltComponent::Estimator(Box::new(LogisticRegression::from_params(params)?))
            }
            ComponentKind::LinearRegression => {
                BuiltComponent::Estimator(Box::new(LinearRegression::from_params(params)?))
            }
            ComponentKind::GaussianNaiveBayes => {
                BuiltComponent::Estimator(Box::new(GaussianNaiveBayes::from_params(params)?))
            }
            ComponentKind::KNearestNeighbors => BuiltComponent::Estimator(Box::new(
                KNearestNeighbors::from_params(params, classification)?,
            )),
            ComponentKind::DecisionTree => BuiltComponent::Estimator(Box::new(
                DecisionTree::from_params(params, classification)?,
            )),
        };
        Ok(built)
    }
}

/// Sorted distinct labels and, per row, the index of its label
pub(crate) fn encode_classes(y: &Array1<f64>) -> Result<(Vec<f64>, Vec<usize>)> {
    if y.iter().any(|v| !v.is_finite()) {
        return Err(KolosalError::DataError("target contains non-finite labels".to_string()));
    }
    let classes = crate::data::unique_sorted(y.iter().copied());
    let codes = y
        .iter()
        .map(|v| classes.iter().position(|c| c == v).unwrap_or(0))
        .collect();
    Ok((classes, codes))
}

/// Label of the most probable column for each row
pub(crate) fn argmax_labels(proba: &Array2<f64>, classes: &[f64]) -> Array1<f64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (i, p) in row.iter().enumerate() {
                if *p > row[best] {
                    best = i;
                }
            }
            classes.get(best).copied().unwrap_or(f64::NAN)
        })
        .collect()
}

pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(KolosalError::ShapeError {
            expected: format!("{} target values", x.nrows()),
            actual: format!("{}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(KolosalError::DataError("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(KolosalError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{}", x.ncols()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_model_families() {
        assert_eq!(
            list_model_families(ProblemType::Binary),
            vec![
                ModelFamily::LinearModel,
                ModelFamily::NaiveBayes,
                ModelFamily::KNearestNeighbors,
                ModelFamily::DecisionTree
            ]
        );
        assert!(!list_model_families(ProblemType::Regression).contains(&ModelFamily::NaiveBayes));
    }

    #[test]
    fn test_family_estimators() {
        assert_eq!(
            ModelFamily::LinearModel.estimator(ProblemType::Multiclass).unwrap(),
            ComponentKind::LogisticRegression
        );
        assert_eq!(
            ModelFamily::Baseline.estimator(ProblemType::TimeSeriesRegression).unwrap(),
            ComponentKind::TimeSeriesBaseline
        );
        assert!(ModelFamily::NaiveBayes.estimator(ProblemType::Regression).is_err());
    }

    #[test]
    fn test_defaults_are_in_range_and_build() {
        for kind in [
            ComponentKind::SimpleImputer,
            ComponentKind::LogisticRegression,
            ComponentKind::GaussianNaiveBayes,
            ComponentKind::KNearestNeighbors,
            ComponentKind::DecisionTree,
        ] {
            let defaults = kind.default_parameters();
            for (name, range) in kind.hyperparameter_ranges() {
                assert!(range.contains(&defaults[&name]), "{} {}", kind.name(), name);
            }
            assert!(kind.build(&defaults, ProblemType::Binary).is_ok());
        }
    }

    #[test]
    fn test_build_rejects_bad_params() {
        let params = hyperparameters([("n_neighbors", ParamValue::Int(0))]);
        assert!(ComponentKind::KNearestNeighbors
            .build(&params, ProblemType::Binary)
            .is_err());
        assert!(ComponentKind::LinearRegression
            .build(&Hyperparameters::new(), ProblemType::Binary)
            .is_err());
    }

    #[test]
    fn test_parse_family() {
        assert_eq!("knn".parse::<ModelFamily>().unwrap(), ModelFamily::KNearestNeighbors);
        assert_eq!("Linear Model".parse::<ModelFamily>().unwrap(), ModelFamily::LinearModel);
        assert!("xgboost".parse::<ModelFamily>().is_err());
    }
}
