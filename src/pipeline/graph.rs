//! Linear component graph: transformers followed by one estimator

use super::{Hyperparameters, ParamValue, Pipeline, PipelineSignature};
use crate::components::{BuiltComponent, ComponentKind, ComponentRole, Estimator, ModelFamily, Transformer};
use crate::error::{KolosalError, Result};
use crate::problem::ProblemType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// One step of a [`ComponentGraph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub kind: ComponentKind,
    pub params: Hyperparameters,
}

impl ComponentSpec {
    pub fn new(kind: ComponentKind, params: Hyperparameters) -> Self {
        Self { kind, params }
    }

    pub fn with_defaults(kind: ComponentKind) -> Self {
        Self::new(kind, kind.default_parameters())
    }

    fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, signature_value(v)))
            .collect();
        format!("{}({})", self.kind.name(), params.join(", "))
    }
}

/// Floats get a fixed scientific precision so equal values print identically
fn signature_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Float(v) => format!("{:.6e}", v),
        other => other.to_string(),
    }
}

#[derive(Debug)]
struct FittedGraph {
    transformers: Vec<Box<dyn Transformer>>,
    estimator: Box<dyn Estimator>,
}

/// Reference [`Pipeline`]: an ordered list of components ending in an estimator
#[derive(Debug)]
pub struct ComponentGraph {
    problem_type: ProblemType,
    components: Vec<ComponentSpec>,
    fitted: Option<FittedGraph>,
}

impl ComponentGraph {
    /// Every component but the last must be a transformer; the last must be an estimator
    pub fn new(problem_type: ProblemType, components: Vec<ComponentSpec>) -> Result<Self> {
        let Some((last, transformers)) = components.split_last() else {
            return Err(KolosalError::Setup("a pipeline needs at least one component".to_string()));
        };
        if last.kind.role() != ComponentRole::Estimator {
            return Err(KolosalError::Setup(format!(
                "the last component must be an estimator, got {}",
                last.kind.name()
            )));
        }
        if let Some(spec) = transformers
            .iter()
            .find(|spec| spec.kind.role() != ComponentRole::Transformer)
        {
            return Err(KolosalError::Setup(format!(
                "{} can only be the last component",
                spec.kind.name()
            )));
        }
        if let Some(spec) = components.iter().find(|spec| !spec.kind.supports(problem_type)) {
            return Err(KolosalError::Setup(format!(
                "{} does not support {}",
                spec.kind.name(),
                problem_type
            )));
        }

        Ok(Self {
            problem_type,
            components,
            fitted: None,
        })
    }

    /// Baseline pipeline for a problem type: the baseline estimator alone
    pub fn baseline(problem_type: ProblemType) -> Result<Self> {
        let estimator = ModelFamily::Baseline.estimator(problem_type)?;
        Self::new(problem_type, vec![ComponentSpec::with_defaults(estimator)])
    }

    /// `Imputer -> [Scaler] -> Estimator` with default hyperparameters
    pub fn for_family(family: ModelFamily, problem_type: ProblemType) -> Result<Self> {
        let estimator = family.estimator(problem_type)?;
        let mut components = vec![ComponentSpec::with_defaults(ComponentKind::SimpleImputer)];
        if estimator.needs_scaling() {
            components.push(ComponentSpec::with_defaults(ComponentKind::StandardScaler));
        }
        components.push(ComponentSpec::with_defaults(estimator));
        Self::new(problem_type, components)
    }

    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    pub fn estimator(&self) -> &ComponentSpec {
        // `new` guarantees a non-empty list
        &self.components[self.components.len() - 1]
    }

    /// Same structure with the parameters of component `index` replaced
    pub fn with_params(&self, index: usize, params: Hyperparameters) -> Result<Self> {
        let mut components = self.components.clone();
        let spec = components
            .get_mut(index)
            .ok_or_else(|| KolosalError::NotFound(format!("component {}", index)))?;
        spec.params = params;
        Self::new(self.problem_type, components)
    }

    fn build(&self) -> Result<(Vec<Box<dyn Transformer>>, Box<dyn Estimator>)> {
        let mut transformers = Vec::new();
        let mut estimator = None;
        for spec in &self.components {
            match spec.kind.build(&spec.params, self.problem_type)? {
                BuiltComponent::Transformer(t) => transformers.push(t),
                BuiltComponent::Estimator(e) => estimator = Some(e),
            }
        }
        let estimator = estimator.ok_or_else(|| {
            KolosalError::Setup("pipeline has no estimator".to_string())
        })?;
        Ok((transformers, estimator))
    }

    fn fitted(&self) -> Result<&FittedGraph> {
        self.fitted.as_ref().ok_or(KolosalError::ModelNotFitted)
    }

    fn transform(fitted: &FittedGraph, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut current = x.clone();
        for transformer in &fitted.transformers {
            current = transformer.transform(&current)?;
        }
        Ok(current)
    }
}

impl Pipeline for ComponentGraph {
    fn name(&self) -> String {
        let estimator = self.estimator().kind.name();
        let transformers: Vec<&str> = self.components[..self.components.len() - 1]
            .iter()
            .map(|spec| spec.kind.name())
            .collect();
        if transformers.is_empty() {
            estimator.to_string()
        } else {
            format!("{} w/ {}", estimator, transformers.join(" + "))
        }
    }

    fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    fn signature(&self) -> PipelineSignature {
        let parts: Vec<String> = self.components.iter().map(ComponentSpec::signature).collect();
        PipelineSignature::new(parts.join(" -> "))
    }

    fn parameters(&self) -> Vec<(String, Hyperparameters)> {
        self.components
            .iter()
            .map(|spec| (spec.kind.name().to_string(), spec.params.clone()))
            .collect()
    }

    fn model_family(&self) -> Option<ModelFamily> {
        self.estimator().kind.model_family()
    }

    fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fitted = None;
        let (mut transformers, mut estimator) = self.build()?;

        let mut current = x.clone();
        for transformer in transformers.iter_mut() {
            current = transformer.fit_transform(&current, y)?;
        }
        estimator.fit(&current, y)?;

        self.fitted = Some(FittedGraph {
            transformers,
            estimator,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted()?;
        let transformed = Self::transform(fitted, x)?;
        fitted.estimator.predict(&transformed)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.problem_type.is_classification() {
            return Err(KolosalError::Unsupported(format!(
                "predict_proba is not available for {} pipelines",
                self.problem_type
            )));
        }
        let fitted = self.fitted()?;
        let transformed = Self::transform(fitted, x)?;
        fitted.estimator.predict_proba(&transformed)
    }

    fn classes(&self) -> Vec<f64> {
        self.fitted
            .as_ref()
            .map(|f| f.estimator.classes().to_vec())
            .unwrap_or_default()
    }

    fn clone_unfitted(&self) -> Box<dyn Pipeline> {
        Box::new(ComponentGraph {
            problem_type: self.problem_type,
            components: self.components.clone(),
            fitted: None,
        })
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hyperparameters;
    use ndarray::array;

    #[test]
    fn test_name_format() {
        let graph = ComponentGraph::for_family(ModelFamily::LinearModel, ProblemType::Binary).unwrap();
        assert_eq!(
            graph.name(),
            "Logistic Regression Classifier w/ Simple Imputer + Standard Scaler"
        );
        let baseline = ComponentGraph::baseline(ProblemType::Regression).unwrap();
        assert_eq!(baseline.name(), "Baseline Regressor");
    }

    #[test]
    fn test_estimator_must_be_last() {
        let specs = vec![
            ComponentSpec::with_defaults(ComponentKind::DecisionTree),
            ComponentSpec::with_defaults(ComponentKind::SimpleImputer),
        ];
        assert!(matches!(
            ComponentGraph::new(ProblemType::Binary, specs),
            Err(KolosalError::Setup(_))
        ));

        let two_estimators = vec![
            ComponentSpec::with_defaults(ComponentKind::DecisionTree),
            ComponentSpec::with_defaults(ComponentKind::KNearestNeighbors),
        ];
        assert!(ComponentGraph::new(ProblemType::Binary, two_estimators).is_err());
        assert!(ComponentGraph::new(ProblemType::Binary, Vec::new()).is_err());
    }

    #[test]
    fn test_signature_is_canonical() {
        let a = ComponentGraph::for_family(ModelFamily::DecisionTree, ProblemType::Regression).unwrap();
        let b = ComponentGraph::for_family(ModelFamily::DecisionTree, ProblemType::Regression).unwrap();
        assert_eq!(a.signature(), b.signature());
        assert_eq!(
            a.signature().as_str(),
            "Simple Imputer(impute_strategy=mean) -> Decision Tree(max_depth=6, min_samples_split=2)"
        );

        let tuned = a
            .with_params(1, hyperparameters([("max_depth", 3i64), ("min_samples_split", 2)]))
            .unwrap();
        assert_ne!(tuned.signature(), a.signature());
    }

    #[test]
    fn test_float_signature_precision() {
        let graph = ComponentGraph::new(
            ProblemType::Regression,
            vec![ComponentSpec::new(
                ComponentKind::LinearRegression,
                hyperparameters([("alpha", 0.5)]),
            )],
        )
        .unwrap();
        assert_eq!(graph.signature().as_str(), "Linear Regressor(alpha=5.000000e-1)");
    }

    #[test]
    fn test_fit_predict_and_clone_unfitted() {
        let x = array![[0.0, f64::NAN], [0.1, 1.0], [5.0, 1.0], [5.1, f64::NAN]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut graph = ComponentGraph::for_family(ModelFamily::KNearestNeighbors, ProblemType::Binary).unwrap();
        graph
            .components
            .last_mut()
            .unwrap()
            .params
            .insert("n_neighbors".into(), ParamValue::Int(1));

        assert!(!graph.is_fitted());
        graph.fit(&x, &y).unwrap();
        assert!(graph.is_fitted());
        assert_eq!(graph.predict(&x).unwrap(), y);
        assert_eq!(graph.classes(), vec![0.0, 1.0]);
        assert_eq!(graph.predict_proba(&x).unwrap().ncols(), 2);

        let copy = graph.clone_unfitted();
        assert!(!copy.is_fitted());
        assert_eq!(copy.signature(), graph.signature());
    }

    #[test]
    fn test_regression_has_no_proba() {
        let x = array![[1.0], [2.0]];
        let mut graph = ComponentGraph::baseline(ProblemType::Regression).unwrap();
        graph.fit(&x, &array![1.0, 3.0]).unwrap();
        assert!(matches!(graph.predict_proba(&x), Err(KolosalError::Unsupported(_))));
    }

    #[test]
    fn test_validate_catches_bad_params() {
        let graph = ComponentGraph::new(
            ProblemType::Binary,
            vec![ComponentSpec::new(
                ComponentKind::DecisionTree,
                hyperparameters([("max_depth", 0i64)]),
            )],
        )
        .unwrap();
        assert!(graph.validate().is_err());
    }
}
